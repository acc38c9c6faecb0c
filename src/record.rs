use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::category::WasteCategory;
use crate::location::GeoPoint;

/// Durable, geotagged waste sighting.
///
/// Records are immutable once created: the store offers append and bulk read
/// only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    #[serde(rename = "trashType")]
    pub category: WasteCategory,
    pub confidence: f32,
    pub lat: f64,
    pub lng: f64,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Record {
    pub fn location(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }

    /// Reject records that must never reach the store.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(anyhow!("record id must not be empty"));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "record {} confidence {} outside [0, 1]",
                self.id,
                self.confidence
            ));
        }
        self.location()
            .validate()
            .map_err(|e| anyhow!("record {}: {}", self.id, e))
    }
}
