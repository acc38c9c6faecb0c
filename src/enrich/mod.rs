//! Deep scan: one-shot enrichment of a still image by an external AI service.
//!
//! The enrichment service is an opaque collaborator. A failed call is
//! reported to the caller and never produces a record.

#[cfg(feature = "enrich-gemini")]
pub mod gemini;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::location::GeoPoint;
use crate::pipeline::RecordPipeline;
use crate::record::Record;

#[cfg(feature = "enrich-gemini")]
pub use gemini::GeminiClient;

/// Prompt sent alongside the still image.
pub const ANALYSIS_PROMPT: &str = "Analyze this image and identify the primary piece of trash/waste centered in the frame. Provide the specific name, material, recyclability status, and brief disposal advice.";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Recyclability {
    Recyclable,
    #[serde(rename = "Non-Recyclable")]
    NonRecyclable,
    Compostable,
    Hazardous,
}

impl Recyclability {
    pub fn as_str(self) -> &'static str {
        match self {
            Recyclability::Recyclable => "Recyclable",
            Recyclability::NonRecyclable => "Non-Recyclable",
            Recyclability::Compostable => "Compostable",
            Recyclability::Hazardous => "Hazardous",
        }
    }
}

/// Structured answer from the enrichment service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WasteAnalysis {
    pub item_name: String,
    pub material: String,
    pub recyclability: Recyclability,
    pub disposal_advice: String,
}

impl WasteAnalysis {
    /// One-line advice, e.g. `Recyclable: Rinse and place in the blue bin`.
    pub fn advice(&self) -> String {
        format!("{}: {}", self.recyclability.as_str(), self.disposal_advice)
    }
}

/// External enrichment collaborator.
pub trait Enricher: Send + Sync {
    /// Analyse a JPEG-encoded still image.
    fn analyze(&self, jpeg: &[u8]) -> Result<WasteAnalysis>;
}

/// Result of a successful deep scan.
#[derive(Clone, Debug)]
pub struct DeepScanOutcome {
    pub analysis: WasteAnalysis,
    /// Present when a location was known and the record was stored.
    pub record: Option<Record>,
}

/// Run a deep scan and persist the enriched record.
///
/// Enrichment errors come back as a user-facing message; the store is left
/// untouched in that case.
pub fn deep_scan(
    enricher: &dyn Enricher,
    jpeg: &[u8],
    location: Option<GeoPoint>,
    pipeline: &RecordPipeline,
) -> Result<DeepScanOutcome> {
    let analysis = enricher
        .analyze(jpeg)
        .context("AI analysis failed. Please try again.")?;
    log::info!(
        "deep scan: {} ({}, {})",
        analysis.item_name,
        analysis.material,
        analysis.recyclability.as_str()
    );
    let record = pipeline.submit_enriched(&analysis, location)?;
    if record.is_none() {
        log::warn!("deep scan result not stored: location unknown");
    }
    Ok(DeepScanOutcome { analysis, record })
}
