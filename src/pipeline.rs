//! Confidence-gated conversion of detections into persisted records.
//!
//! The pipeline is stateless: each accepted submission builds one complete
//! `Record` and hands it to the store in a single append. Rejections (low
//! confidence, no location fix) are the common case and are not errors.

use anyhow::{anyhow, Result};
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

use crate::category::WasteCategory;
use crate::detect::Detection;
use crate::enrich::WasteAnalysis;
use crate::location::GeoPoint;
use crate::record::Record;
use crate::storage::RecordStore;

/// Detections must score strictly above this to become records.
pub const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.85;

pub struct RecordPipeline {
    store: Arc<dyn RecordStore>,
    threshold: f32,
    location_jitter_deg: f64,
}

impl RecordPipeline {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            threshold: HIGH_CONFIDENCE_THRESHOLD,
            location_jitter_deg: 0.0,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Result<Self> {
        if !threshold.is_finite() || !(0.0..1.0).contains(&threshold) {
            return Err(anyhow!("confidence threshold {} outside [0, 1)", threshold));
        }
        self.threshold = threshold;
        Ok(self)
    }

    /// Add uniform noise in `[0, jitter)` degrees to auto-created records.
    pub fn with_location_jitter(mut self, jitter_deg: f64) -> Self {
        self.location_jitter_deg = jitter_deg.max(0.0);
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Persist a detection if it clears the gate.
    ///
    /// Returns `Ok(None)` when the detection is dropped. A store failure is
    /// returned to this caller only.
    pub fn submit(&self, detection: &Detection, location: Option<GeoPoint>) -> Result<Option<Record>> {
        if detection.confidence.is_nan() || detection.confidence <= self.threshold {
            return Ok(None);
        }
        let Some(location) = location else {
            return Ok(None);
        };

        let location = self.jitter(location);
        let record = Record {
            id: Uuid::new_v4().to_string(),
            category: detection.category,
            confidence: detection.confidence,
            lat: location.lat,
            lng: location.lng,
            created_at: crate::now_ms(),
            description: None,
        };
        let stored = self.store.append(record)?;
        log::debug!(
            "record {} created: {} conf={:.2}",
            stored.id,
            stored.category,
            stored.confidence
        );
        Ok(Some(stored))
    }

    /// Persist the outcome of a deep scan.
    ///
    /// Always accepted when a location is known; the item name becomes the
    /// record description.
    pub fn submit_enriched(
        &self,
        analysis: &WasteAnalysis,
        location: Option<GeoPoint>,
    ) -> Result<Option<Record>> {
        let Some(location) = location else {
            return Ok(None);
        };
        let record = Record {
            id: Uuid::new_v4().to_string(),
            category: WasteCategory::Trash,
            confidence: 1.0,
            lat: location.lat,
            lng: location.lng,
            created_at: crate::now_ms(),
            description: Some(analysis.item_name.clone()),
        };
        Ok(Some(self.store.append(record)?))
    }

    fn jitter(&self, location: GeoPoint) -> GeoPoint {
        if self.location_jitter_deg <= 0.0 {
            return location;
        }
        let mut rng = rand::thread_rng();
        GeoPoint {
            lat: (location.lat + rng.gen::<f64>() * self.location_jitter_deg).clamp(-90.0, 90.0),
            lng: (location.lng + rng.gen::<f64>() * self.location_jitter_deg).clamp(-180.0, 180.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::enrich::Recyclability;
    use crate::storage::InMemoryRecordStore;

    const HERE: GeoPoint = GeoPoint {
        lat: 40.7128,
        lng: -74.006,
    };

    fn pipeline() -> (RecordPipeline, Arc<InMemoryRecordStore>) {
        let store = Arc::new(InMemoryRecordStore::new());
        (RecordPipeline::new(store.clone()), store)
    }

    fn detection(confidence: f32) -> Detection {
        Detection::new(WasteCategory::Bottle, confidence, BoundingBox::default())
    }

    #[test]
    fn gate_is_strictly_above_threshold() {
        let (pipeline, store) = pipeline();
        assert_eq!(pipeline.threshold(), HIGH_CONFIDENCE_THRESHOLD);
        for confidence in [0.0, 0.5, 0.75, 0.85] {
            assert!(pipeline.submit(&detection(confidence), Some(HERE)).unwrap().is_none());
        }
        assert!(store.list_all().unwrap().is_empty());
        assert!(pipeline.submit(&detection(0.851), Some(HERE)).unwrap().is_some());
    }

    #[test]
    fn missing_location_drops_submission() {
        let (pipeline, store) = pipeline();
        assert!(pipeline.submit(&detection(0.99), None).unwrap().is_none());
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn accepted_submission_copies_fields_and_stamps_time() {
        let (pipeline, store) = pipeline();
        let before = crate::now_ms();
        let det = detection(0.93);
        let record = pipeline.submit(&det, Some(HERE)).unwrap().unwrap();
        assert_eq!(record.category, det.category);
        assert_eq!(record.confidence, det.confidence);
        assert_eq!(record.location(), HERE);
        assert!(record.created_at >= before);
        assert!(record.description.is_none());
        assert_eq!(store.list_all().unwrap(), vec![record]);
    }

    #[test]
    fn identical_submissions_create_distinct_records() {
        let (pipeline, store) = pipeline();
        let det = detection(0.9);
        let a = pipeline.submit(&det, Some(HERE)).unwrap().unwrap();
        let b = pipeline.submit(&det, Some(HERE)).unwrap().unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.list_all().unwrap().len(), 2);
    }

    #[test]
    fn jitter_stays_within_bound() {
        let (pipeline, _store) = pipeline();
        let pipeline = pipeline.with_location_jitter(0.0001);
        for _ in 0..20 {
            let record = pipeline.submit(&detection(0.9), Some(HERE)).unwrap().unwrap();
            assert!(record.lat >= HERE.lat && record.lat <= HERE.lat + 0.0001);
            assert!(record.lng >= HERE.lng && record.lng <= HERE.lng + 0.0001);
        }
    }

    #[test]
    fn enriched_submission_always_accepted_with_location() {
        let (pipeline, store) = pipeline();
        let analysis = WasteAnalysis {
            item_name: "Coffee cup lid".to_string(),
            material: "Polystyrene".to_string(),
            recyclability: Recyclability::NonRecyclable,
            disposal_advice: "General waste bin".to_string(),
        };
        assert!(pipeline.submit_enriched(&analysis, None).unwrap().is_none());
        let record = pipeline.submit_enriched(&analysis, Some(HERE)).unwrap().unwrap();
        assert_eq!(record.category, WasteCategory::Trash);
        assert_eq!(record.confidence, 1.0);
        assert_eq!(record.description.as_deref(), Some("Coffee cup lid"));
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn rejects_invalid_threshold() {
        let (pipeline, _store) = pipeline();
        assert!(pipeline.with_threshold(1.0).is_err());
    }
}
