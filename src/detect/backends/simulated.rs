use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use crate::category::WasteCategory;
use crate::detect::backend::Classifier;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Simulation backend for demos and development without a model file.
///
/// Roughly one frame in twelve yields a single random detection with
/// confidence in `[0.75, 0.95)`, so only some sightings clear the record gate.
pub struct SimulatedBackend {
    hit_rate: f64,
    load_delay: Duration,
    rng: StdRng,
    loaded: bool,
}

impl SimulatedBackend {
    pub const DEFAULT_HIT_RATE: f64 = 0.08;
    pub const DEFAULT_LOAD_DELAY: Duration = Duration::from_millis(1500);

    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            hit_rate: Self::DEFAULT_HIT_RATE,
            load_delay: Self::DEFAULT_LOAD_DELAY,
            rng,
            loaded: false,
        }
    }

    pub fn with_hit_rate(mut self, hit_rate: f64) -> Self {
        self.hit_rate = hit_rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }
}

impl Classifier for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn load_model(&mut self) -> Result<()> {
        std::thread::sleep(self.load_delay);
        self.loaded = true;
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if !self.loaded {
            return Err(anyhow!("simulated model not loaded"));
        }
        if !self.rng.gen_bool(self.hit_rate) {
            return Ok(Vec::new());
        }

        let category = WasteCategory::ALL[self.rng.gen_range(0..WasteCategory::ALL.len())];
        let (fw, fh) = (frame.width as f32, frame.height as f32);
        let w = (150.0 + self.rng.gen::<f32>() * 100.0).min(fw);
        let h = (150.0 + self.rng.gen::<f32>() * 100.0).min(fh);
        let bbox = BoundingBox {
            x: self.rng.gen::<f32>() * (fw - w),
            y: self.rng.gen::<f32>() * (fh - h),
            width: w,
            height: h,
        };
        let confidence = 0.75 + self.rng.gen::<f32>() * 0.20;
        let mut detection = Detection::new(category, confidence, bbox);
        detection.label = category.as_str().replace('_', " ");
        Ok(vec![detection])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new(vec![0; 640 * 480 * 3], 640, 480)
    }

    #[test]
    fn always_hits_at_full_rate_and_stays_in_frame() {
        let mut backend = SimulatedBackend::new(Some(7))
            .with_hit_rate(1.0)
            .with_load_delay(Duration::ZERO);
        backend.load_model().unwrap();
        let frame = frame();
        for _ in 0..100 {
            let detections = backend.detect(&frame).unwrap();
            assert_eq!(detections.len(), 1);
            let d = &detections[0];
            assert!((0.75..0.95).contains(&d.confidence));
            assert!(d.bbox.x >= 0.0 && d.bbox.x + d.bbox.width <= 640.0);
            assert!(d.bbox.y >= 0.0 && d.bbox.y + d.bbox.height <= 480.0);
        }
    }

    #[test]
    fn never_hits_at_zero_rate() {
        let mut backend = SimulatedBackend::new(Some(1))
            .with_hit_rate(0.0)
            .with_load_delay(Duration::ZERO);
        backend.load_model().unwrap();
        let frame = frame();
        assert!((0..50).all(|_| backend.detect(&frame).unwrap().is_empty()));
    }

    #[test]
    fn refuses_to_detect_before_load() {
        let mut backend = SimulatedBackend::new(Some(3));
        assert!(backend.detect(&frame()).is_err());
    }
}
