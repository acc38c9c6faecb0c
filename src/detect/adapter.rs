use anyhow::{anyhow, Result};
use std::time::Instant;

use crate::detect::backend::Classifier;
use crate::detect::result::Detection;
use crate::frame::Frame;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Ready,
    Failed(String),
}

/// Infallible front for a `Classifier` backend.
///
/// `detect` never returns an error: malformed frames, an unloaded model and
/// backend failures all produce an empty detection list.
pub struct ClassifierAdapter {
    backend: Box<dyn Classifier>,
    state: ModelState,
}

impl ClassifierAdapter {
    pub fn new(backend: Box<dyn Classifier>) -> Self {
        Self {
            backend,
            state: ModelState::Unloaded,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ModelState::Ready
    }

    /// Load the model. Returns once the backend signals readiness.
    ///
    /// A failed load is sticky: the adapter stays `Failed` and is not retried.
    pub fn load_model(&mut self) -> Result<()> {
        match &self.state {
            ModelState::Ready => return Ok(()),
            ModelState::Failed(reason) => {
                return Err(anyhow!("classifier load previously failed: {}", reason))
            }
            ModelState::Unloaded => {}
        }
        let started = Instant::now();
        match self.backend.load_model() {
            Ok(()) => {
                log::info!(
                    "classifier '{}' ready in {}ms",
                    self.backend.name(),
                    started.elapsed().as_millis()
                );
                self.state = ModelState::Ready;
                Ok(())
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                log::error!("classifier '{}' failed to load: {}", self.backend.name(), reason);
                self.state = ModelState::Failed(reason.clone());
                Err(anyhow!("classifier '{}' failed to load: {}", self.backend.name(), reason))
            }
        }
    }

    pub fn detect(&mut self, frame: &Frame) -> Vec<Detection> {
        if !self.is_ready() {
            return Vec::new();
        }
        if !frame.is_well_formed() {
            log::debug!("skipping malformed frame {:?}", frame);
            return Vec::new();
        }
        match self.backend.detect(frame) {
            Ok(detections) => detections
                .into_iter()
                .filter(|d| d.confidence.is_finite() && (0.0..=1.0).contains(&d.confidence))
                .collect(),
            Err(e) => {
                log::debug!("classifier '{}' inference failed: {}", self.backend.name(), e);
                Vec::new()
            }
        }
    }
}
