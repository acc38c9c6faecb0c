use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::detect::backend::Classifier;
use crate::detect::result::Detection;
use crate::frame::Frame;

enum Step {
    Detect(Vec<Detection>),
    Fail(String),
}

/// Deterministic backend that replays a fixed script of results.
///
/// Each `detect` call consumes one step; once the script is exhausted every
/// call returns no detections.
pub struct ScriptedBackend {
    steps: VecDeque<Step>,
    load_failure: Option<String>,
    detect_delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            load_failure: None,
            detect_delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn then_detect(mut self, detections: Vec<Detection>) -> Self {
        self.steps.push_back(Step::Detect(detections));
        self
    }

    pub fn then_fail(mut self, reason: &str) -> Self {
        self.steps.push_back(Step::Fail(reason.to_string()));
        self
    }

    pub fn with_load_failure(mut self, reason: &str) -> Self {
        self.load_failure = Some(reason.to_string());
        self
    }

    /// Sleep inside every `detect` call.
    pub fn with_detect_delay(mut self, delay: Duration) -> Self {
        self.detect_delay = Some(delay);
        self
    }

    /// Shared counter of `detect` invocations.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn load_model(&mut self) -> Result<()> {
        match &self.load_failure {
            Some(reason) => Err(anyhow!("{}", reason)),
            None => Ok(()),
        }
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.detect_delay {
            std::thread::sleep(delay);
        }
        match self.steps.pop_front() {
            Some(Step::Detect(detections)) => Ok(detections),
            Some(Step::Fail(reason)) => Err(anyhow!("{}", reason)),
            None => Ok(Vec::new()),
        }
    }
}
