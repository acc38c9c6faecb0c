use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::config::ClassifierSettings;

use super::backend::Classifier;
use super::backends::SimulatedBackend;

/// Registry of classifier backends, keyed by backend name.
///
/// Backends are moved out with `take` because the detection loop owns its
/// classifier exclusively.
pub struct BackendRegistry {
    backends: HashMap<String, Box<dyn Classifier>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry populated with every backend the settings can construct.
    pub fn from_settings(settings: &ClassifierSettings) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(
            SimulatedBackend::new(settings.seed)
                .with_hit_rate(settings.hit_rate)
                .with_load_delay(Duration::from_millis(settings.load_delay_ms)),
        );

        #[cfg(feature = "backend-tract")]
        if let Some(path) = &settings.model_path {
            registry.register(super::backends::TractBackend::new(path, settings.input_size));
        }

        if registry.backends.contains_key(&settings.backend) {
            registry.set_default(&settings.backend)?;
        } else {
            return Err(anyhow!(
                "classifier backend '{}' unavailable (registered: {})",
                settings.backend,
                registry.list().join(", ")
            ));
        }
        Ok(registry)
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: Classifier + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Box::new(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// List registered backends, sorted by name.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove and return a backend by name.
    pub fn take(&mut self, name: &str) -> Result<Box<dyn Classifier>> {
        self.backends
            .remove(name)
            .ok_or_else(|| anyhow!("backend '{}' not registered", name))
    }

    /// Remove and return the default backend.
    pub fn take_default(&mut self) -> Result<Box<dyn Classifier>> {
        let name = self
            .default_name
            .clone()
            .ok_or_else(|| anyhow!("no classifier backend registered"))?;
        self.take(&name)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
