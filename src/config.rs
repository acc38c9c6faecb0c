use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::aggregate::{
    HotspotStrategy, CARBON_PER_ITEM_G, DEFAULT_CLUSTER_MIN_POINTS, DEFAULT_CLUSTER_RADIUS_M,
    DEFAULT_CLUSTER_SIZE,
};
use crate::location::GeoPoint;
use crate::pipeline::HIGH_CONFIDENCE_THRESHOLD;
use crate::storage::DEFAULT_COLLECTION;

const DEFAULT_DB_PATH: &str = "greenlens.db";
const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_REFRESH_HZ: u32 = 60;
const DEFAULT_FRAME_WIDTH: u32 = 640;
const DEFAULT_FRAME_HEIGHT: u32 = 640;
const DEFAULT_BACKEND: &str = "simulated";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_HIT_RATE: f64 = 0.08;
const DEFAULT_LOAD_DELAY_MS: u64 = 1500;
const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Deserialize, Default)]
struct GreenlensConfigFile {
    db_path: Option<String>,
    collection: Option<String>,
    detection: Option<DetectionConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    aggregation: Option<AggregationConfigFile>,
    location: Option<LocationConfigFile>,
    enrichment: Option<EnrichmentConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    refresh_hz: Option<u32>,
    location_jitter_deg: Option<f64>,
    source_url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    hit_rate: Option<f64>,
    load_delay_ms: Option<u64>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct AggregationConfigFile {
    cluster_size: Option<usize>,
    carbon_per_item_g: Option<u64>,
    hotspot_mode: Option<String>,
    cluster_radius_m: Option<f64>,
    cluster_min_points: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct LocationConfigFile {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize, Default)]
struct EnrichmentConfigFile {
    endpoint: Option<String>,
    model: Option<String>,
    api_key_env: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GreenlensConfig {
    pub db_path: String,
    pub collection: String,
    pub detection: DetectionSettings,
    pub classifier: ClassifierSettings,
    pub aggregation: AggregationSettings,
    /// Fixed session location; when unset no records are created by the loop.
    pub location: Option<GeoPoint>,
    pub enrichment: EnrichmentSettings,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub refresh_hz: u32,
    pub location_jitter_deg: f64,
    pub source_url: String,
    pub width: u32,
    pub height: u32,
}

impl DetectionSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.refresh_hz.max(1)))
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    pub hit_rate: f64,
    pub load_delay_ms: u64,
    pub seed: Option<u64>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            hit_rate: DEFAULT_HIT_RATE,
            load_delay_ms: DEFAULT_LOAD_DELAY_MS,
            seed: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HotspotMode {
    Count,
    Density,
}

impl HotspotMode {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(HotspotMode::Count),
            "density" => Ok(HotspotMode::Density),
            other => Err(anyhow!(
                "unknown hotspot mode '{}' (expected count or density)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregationSettings {
    pub cluster_size: usize,
    pub carbon_per_item_g: u64,
    pub hotspot_mode: HotspotMode,
    pub cluster_radius_m: f64,
    pub cluster_min_points: usize,
}

impl AggregationSettings {
    pub fn strategy(&self) -> HotspotStrategy {
        match self.hotspot_mode {
            HotspotMode::Count => HotspotStrategy::CountProxy {
                cluster_size: self.cluster_size,
            },
            HotspotMode::Density => HotspotStrategy::Density {
                radius_m: self.cluster_radius_m,
                min_points: self.cluster_min_points,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl GreenlensConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GREENLENS_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GreenlensConfigFile) -> Result<Self> {
        let detection = file.detection.unwrap_or_default();
        let classifier = file.classifier.unwrap_or_default();
        let aggregation = file.aggregation.unwrap_or_default();
        let enrichment = file.enrichment.unwrap_or_default();

        let hotspot_mode = match aggregation.hotspot_mode.as_deref() {
            Some(mode) => HotspotMode::parse(mode)?,
            None => HotspotMode::Count,
        };

        Ok(Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            collection: file
                .collection
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            detection: DetectionSettings {
                confidence_threshold: detection
                    .confidence_threshold
                    .unwrap_or(HIGH_CONFIDENCE_THRESHOLD),
                refresh_hz: detection.refresh_hz.unwrap_or(DEFAULT_REFRESH_HZ),
                location_jitter_deg: detection.location_jitter_deg.unwrap_or(0.0),
                source_url: detection
                    .source_url
                    .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                width: detection.width.unwrap_or(DEFAULT_FRAME_WIDTH),
                height: detection.height.unwrap_or(DEFAULT_FRAME_HEIGHT),
            },
            classifier: ClassifierSettings {
                backend: classifier
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: classifier.model_path,
                input_size: classifier.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                hit_rate: classifier.hit_rate.unwrap_or(DEFAULT_HIT_RATE),
                load_delay_ms: classifier.load_delay_ms.unwrap_or(DEFAULT_LOAD_DELAY_MS),
                seed: classifier.seed,
            },
            aggregation: AggregationSettings {
                cluster_size: aggregation.cluster_size.unwrap_or(DEFAULT_CLUSTER_SIZE),
                carbon_per_item_g: aggregation.carbon_per_item_g.unwrap_or(CARBON_PER_ITEM_G),
                hotspot_mode,
                cluster_radius_m: aggregation
                    .cluster_radius_m
                    .unwrap_or(DEFAULT_CLUSTER_RADIUS_M),
                cluster_min_points: aggregation
                    .cluster_min_points
                    .unwrap_or(DEFAULT_CLUSTER_MIN_POINTS),
            },
            location: file.location.map(|loc| GeoPoint {
                lat: loc.lat,
                lng: loc.lng,
            }),
            enrichment: EnrichmentSettings {
                endpoint: enrichment
                    .endpoint
                    .unwrap_or_else(|| DEFAULT_GEMINI_ENDPOINT.to_string()),
                model: enrichment
                    .model
                    .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                api_key_env: enrichment
                    .api_key_env
                    .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = non_empty_env("GREENLENS_DB_PATH") {
            self.db_path = path;
        }
        if let Some(url) = non_empty_env("GREENLENS_SOURCE_URL") {
            self.detection.source_url = url;
        }
        if let Some(backend) = non_empty_env("GREENLENS_BACKEND") {
            self.classifier.backend = backend;
        }
        if let Some(path) = non_empty_env("GREENLENS_MODEL_PATH") {
            self.classifier.model_path = Some(PathBuf::from(path));
        }
        if let Some(hz) = non_empty_env("GREENLENS_REFRESH_HZ") {
            self.detection.refresh_hz = hz
                .parse()
                .map_err(|_| anyhow!("GREENLENS_REFRESH_HZ must be an integer"))?;
        }
        if let Some(mode) = non_empty_env("GREENLENS_HOTSPOT_MODE") {
            self.aggregation.hotspot_mode = HotspotMode::parse(&mode)?;
        }
        match (non_empty_env("GREENLENS_LAT"), non_empty_env("GREENLENS_LNG")) {
            (Some(lat), Some(lng)) => {
                let lat: f64 = lat
                    .parse()
                    .map_err(|_| anyhow!("GREENLENS_LAT must be a number"))?;
                let lng: f64 = lng
                    .parse()
                    .map_err(|_| anyhow!("GREENLENS_LNG must be a number"))?;
                self.location = Some(GeoPoint { lat, lng });
            }
            (None, None) => {}
            _ => return Err(anyhow!("GREENLENS_LAT and GREENLENS_LNG must be set together")),
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(anyhow!("db_path must not be empty"));
        }
        if self.collection.trim().is_empty() {
            return Err(anyhow!("collection must not be empty"));
        }
        let threshold = self.detection.confidence_threshold;
        if !threshold.is_finite() || !(0.0..1.0).contains(&threshold) {
            return Err(anyhow!("confidence_threshold must be in [0, 1)"));
        }
        if self.detection.refresh_hz == 0 {
            return Err(anyhow!("refresh_hz must be greater than zero"));
        }
        if self.detection.width == 0 || self.detection.height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.classifier.hit_rate) {
            return Err(anyhow!("classifier hit_rate must be in [0, 1]"));
        }
        self.classifier.backend = self.classifier.backend.trim().to_ascii_lowercase();
        if self.aggregation.cluster_size == 0 {
            return Err(anyhow!("cluster_size must be greater than zero"));
        }
        let radius = self.aggregation.cluster_radius_m;
        if !radius.is_finite() || radius <= 0.0 || self.aggregation.cluster_min_points == 0 {
            return Err(anyhow!(
                "cluster_radius_m and cluster_min_points must be greater than zero"
            ));
        }
        if let Some(location) = &self.location {
            location.validate()?;
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<GreenlensConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = GreenlensConfig::from_file(GreenlensConfigFile::default()).unwrap();
        assert_eq!(cfg.db_path, "greenlens.db");
        assert_eq!(cfg.collection, "greenlens_detections");
        assert_eq!(cfg.detection.confidence_threshold, 0.85);
        assert_eq!(cfg.detection.refresh_hz, 60);
        assert_eq!(cfg.classifier.backend, "simulated");
        assert_eq!(cfg.aggregation.strategy(), HotspotStrategy::CountProxy { cluster_size: 5 });
        assert!(cfg.location.is_none());
        assert_eq!(cfg.enrichment.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn unknown_hotspot_mode_is_rejected() {
        let file: GreenlensConfigFile =
            serde_json::from_str(r#"{"aggregation":{"hotspot_mode":"grid"}}"#).unwrap();
        assert!(GreenlensConfig::from_file(file).is_err());
    }

    #[test]
    fn tick_interval_follows_refresh_rate() {
        let mut cfg = GreenlensConfig::from_file(GreenlensConfigFile::default()).unwrap();
        cfg.detection.refresh_hz = 4;
        assert_eq!(cfg.detection.tick_interval(), Duration::from_millis(250));
    }
}
