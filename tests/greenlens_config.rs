use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use greenlens::config::{GreenlensConfig, HotspotMode};
use greenlens::HotspotStrategy;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "GREENLENS_CONFIG",
        "GREENLENS_DB_PATH",
        "GREENLENS_SOURCE_URL",
        "GREENLENS_BACKEND",
        "GREENLENS_MODEL_PATH",
        "GREENLENS_REFRESH_HZ",
        "GREENLENS_HOTSPOT_MODE",
        "GREENLENS_LAT",
        "GREENLENS_LNG",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "db_path": "litter_prod.db",
        "collection": "campus_sweep",
        "detection": {
            "confidence_threshold": 0.9,
            "refresh_hz": 15,
            "source_url": "stub://dashcam",
            "width": 320,
            "height": 240
        },
        "classifier": {
            "backend": "simulated",
            "hit_rate": 0.5,
            "load_delay_ms": 0,
            "seed": 7
        },
        "aggregation": {
            "cluster_size": 10,
            "carbon_per_item_g": 25
        },
        "location": { "lat": 37.7749, "lng": -122.4194 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("GREENLENS_CONFIG", file.path());
    std::env::set_var("GREENLENS_REFRESH_HZ", "30");
    std::env::set_var("GREENLENS_LAT", "51.5072");
    std::env::set_var("GREENLENS_LNG", "-0.1276");

    let cfg = GreenlensConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "litter_prod.db");
    assert_eq!(cfg.collection, "campus_sweep");
    assert_eq!(cfg.detection.confidence_threshold, 0.9);
    assert_eq!(cfg.detection.refresh_hz, 30);
    assert_eq!(cfg.detection.source_url, "stub://dashcam");
    assert_eq!((cfg.detection.width, cfg.detection.height), (320, 240));
    assert_eq!(cfg.classifier.seed, Some(7));
    assert_eq!(cfg.classifier.hit_rate, 0.5);
    assert_eq!(
        cfg.aggregation.strategy(),
        HotspotStrategy::CountProxy { cluster_size: 10 }
    );
    assert_eq!(cfg.aggregation.carbon_per_item_g, 25);
    let location = cfg.location.expect("location");
    assert_eq!((location.lat, location.lng), (51.5072, -0.1276));

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
db_path = "sweep.db"

[aggregation]
hotspot_mode = "density"
cluster_radius_m = 75.0
cluster_min_points = 3

[enrichment]
model = "gemini-2.5-pro"
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("GREENLENS_CONFIG", file.path());
    std::env::set_var("GREENLENS_DB_PATH", "override.db");

    let cfg = GreenlensConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "override.db");
    assert_eq!(cfg.aggregation.hotspot_mode, HotspotMode::Density);
    assert_eq!(
        cfg.aggregation.strategy(),
        HotspotStrategy::Density {
            radius_m: 75.0,
            min_points: 3
        }
    );
    assert_eq!(cfg.enrichment.model, "gemini-2.5-pro");
    assert_eq!(cfg.classifier.backend, "simulated");

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("GREENLENS_REFRESH_HZ", "fast");
    assert!(GreenlensConfig::load().is_err());
    clear_env();

    std::env::set_var("GREENLENS_LAT", "10.0");
    assert!(GreenlensConfig::load().is_err());
    clear_env();

    std::env::set_var("GREENLENS_LAT", "95.0");
    std::env::set_var("GREENLENS_LNG", "10.0");
    assert!(GreenlensConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"detection":{"confidence_threshold":1.5}}"#)
        .expect("write config");
    std::env::set_var("GREENLENS_CONFIG", file.path());
    assert!(GreenlensConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("GREENLENS_CONFIG", "/nonexistent/greenlens.json");
    let err = GreenlensConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
