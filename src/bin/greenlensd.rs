//! greenlensd - GreenLens detection daemon
//!
//! This daemon:
//! 1. Opens the record store and resolves the session location
//! 2. Loads the configured classifier backend on the inference worker
//! 3. Ticks the detection loop at the configured refresh rate
//! 4. Stores high-confidence detections as geotagged records
//! 5. Logs loop health and impact metrics until Ctrl-C

use anyhow::{anyhow, Result};
use std::io::IsTerminal;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use greenlens::location::FixedLocation;
use greenlens::{
    ingest, AggregationEngine, BackendRegistry, ClassifierAdapter, DetectionLoop, FrameSource,
    GreenlensConfig, RecordPipeline, RecordStore, SharedLocation, SqliteRecordStore,
};

#[path = "../ui.rs"]
mod ui;

const MODEL_LOAD_TIMEOUT: Duration = Duration::from_secs(300);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(10);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = GreenlensConfig::load()?;
    let ui = ui::Ui::new(
        ui::UiMode::Auto,
        std::io::stderr().is_terminal(),
        std::io::stdout().is_terminal(),
    );

    let store: Arc<dyn RecordStore> = {
        let _stage = ui.stage("Open record store");
        Arc::new(SqliteRecordStore::open_collection(
            &cfg.db_path,
            &cfg.collection,
        )?)
    };
    let pipeline = Arc::new(
        RecordPipeline::new(store.clone())
            .with_threshold(cfg.detection.confidence_threshold)?
            .with_location_jitter(cfg.detection.location_jitter_deg),
    );
    let engine = AggregationEngine::new(store.clone())
        .with_strategy(cfg.aggregation.strategy())?
        .with_carbon_per_item(cfg.aggregation.carbon_per_item_g)
        .with_cluster_params(
            cfg.aggregation.cluster_radius_m,
            cfg.aggregation.cluster_min_points,
        )?;

    let location = SharedLocation::new();
    match cfg.location {
        Some(point) => {
            location.resolve_in_background(FixedLocation(point))?;
        }
        None => log::warn!(
            "no location configured (GREENLENS_LAT/GREENLENS_LNG); detections will not be recorded"
        ),
    }

    let mut registry = BackendRegistry::from_settings(&cfg.classifier)?;
    log::info!("classifier backends: {}", registry.list().join(", "));
    let adapter = ClassifierAdapter::new(registry.take_default()?);
    log::info!("using classifier backend '{}'", adapter.backend_name());
    let source = ingest::open_source(
        &cfg.detection.source_url,
        cfg.detection.width,
        cfg.detection.height,
    )?;
    let source_name = source.name().to_string();
    let threshold = pipeline.threshold();

    let detection_loop = DetectionLoop::new(adapter, source, pipeline, location.clone())?;
    {
        let stage = ui.stage("Load classifier model");
        if let Err(e) = detection_loop.wait_for_model(MODEL_LOAD_TIMEOUT) {
            stage.fail();
            return Err(e);
        }
    }
    detection_loop.start()?;
    detection_loop.spawn_ticker(cfg.detection.tick_interval())?;

    log::info!("greenlensd running. writing to {}", cfg.db_path);
    log::info!(
        "source={} refresh_hz={} threshold={:.2} hotspots={:?}",
        source_name,
        cfg.detection.refresh_hz,
        threshold,
        engine.strategy()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    loop {
        match rx.recv_timeout(HEALTH_LOG_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        let stats = detection_loop.stats();
        log::info!(
            "loop state={:?} ticks={} dispatched={} busy={} discarded={} records={} failures={} location={}",
            detection_loop.state(),
            stats.ticks,
            stats.dispatched,
            stats.busy_skips,
            stats.discarded_results,
            stats.records_created,
            stats.submit_failures,
            location.get().is_some()
        );
        match engine.compute_metrics() {
            Ok(metrics) => log::info!(
                "impact total={} most_common={} hotspots={} carbon_g={}",
                metrics.total_items,
                metrics.most_common_label(),
                metrics.hotspots_found,
                metrics.carbon_offset_estimate
            ),
            Err(e) => log::warn!("metrics unavailable: {:#}", e),
        }
    }

    log::info!("shutdown signal received, stopping detection loop...");
    detection_loop.dispose();
    let metrics = engine.compute_metrics()?;
    log::info!(
        "session closed with {} records ({}g CO2 offset)",
        metrics.total_items,
        metrics.carbon_offset_estimate
    );
    Ok(())
}
