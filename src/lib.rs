//! GreenLens litter detection core
//!
//! Turns a live camera stream into geotagged litter records and aggregates
//! them into environmental impact metrics.
//!
//! # Architecture
//!
//! camera frame → classifier adapter → detection loop → record pipeline →
//! record store → aggregation engine.
//!
//! 1. **Classifier adapter**: swappable object-detection backend behind an
//!    infallible `detect` call.
//! 2. **Detection loop**: Idle/Armed/Disposed scheduler with at most one
//!    outstanding inference.
//! 3. **Record pipeline**: confidence gate (> 0.85) plus a known location.
//! 4. **Record store**: append-only, durable, safe under concurrent appends.
//! 5. **Aggregation engine**: totals, most common category, hotspots and
//!    carbon offset.
//!
//! # Module Structure
//!
//! - `frame`, `ingest`: frames and pull-based frame sources
//! - `detect`: classifier trait, backends, adapter
//! - `detection_loop`, `pipeline`, `storage`, `aggregate`: the core flow
//! - `enrich`: deep scan through an external AI service
//! - `config`: layered daemon/CLI configuration

use anyhow::Result;
use rand::RngCore;
use rusqlite::{Connection, OpenFlags};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod aggregate;
pub mod category;
pub mod config;
pub mod detect;
pub mod detection_loop;
pub mod enrich;
pub mod frame;
pub mod ingest;
pub mod location;
pub mod pipeline;
pub mod record;
pub mod storage;

pub use aggregate::{
    AggregationEngine, CategoryCount, HeatmapPoint, HotspotCluster, HotspotStrategy,
    ImpactMetrics,
};
pub use category::WasteCategory;
pub use config::GreenlensConfig;
pub use detect::{BackendRegistry, BoundingBox, Classifier, ClassifierAdapter, Detection};
pub use detection_loop::{DetectionLoop, LoopState, LoopStats, OverlaySink, TickOutcome};
pub use enrich::{deep_scan, DeepScanOutcome, Enricher, Recyclability, WasteAnalysis};
pub use frame::{Frame, FrameSource};
pub use location::{GeoPoint, LocationProvider, SharedLocation};
pub use pipeline::{RecordPipeline, HIGH_CONFIDENCE_THRESHOLD};
pub use record::Record;
pub use storage::{InMemoryRecordStore, RecordStore, SqliteRecordStore};

static LAST_TIMESTAMP_MS: AtomicU64 = AtomicU64::new(0);

/// Milliseconds since the Unix epoch, never decreasing within a process.
pub fn now_ms() -> u64 {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let previous = LAST_TIMESTAMP_MS.fetch_max(wall, Ordering::SeqCst);
    previous.max(wall)
}

pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:greenlens_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}
