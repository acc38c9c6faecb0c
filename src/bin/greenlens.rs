//! greenlens - inspect stored litter records and run deep scans

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::IsTerminal;
use std::sync::Arc;

use greenlens::{
    AggregationEngine, CategoryCount, GreenlensConfig, HeatmapPoint, HotspotCluster,
    ImpactMetrics, Record, RecordStore, SqliteRecordStore,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the record database (overrides config).
    #[arg(long, env = "GREENLENS_DB_PATH")]
    db_path: Option<String>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Impact metrics, category breakdown and hotspots.
    Report {
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Include heatmap points in JSON output.
        #[arg(long)]
        heatmap: bool,
    },
    /// List stored records, oldest first.
    Records {
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Show only the most recent N records.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Analyse a still image with the AI enrichment service and store the result.
    DeepScan {
        /// JPEG file to analyse; captures a frame from the configured source when omitted.
        #[arg(long)]
        image: Option<std::path::PathBuf>,
        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    metrics: ImpactMetrics,
    most_common_label: &'static str,
    categories: Vec<CategoryCount>,
    hotspots: Vec<HotspotCluster>,
    #[serde(skip_serializing_if = "Option::is_none")]
    heatmap: Option<Vec<HeatmapPoint>>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let ui = ui::Ui::new(
        ui::UiMode::parse(&args.ui)?,
        std::io::stderr().is_terminal(),
        std::io::stdout().is_terminal(),
    );

    let mut cfg = GreenlensConfig::load()?;
    if let Some(db_path) = args.db_path {
        cfg.db_path = db_path;
    }

    let store: Arc<dyn RecordStore> = {
        let _stage = ui.stage("Open record store");
        Arc::new(SqliteRecordStore::open_collection(
            &cfg.db_path,
            &cfg.collection,
        )?)
    };

    match args.command {
        Command::Report { format, heatmap } => report(&cfg, store, &ui, format, heatmap),
        Command::Records { format, limit } => list_records(store.as_ref(), format, limit),
        Command::DeepScan { image, lat, lng } => deep_scan(&cfg, store, &ui, image, lat, lng),
    }
}

fn report(
    cfg: &GreenlensConfig,
    store: Arc<dyn RecordStore>,
    ui: &ui::Ui,
    format: Format,
    heatmap: bool,
) -> Result<()> {
    let engine = AggregationEngine::new(store)
        .with_strategy(cfg.aggregation.strategy())?
        .with_carbon_per_item(cfg.aggregation.carbon_per_item_g)
        .with_cluster_params(
            cfg.aggregation.cluster_radius_m,
            cfg.aggregation.cluster_min_points,
        )?;

    let report = {
        let _stage = ui.stage("Aggregate records");
        let metrics = engine.compute_metrics()?;
        Report {
            most_common_label: metrics.most_common_label(),
            metrics,
            categories: engine.category_breakdown()?,
            hotspots: engine.hotspot_clusters()?,
            heatmap: if heatmap {
                Some(engine.heatmap_points()?)
            } else {
                None
            },
        }
    };

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => {
            let m = &report.metrics;
            println!("Total items       {}", m.total_items);
            println!("Most common       {}", report.most_common_label);
            println!("Hotspots found    {}", m.hotspots_found);
            println!("Carbon offset     {} g CO2", m.carbon_offset_estimate);
            if !report.categories.is_empty() {
                println!();
                println!("Composition");
                for entry in &report.categories {
                    println!("  {:<14} {:>5}  {}", entry.label, entry.count, entry.color);
                }
            }
            if !report.hotspots.is_empty() {
                println!();
                println!("Hotspots");
                for cluster in &report.hotspots {
                    println!(
                        "  {:>9.5},{:>10.5}  {:>4} items  {:<14} r={:.0}m",
                        cluster.centroid.lat,
                        cluster.centroid.lng,
                        cluster.record_count,
                        cluster.dominant_category.label(),
                        cluster.radius_m
                    );
                }
            }
        }
    }
    Ok(())
}

fn list_records(store: &dyn RecordStore, format: Format, limit: Option<usize>) -> Result<()> {
    let mut records = store.list_all()?;
    if let Some(limit) = limit {
        let skip = records.len().saturating_sub(limit);
        records.drain(..skip);
    }
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        Format::Text => {
            for record in &records {
                println!("{}", describe(record));
            }
            if records.is_empty() {
                println!("no records yet");
            }
        }
    }
    Ok(())
}

fn describe(record: &Record) -> String {
    let mut line = format!(
        "{}  {}  {:<14} {:>3.0}%  {:.5},{:.5}",
        record.created_at,
        record.id,
        record.category.label(),
        record.confidence * 100.0,
        record.lat,
        record.lng
    );
    if let Some(description) = &record.description {
        line.push_str("  ");
        line.push_str(description);
    }
    line
}

#[cfg(feature = "enrich-gemini")]
fn deep_scan(
    cfg: &GreenlensConfig,
    store: Arc<dyn RecordStore>,
    ui: &ui::Ui,
    image: Option<std::path::PathBuf>,
    lat: Option<f64>,
    lng: Option<f64>,
) -> Result<()> {
    use greenlens::enrich::GeminiClient;
    use greenlens::{ingest, FrameSource, GeoPoint, RecordPipeline};

    let location = match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)?),
        _ => cfg.location,
    };

    let jpeg = match image {
        Some(path) => std::fs::read(&path)
            .map_err(|e| anyhow!("failed to read image {}: {}", path.display(), e))?,
        None => {
            let _stage = ui.stage("Capture frame");
            let mut source = ingest::open_source(
                &cfg.detection.source_url,
                cfg.detection.width,
                cfg.detection.height,
            )?;
            let frame = source
                .current_frame()?
                .ok_or_else(|| anyhow!("camera has no frame ready"))?;
            frame.encode_jpeg(85)?
        }
    };

    let client = GeminiClient::from_settings(&cfg.enrichment)?;
    let pipeline = RecordPipeline::new(store);
    let outcome = {
        let _stage = ui.stage("AI deep scan");
        greenlens::deep_scan(&client, &jpeg, location, &pipeline)?
    };

    let analysis = &outcome.analysis;
    println!("Item            {}", analysis.item_name);
    println!("Material        {}", analysis.material);
    println!("Recyclability   {}", analysis.recyclability.as_str());
    println!("Disposal        {}", analysis.disposal_advice);
    match &outcome.record {
        Some(record) => println!("Stored record   {}", record.id),
        None => println!("Not stored: location unknown"),
    }
    Ok(())
}

#[cfg(not(feature = "enrich-gemini"))]
fn deep_scan(
    _cfg: &GreenlensConfig,
    _store: Arc<dyn RecordStore>,
    _ui: &ui::Ui,
    _image: Option<std::path::PathBuf>,
    _lat: Option<f64>,
    _lng: Option<f64>,
) -> Result<()> {
    Err(anyhow!(
        "deep scan requires a build with the enrich-gemini feature"
    ))
}
