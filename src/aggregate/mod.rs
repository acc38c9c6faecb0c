//! Impact metrics and hotspot aggregation over the full record set.
//!
//! Every operation is a pure function of the current store snapshot. Metrics
//! are memoised under the store version and recomputed after any append.

pub mod cluster;

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::category::WasteCategory;
use crate::location::GeoPoint;
use crate::record::Record;
use crate::storage::RecordStore;

/// Estimated CO2 saved per recovered item, in grams.
pub const CARBON_PER_ITEM_G: u64 = 20;

/// Records per hotspot in the count-proxy strategy.
pub const DEFAULT_CLUSTER_SIZE: usize = 5;

pub const DEFAULT_CLUSTER_RADIUS_M: f64 = 50.0;
pub const DEFAULT_CLUSTER_MIN_POINTS: usize = 2;

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImpactMetrics {
    pub total_items: usize,
    /// `None` when the store is empty.
    pub most_common_type: Option<WasteCategory>,
    pub hotspots_found: usize,
    /// Grams of CO2.
    pub carbon_offset_estimate: u64,
}

impl ImpactMetrics {
    pub fn empty() -> Self {
        Self {
            total_items: 0,
            most_common_type: None,
            hotspots_found: 0,
            carbon_offset_estimate: 0,
        }
    }

    pub fn most_common_label(&self) -> &'static str {
        self.most_common_type.map(|c| c.label()).unwrap_or("N/A")
    }
}

/// How `hotspots_found` is derived.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HotspotStrategy {
    /// `ceil(total / cluster_size)`; a coarse density proxy.
    CountProxy { cluster_size: usize },
    /// DBSCAN over record coordinates.
    Density { radius_m: f64, min_points: usize },
}

impl Default for HotspotStrategy {
    fn default() -> Self {
        HotspotStrategy::CountProxy {
            cluster_size: DEFAULT_CLUSTER_SIZE,
        }
    }
}

/// A spatial cluster of records, for map markers.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HotspotCluster {
    pub centroid: GeoPoint,
    pub record_count: usize,
    pub dominant_category: WasteCategory,
    /// Distance from the centroid to the farthest member.
    pub radius_m: f64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct CategoryCount {
    pub category: WasteCategory,
    pub label: &'static str,
    pub color: &'static str,
    pub count: usize,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct HeatmapPoint {
    pub lat: f64,
    pub lng: f64,
    pub intensity: f32,
}

pub struct AggregationEngine {
    store: Arc<dyn RecordStore>,
    strategy: HotspotStrategy,
    carbon_per_item_g: u64,
    cluster_radius_m: f64,
    cluster_min_points: usize,
    cache: Mutex<Option<(u64, ImpactMetrics)>>,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            strategy: HotspotStrategy::default(),
            carbon_per_item_g: CARBON_PER_ITEM_G,
            cluster_radius_m: DEFAULT_CLUSTER_RADIUS_M,
            cluster_min_points: DEFAULT_CLUSTER_MIN_POINTS,
            cache: Mutex::new(None),
        }
    }

    pub fn with_strategy(mut self, strategy: HotspotStrategy) -> Result<Self> {
        match strategy {
            HotspotStrategy::CountProxy { cluster_size: 0 } => {
                return Err(anyhow!("hotspot cluster size must be > 0"))
            }
            HotspotStrategy::Density { radius_m, min_points } => {
                if !radius_m.is_finite() || radius_m <= 0.0 || min_points == 0 {
                    return Err(anyhow!(
                        "density clustering needs radius > 0 and min_points > 0"
                    ));
                }
                self.cluster_radius_m = radius_m;
                self.cluster_min_points = min_points;
            }
            HotspotStrategy::CountProxy { .. } => {}
        }
        self.strategy = strategy;
        Ok(self)
    }

    pub fn with_carbon_per_item(mut self, grams: u64) -> Self {
        self.carbon_per_item_g = grams;
        self
    }

    /// Clustering parameters for `hotspot_clusters`, independent of the
    /// counting strategy.
    pub fn with_cluster_params(mut self, radius_m: f64, min_points: usize) -> Result<Self> {
        if !radius_m.is_finite() || radius_m <= 0.0 || min_points == 0 {
            return Err(anyhow!(
                "cluster radius must be > 0 and min_points > 0"
            ));
        }
        self.cluster_radius_m = radius_m;
        self.cluster_min_points = min_points;
        Ok(self)
    }

    pub fn strategy(&self) -> HotspotStrategy {
        self.strategy
    }

    pub fn compute_metrics(&self) -> Result<ImpactMetrics> {
        // Version is read before the snapshot so a concurrent append can only
        // make the cached entry look stale, never fresh.
        let version = self.store.version()?;
        {
            let cache = self
                .cache
                .lock()
                .map_err(|_| anyhow!("metrics cache lock poisoned"))?;
            if let Some((cached_version, metrics)) = cache.as_ref() {
                if *cached_version == version {
                    return Ok(metrics.clone());
                }
            }
        }

        let records = self.store.list_all()?;
        let metrics = summarize(&records, self.strategy, self.carbon_per_item_g);

        let mut cache = self
            .cache
            .lock()
            .map_err(|_| anyhow!("metrics cache lock poisoned"))?;
        *cache = Some((version, metrics.clone()));
        Ok(metrics)
    }

    pub fn compute_hotspots(&self) -> Result<usize> {
        Ok(self.compute_metrics()?.hotspots_found)
    }

    /// Density clusters for map markers, largest first.
    pub fn hotspot_clusters(&self) -> Result<Vec<HotspotCluster>> {
        let records = self.store.list_all()?;
        Ok(cluster_records(
            &records,
            self.cluster_radius_m,
            self.cluster_min_points,
        ))
    }

    /// Per-category counts, most frequent first.
    pub fn category_breakdown(&self) -> Result<Vec<CategoryCount>> {
        let records = self.store.list_all()?;
        Ok(category_breakdown(&records))
    }

    pub fn heatmap_points(&self) -> Result<Vec<HeatmapPoint>> {
        Ok(self
            .store
            .list_all()?
            .iter()
            .map(|r| HeatmapPoint {
                lat: r.lat,
                lng: r.lng,
                intensity: r.confidence,
            })
            .collect())
    }
}

/// Metrics for a record snapshot.
pub fn summarize(records: &[Record], strategy: HotspotStrategy, carbon_per_item_g: u64) -> ImpactMetrics {
    if records.is_empty() {
        return ImpactMetrics::empty();
    }
    let total_items = records.len();
    ImpactMetrics {
        total_items,
        most_common_type: most_common(records.iter().map(|r| r.category)),
        hotspots_found: count_hotspots(records, strategy),
        carbon_offset_estimate: total_items as u64 * carbon_per_item_g,
    }
}

pub fn count_hotspots(records: &[Record], strategy: HotspotStrategy) -> usize {
    match strategy {
        HotspotStrategy::CountProxy { cluster_size } => {
            records.len().div_ceil(cluster_size.max(1))
        }
        HotspotStrategy::Density { radius_m, min_points } => {
            let points: Vec<GeoPoint> = records.iter().map(Record::location).collect();
            cluster::dbscan(&points, radius_m, min_points).len()
        }
    }
}

/// Highest-count category; ties go to the lexically smallest wire name.
pub fn most_common<I>(categories: I) -> Option<WasteCategory>
where
    I: IntoIterator<Item = WasteCategory>,
{
    let mut counts: HashMap<WasteCategory, usize> = HashMap::new();
    for category in categories {
        *counts.entry(category).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.as_str().cmp(a.0.as_str())))
        .map(|(category, _)| category)
}

pub fn category_breakdown(records: &[Record]) -> Vec<CategoryCount> {
    let mut counts: HashMap<WasteCategory, usize> = HashMap::new();
    for record in records {
        *counts.entry(record.category).or_default() += 1;
    }
    let mut out: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category,
            label: category.label(),
            color: category.color(),
            count,
        })
        .collect();
    out.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.category.as_str().cmp(b.category.as_str()))
    });
    out
}

pub fn cluster_records(records: &[Record], radius_m: f64, min_points: usize) -> Vec<HotspotCluster> {
    let points: Vec<GeoPoint> = records.iter().map(Record::location).collect();
    let mut clusters: Vec<HotspotCluster> = cluster::dbscan(&points, radius_m, min_points)
        .into_iter()
        .filter_map(|members| {
            let member_points: Vec<GeoPoint> = members.iter().map(|&i| points[i]).collect();
            let centroid = cluster::centroid(&member_points)?;
            let dominant_category = most_common(members.iter().map(|&i| records[i].category))?;
            let radius_m = member_points
                .iter()
                .map(|p| centroid.distance_m(p))
                .fold(0.0, f64::max);
            Some(HotspotCluster {
                centroid,
                record_count: members.len(),
                dominant_category,
                radius_m,
            })
        })
        .collect();
    clusters.sort_by(|a, b| b.record_count.cmp(&a.record_count));
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryRecordStore;

    fn record(i: usize, category: WasteCategory, lat: f64, lng: f64) -> Record {
        Record {
            id: format!("rec-{}", i),
            category,
            confidence: 0.9,
            lat,
            lng,
            created_at: 1_700_000_000_000 + i as u64,
            description: None,
        }
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| record(i, WasteCategory::Bottle, 10.0, 10.0))
            .collect()
    }

    #[test]
    fn count_proxy_is_ceiling_of_fifths() {
        let strategy = HotspotStrategy::default();
        let cases = [(0, 0), (1, 1), (5, 1), (6, 2), (10, 2), (11, 3), (23, 5)];
        for (n, expected) in cases {
            assert_eq!(count_hotspots(&records(n), strategy), expected, "n={}", n);
        }
    }

    #[test]
    fn empty_snapshot_yields_sentinel() {
        let metrics = summarize(&[], HotspotStrategy::default(), CARBON_PER_ITEM_G);
        assert_eq!(metrics, ImpactMetrics::empty());
        assert_eq!(metrics.most_common_label(), "N/A");
    }

    #[test]
    fn tie_break_prefers_lexically_smallest_name() {
        use WasteCategory::*;
        assert_eq!(most_common([Trash, Can, Trash, Can]), Some(Can));
        assert_eq!(most_common([PlasticBag, Cup]), Some(Cup));
        assert_eq!(most_common([Cup, Bottle, Cup]), Some(Cup));
        assert_eq!(most_common(std::iter::empty()), None);
    }

    #[test]
    fn breakdown_is_sorted_by_count() {
        let mut rs = records(1);
        rs.push(record(1, WasteCategory::Can, 1.0, 1.0));
        rs.push(record(2, WasteCategory::Can, 1.0, 1.0));
        let breakdown = category_breakdown(&rs);
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].category, WasteCategory::Can);
        assert_eq!(breakdown[0].count, 2);
        assert_eq!(breakdown[0].color, "#ef4444");
        assert_eq!(breakdown[1].label, "Bottle");
    }

    #[test]
    fn density_strategy_counts_spatial_clusters() {
        let store = Arc::new(InMemoryRecordStore::new());
        for i in 0..4 {
            store
                .append(record(i, WasteCategory::Cup, 35.6762 + i as f64 * 0.00005, 139.6503))
                .unwrap();
        }
        store.append(record(10, WasteCategory::Can, -33.8688, 151.2093)).unwrap();
        store.append(record(11, WasteCategory::Can, -33.8688, 151.2094)).unwrap();

        let engine = AggregationEngine::new(store.clone())
            .with_strategy(HotspotStrategy::Density {
                radius_m: 30.0,
                min_points: 2,
            })
            .unwrap();
        assert_eq!(
            engine.strategy(),
            HotspotStrategy::Density {
                radius_m: 30.0,
                min_points: 2
            }
        );
        assert_eq!(engine.compute_hotspots().unwrap(), 2);

        let clusters = engine.hotspot_clusters().unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].record_count, 4);
        assert_eq!(clusters[0].dominant_category, WasteCategory::Cup);
        assert!(clusters[0].radius_m < 30.0);
    }

    #[test]
    fn metrics_cache_invalidates_on_append() {
        let store = Arc::new(InMemoryRecordStore::new());
        let engine = AggregationEngine::new(store.clone());
        assert_eq!(engine.compute_metrics().unwrap().total_items, 0);
        store.append(record(0, WasteCategory::Cup, 0.0, 0.0)).unwrap();
        let metrics = engine.compute_metrics().unwrap();
        assert_eq!(metrics.total_items, 1);
        assert_eq!(metrics.most_common_type, Some(WasteCategory::Cup));
        assert_eq!(engine.compute_metrics().unwrap(), metrics);
    }

    #[test]
    fn rejects_degenerate_strategies() {
        let store = Arc::new(InMemoryRecordStore::new());
        assert!(AggregationEngine::new(store.clone())
            .with_strategy(HotspotStrategy::CountProxy { cluster_size: 0 })
            .is_err());
        assert!(AggregationEngine::new(store)
            .with_strategy(HotspotStrategy::Density {
                radius_m: 0.0,
                min_points: 2
            })
            .is_err());
    }

    #[test]
    fn heatmap_uses_confidence_as_intensity() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.append(record(0, WasteCategory::Trash, 1.0, 2.0)).unwrap();
        let engine = AggregationEngine::new(store);
        let points = engine.heatmap_points().unwrap();
        assert_eq!(points, vec![HeatmapPoint { lat: 1.0, lng: 2.0, intensity: 0.9 }]);
    }
}
