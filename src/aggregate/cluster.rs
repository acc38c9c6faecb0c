//! Density-based spatial clustering (DBSCAN) over geographic points.

use crate::location::GeoPoint;

/// Cluster `points` with DBSCAN using haversine distance.
///
/// `min_points` counts the point itself. Returns clusters as index lists into
/// `points`, in discovery order; noise points belong to no cluster.
pub fn dbscan(points: &[GeoPoint], radius_m: f64, min_points: usize) -> Vec<Vec<usize>> {
    let min_points = min_points.max(1);
    let mut visited = vec![false; points.len()];
    let mut queued = vec![false; points.len()];
    let mut assigned: Vec<Option<usize>> = vec![None; points.len()];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for i in 0..points.len() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let neighbors = region(points, i, radius_m);
        if neighbors.len() < min_points {
            continue;
        }

        let cluster_id = clusters.len();
        let mut members = vec![i];
        assigned[i] = Some(cluster_id);

        // Each point enters the frontier at most once.
        queued[i] = true;
        let mut frontier = Vec::new();
        enqueue(&mut frontier, &mut queued, neighbors);
        while let Some(j) = frontier.pop() {
            if !visited[j] {
                visited[j] = true;
                let expansion = region(points, j, radius_m);
                if expansion.len() >= min_points {
                    enqueue(&mut frontier, &mut queued, expansion);
                }
            }
            if assigned[j].is_none() {
                assigned[j] = Some(cluster_id);
                members.push(j);
            }
        }
        members.sort_unstable();
        clusters.push(members);
    }
    clusters
}

fn enqueue(frontier: &mut Vec<usize>, queued: &mut [bool], candidates: Vec<usize>) {
    for k in candidates {
        if !queued[k] {
            queued[k] = true;
            frontier.push(k);
        }
    }
}

fn region(points: &[GeoPoint], center: usize, radius_m: f64) -> Vec<usize> {
    let origin = points[center];
    points
        .iter()
        .enumerate()
        .filter(|(_, p)| origin.distance_m(p) <= radius_m)
        .map(|(idx, _)| idx)
        .collect()
}

/// Arithmetic mean of the given points.
pub fn centroid(points: &[GeoPoint]) -> Option<GeoPoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lat, lng) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lng), p| (lat + p.lat, lng + p.lng));
    Some(GeoPoint {
        lat: lat / n,
        lng: lng / n,
    })
}
