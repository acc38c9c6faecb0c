//! Best-effort geolocation for a detection session.
//!
//! A session resolves its position at most once, in the background. Until a
//! fix arrives (or when none ever does) the shared cell stays empty and the
//! record pipeline simply drops detections.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;

const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        let point = Self { lat, lng };
        point.validate()?;
        Ok(point)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(anyhow!("latitude {} outside [-90, 90]", self.lat));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(anyhow!("longitude {} outside [-180, 180]", self.lng));
        }
        Ok(())
    }

    /// Great-circle distance in metres (haversine).
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// Source of a single position fix.
pub trait LocationProvider: Send {
    fn locate(&mut self) -> Result<GeoPoint>;
}

/// Provider returning a configured position.
pub struct FixedLocation(pub GeoPoint);

impl LocationProvider for FixedLocation {
    fn locate(&mut self) -> Result<GeoPoint> {
        Ok(self.0)
    }
}

/// Provider that never produces a fix.
pub struct NoLocation;

impl LocationProvider for NoLocation {
    fn locate(&mut self) -> Result<GeoPoint> {
        Err(anyhow!("no location provider configured"))
    }
}

/// Shared, possibly-empty current location.
#[derive(Clone, Debug, Default)]
pub struct SharedLocation {
    inner: Arc<RwLock<Option<GeoPoint>>>,
}

impl SharedLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn known(point: GeoPoint) -> Self {
        let location = Self::new();
        location.set(point);
        location
    }

    pub fn get(&self) -> Option<GeoPoint> {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, point: GeoPoint) {
        match self.inner.write() {
            Ok(mut guard) => *guard = Some(point),
            Err(poisoned) => *poisoned.into_inner() = Some(point),
        }
    }

    /// Resolve the session position on a background thread.
    ///
    /// Failure leaves the cell empty; it is logged, not returned.
    pub fn resolve_in_background<P>(&self, mut provider: P) -> Result<JoinHandle<()>>
    where
        P: LocationProvider + 'static,
    {
        let cell = self.clone();
        let handle = std::thread::Builder::new()
            .name("greenlens-locate".to_string())
            .spawn(move || match provider.locate().and_then(|p| p.validate().map(|_| p)) {
                Ok(point) => {
                    log::info!("location fix {:.4}, {:.4}", point.lat, point.lng);
                    cell.set(point);
                }
                Err(e) => {
                    log::warn!("location unavailable, records will not be created: {}", e);
                }
            })?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(-33.86, 151.21).is_ok());
    }

    #[test]
    fn haversine_matches_known_distance() {
        // One degree of latitude is ~111.2 km.
        let a = GeoPoint { lat: 0.0, lng: 0.0 };
        let b = GeoPoint { lat: 1.0, lng: 0.0 };
        let d = a.distance_m(&b);
        assert!((d - 111_195.0).abs() < 100.0, "distance was {}", d);
        assert_eq!(a.distance_m(&a), 0.0);
    }

    #[test]
    fn background_resolution_fills_cell() {
        let location = SharedLocation::new();
        assert!(location.get().is_none());
        let handle = location
            .resolve_in_background(FixedLocation(GeoPoint { lat: 52.52, lng: 13.405 }))
            .unwrap();
        handle.join().unwrap();
        assert_eq!(location.get(), Some(GeoPoint { lat: 52.52, lng: 13.405 }));
    }

    #[test]
    fn failed_resolution_leaves_cell_empty() {
        let location = SharedLocation::new();
        location.resolve_in_background(NoLocation).unwrap().join().unwrap();
        assert!(location.get().is_none());
    }
}
