//! # Geo
//!
//! Spherical geometry used by proximity discovery.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Sphere radius used for distance calculations, in meters.
pub const EARTH_RADIUS_M: f64 = 6_378_100.0;

/// A geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Rejects non-finite or out-of-range coordinates.
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(AppError::Validation(format!(
                "latitude {} out of range",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(AppError::Validation(format!(
                "longitude {} out of range",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Haversine distance in meters between two points.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();

        EARTH_RADIUS_M * c
    }

    /// Point reached by travelling `meters` due east along the equator-parallel.
    /// Only meaningful for small offsets; used to place fixtures at known distances.
    pub fn offset_east(&self, meters: f64) -> GeoPoint {
        let dlon = (meters / (EARTH_RADIUS_M * self.latitude.to_radians().cos())).to_degrees();
        GeoPoint::new(self.longitude + dlon, self.latitude)
    }

    /// Coarse bounding box enclosing every point within `radius_m`.
    ///
    /// Storage adapters use this as an index-friendly prefilter before the
    /// exact haversine check. Longitude bounds are dropped (`None`) when the
    /// circle touches a pole or wraps the antimeridian.
    pub fn bounding_box(&self, radius_m: f64) -> BoundingBox {
        // Angular radius of the search cap
        let angle = radius_m / EARTH_RADIUS_M;
        let dlat = angle.to_degrees();
        let min_lat = self.latitude - dlat;
        let max_lat = self.latitude + dlat;

        let longitude = if min_lat <= -90.0 || max_lat >= 90.0 {
            None
        } else {
            let dlon = (angle.sin() / self.latitude.to_radians().cos())
                .asin()
                .to_degrees();
            let (min_lon, max_lon) = (self.longitude - dlon, self.longitude + dlon);
            if min_lon < -180.0 || max_lon > 180.0 {
                None
            } else {
                Some((min_lon, max_lon))
            }
        };

        BoundingBox {
            min_lat: min_lat.max(-90.0),
            max_lat: max_lat.min(90.0),
            longitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    /// `(min_lon, max_lon)`, absent when the box spans every longitude.
    pub longitude: Option<(f64, f64)>,
}
