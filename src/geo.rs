//! Great-circle helpers for geolocated signals.

use crate::error::FieldIssue;

/// Mean Earth radius (IUGG), kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, FieldIssue> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(FieldIssue::new("latitude", "must be between -90 and 90"));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(FieldIssue::new("longitude", "must be between -180 and 180"));
        }
        Ok(GeoPoint { latitude, longitude })
    }
}

/// Haversine distance in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Geographic centroid: mean of unit vectors, projected back to the sphere.
/// None for no points or when they cancel out (e.g. antipodes).
pub fn centroid(points: &[GeoPoint]) -> Option<GeoPoint> {
    if points.is_empty() {
        return None;
    }
    let (mut x, mut y, mut z) = (0.0, 0.0, 0.0);
    for p in points {
        let (lat, lon) = (p.latitude.to_radians(), p.longitude.to_radians());
        x += lat.cos() * lon.cos();
        y += lat.cos() * lon.sin();
        z += lat.sin();
    }
    let n = points.len() as f64;
    let (x, y, z) = (x / n, y / n, z / n);
    let hyp = (x * x + y * y).sqrt();
    if hyp < 1e-12 && z.abs() < 1e-12 {
        return None;
    }
    Some(GeoPoint {
        latitude: z.atan2(hyp).to_degrees(),
        longitude: y.atan2(x).to_degrees(),
    })
}

/// Latitude/longitude box enclosing the circle of `radius_km` around `center`, as
/// `(min_lat, max_lat, min_lon, max_lon)`. Used to prefilter in SQL before the exact distance.
pub fn bounding_box(center: GeoPoint, radius_km: f64) -> (f64, f64, f64, f64) {
    let angular = radius_km / EARTH_RADIUS_KM;
    let dlat = angular.to_degrees();
    let min_lat = (center.latitude - dlat).max(-90.0);
    let max_lat = (center.latitude + dlat).min(90.0);
    let ratio = angular.sin() / center.latitude.to_radians().cos();
    if max_lat >= 90.0 || min_lat <= -90.0 || !(0.0..1.0).contains(&ratio) || angular >= std::f64::consts::FRAC_PI_2 {
        return (min_lat, max_lat, -180.0, 180.0);
    }
    let dlon = ratio.asin().to_degrees();
    if center.longitude - dlon < -180.0 || center.longitude + dlon > 180.0 {
        return (min_lat, max_lat, -180.0, 180.0);
    }
    (min_lat, max_lat, center.longitude - dlon, center.longitude + dlon)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn paris_to_london() {
        let d = haversine_km(p(48.8566, 2.3522), p(51.5074, -0.1278));
        assert!((d - 343.5).abs() < 1.0, "{}", d);
    }

    #[test]
    fn distance_to_self_is_zero() {
        assert_eq!(haversine_km(p(10.0, 20.0), p(10.0, 20.0)), 0.0);
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(GeoPoint::new(91.0, 0.0).unwrap_err().field, "latitude");
        assert_eq!(GeoPoint::new(0.0, -180.5).unwrap_err().field, "longitude");
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn centroid_of_symmetric_points() {
        let c = centroid(&[p(0.0, -10.0), p(0.0, 10.0)]).unwrap();
        assert!(c.latitude.abs() < 1e-9);
        assert!(c.longitude.abs() < 1e-9);
        assert!(centroid(&[]).is_none());
        assert!(centroid(&[p(0.0, 0.0), p(0.0, 180.0)]).is_none());
    }

    #[test]
    fn bounding_box_contains_circle() {
        let center = p(48.8566, 2.3522);
        let (min_lat, max_lat, min_lon, max_lon) = bounding_box(center, 10.0);
        assert!(min_lat < 48.8566 && max_lat > 48.8566);
        assert!(min_lon < 2.3522 && max_lon > 2.3522);
        let north = p(max_lat, 2.3522);
        assert!((haversine_km(center, north) - 10.0).abs() < 1e-6);
        let (_, _, wmin, wmax) = bounding_box(p(0.0, 179.99), 50.0);
        assert_eq!((wmin, wmax), (-180.0, 180.0));
    }
}
