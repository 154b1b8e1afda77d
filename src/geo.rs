//! Great-circle geometry over WGS84 decimal-degree coordinates.

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Average urban travel speed used for time estimates (km/h).
pub const AVG_SPEED_KMH: f64 = 30.0;

pub const DEFAULT_BEARING_TOLERANCE_DEG: f64 = 45.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Haversine great-circle distance in kilometres.
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Initial bearing from `a` to `b` in degrees, normalized to [0, 360).
pub fn bearing_deg(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlon = (b.lng - a.lng).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Estimated travel time in minutes at the average urban speed.
pub fn travel_time_min(distance_km: f64) -> f64 {
    distance_km / AVG_SPEED_KMH * 60.0
}

pub fn within_radius_km(point: Coordinates, center: Coordinates, radius_km: f64) -> bool {
    distance_km(point, center) <= radius_km
}

/// Whether two trips head the same way: the minimum circular difference
/// between bearings a1→a2 and b1→b2 is within `tolerance_deg`.
pub fn same_direction(
    a1: Coordinates,
    a2: Coordinates,
    b1: Coordinates,
    b2: Coordinates,
    tolerance_deg: f64,
) -> bool {
    let diff = (bearing_deg(a1, a2) - bearing_deg(b1, b2)).abs();
    diff.min(360.0 - diff) <= tolerance_deg
}

/// Arithmetic centroid of a point set. Callers must pass at least one point.
pub fn centroid(points: &[Coordinates]) -> Coordinates {
    assert!(!points.is_empty(), "centroid of an empty point set");

    let n = points.len() as f64;
    let lat = points.iter().map(|p| p.lat).sum::<f64>() / n;
    let lng = points.iter().map(|p| p.lng).sum::<f64>() / n;

    Coordinates::new(lat, lng)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jfk() -> Coordinates {
        Coordinates::new(40.6413, -73.7781)
    }

    fn midtown() -> Coordinates {
        Coordinates::new(40.7580, -73.9855)
    }

    #[test]
    fn distance_jfk_to_midtown_is_about_21_km() {
        let d = distance_km(jfk(), midtown());
        assert!((d - 21.3).abs() < 0.5, "got {d}");
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_self() {
        let d1 = distance_km(jfk(), midtown());
        let d2 = distance_km(midtown(), jfk());
        assert!((d1 - d2).abs() < 1e-9);
        assert!(distance_km(jfk(), jfk()) < 1e-9);
    }

    #[test]
    fn bearing_stays_in_range() {
        let cases = [
            (jfk(), midtown()),
            (midtown(), jfk()),
            (Coordinates::new(0.0, 0.0), Coordinates::new(0.0, 1.0)),
            (Coordinates::new(0.0, 0.0), Coordinates::new(-1.0, 0.0)),
        ];
        for (a, b) in cases {
            let deg = bearing_deg(a, b);
            assert!((0.0..360.0).contains(&deg), "bearing {deg} out of range");
        }
    }

    #[test]
    fn travel_time_assumes_30_kmh() {
        assert!((travel_time_min(30.0) - 60.0).abs() < 1e-9);
        assert!((travel_time_min(21.3) - 42.6).abs() < 1e-9);
    }

    #[test]
    fn within_radius_includes_boundary_neighborhood() {
        assert!(within_radius_km(jfk(), jfk(), 0.0));
        assert!(within_radius_km(midtown(), jfk(), 25.0));
        assert!(!within_radius_km(midtown(), jfk(), 5.0));
    }

    #[test]
    fn opposite_headings_are_not_same_direction() {
        let east = Coordinates::new(40.0, -73.0);
        let west = Coordinates::new(40.0, -75.0);
        let origin = Coordinates::new(40.0, -74.0);
        assert!(!same_direction(origin, east, origin, west, 45.0));
        assert!(same_direction(origin, east, origin, east, 45.0));
    }

    #[test]
    fn same_direction_handles_wraparound_near_north() {
        // Bearings ~350 and ~10 differ by 20 degrees across the wrap.
        let a = Coordinates::new(40.0, 0.0);
        let a_to = Coordinates::new(41.0, -0.2);
        let b_to = Coordinates::new(41.0, 0.2);
        assert!(same_direction(a, a_to, a, b_to, 45.0));
    }

    #[test]
    fn centroid_averages_points() {
        let c = centroid(&[Coordinates::new(0.0, 0.0), Coordinates::new(2.0, 4.0)]);
        assert!((c.lat - 1.0).abs() < 1e-9);
        assert!((c.lng - 2.0).abs() < 1e-9);
    }

    #[test]
    #[should_panic(expected = "centroid of an empty point set")]
    fn centroid_of_empty_set_panics() {
        centroid(&[]);
    }
}
