use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::{self, Coordinates};

pub const SURGE_FLOOR: f64 = 1.0;
pub const SURGE_CEILING: f64 = 3.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandTier {
    Low,
    Normal,
    High,
    VeryHigh,
}

impl DemandTier {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

/// Circular demand region. Counters are approximations that drive pricing
/// only, never capacity safety.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SurgeZone {
    pub id: Uuid,
    pub name: String,
    pub center: Coordinates,
    pub radius_km: f64,
    pub multiplier: f64,
    pub demand: DemandTier,
    pub active_requests: u32,
    pub available_drivers: u32,
}

impl SurgeZone {
    pub fn new(name: &str, center: Coordinates, radius_km: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            center,
            radius_km,
            multiplier: SURGE_FLOOR,
            demand: DemandTier::Normal,
            active_requests: 0,
            available_drivers: 0,
        }
    }

    pub fn contains(&self, point: Coordinates) -> bool {
        geo::within_radius_km(point, self.center, self.radius_km)
    }

    /// Demand pressure: active requests per available driver.
    pub fn demand_ratio(&self) -> f64 {
        self.active_requests as f64 / self.available_drivers.max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_is_a_radius_test() {
        let zone = SurgeZone::new("jfk", Coordinates::new(40.6413, -73.7781), 3.0);
        assert!(zone.contains(Coordinates::new(40.6420, -73.7790)));
        assert!(!zone.contains(Coordinates::new(40.7580, -73.9855)));
    }

    #[test]
    fn demand_ratio_guards_division_by_zero() {
        let mut zone = SurgeZone::new("jfk", Coordinates::new(40.6413, -73.7781), 3.0);
        zone.active_requests = 30;
        zone.available_drivers = 0;
        assert!((zone.demand_ratio() - 30.0).abs() < 1e-9);

        zone.available_drivers = 5;
        assert!((zone.demand_ratio() - 6.0).abs() < 1e-9);
    }
}
