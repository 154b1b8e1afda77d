//! Fare math: per-class base fares, composed surge, pooled-seat discounts.
//!
//! Every function here is pure. Monetary values stay unrounded; rounding to
//! two decimals happens at the serialization edge only.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::entities::{DemandTier, SurgeZone, VehicleClass, SURGE_CEILING, SURGE_FLOOR};

const PEAK_MULTIPLIER: f64 = 1.3;
const ZONE_RATIO_THRESHOLD: f64 = 1.5;
const ZONE_RATIO_SLOPE: f64 = 0.5;
const ZONE_RATIO_BONUS_CAP: f64 = 1.5;
const DISCOUNT_PER_COMPANION: f64 = 0.15;
const DETOUR_PENALTY_PER_MIN: f64 = 0.02;
const DISCOUNT_FLOOR: f64 = 0.50;
const SMOOTHING_ALPHA: f64 = 0.3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    #[default]
    Clear,
    Rain,
    Snow,
}

impl Weather {
    pub fn factor(&self) -> f64 {
        match self {
            Self::Clear => 1.0,
            Self::Rain => 1.2,
            Self::Snow => 1.5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FareFactors<'a> {
    pub vehicle_class: VehicleClass,
    pub distance_km: f64,
    pub time_min: f64,
    pub zone: Option<&'a SurgeZone>,
    pub requested_at: DateTime<Utc>,
    pub weather: Weather,
    pub pool_size: usize,
    pub detour_minutes: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub distance_component: f64,
    pub time_component: f64,
    pub minimum_applied: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Quote {
    pub base: f64,
    pub surge_multiplier: f64,
    pub pool_discount: f64,
    pub total: f64,
    pub breakdown: FareBreakdown,
}

/// `max(min_fare, km·rate_km + min·rate_min)` for the class.
pub fn base_fare(class: VehicleClass, distance_km: f64, time_min: f64) -> (f64, FareBreakdown) {
    let distance_component = distance_km * class.rate_per_km();
    let time_component = time_min * class.rate_per_min();
    let metered = distance_component + time_component;
    let base = metered.max(class.min_fare());

    (
        base,
        FareBreakdown {
            distance_component,
            time_component,
            minimum_applied: metered < class.min_fare(),
        },
    )
}

pub fn is_peak_hour(at: DateTime<Utc>) -> bool {
    let weekday = matches!(
        at.weekday(),
        Weekday::Mon | Weekday::Tue | Weekday::Wed | Weekday::Thu | Weekday::Fri
    );
    let hour = at.hour();
    weekday && ((7..10).contains(&hour) || (17..20).contains(&hour))
}

/// Compose the surge multiplier: zone demand pressure, then the zone's own
/// stored multiplier, then peak and weather factors, clamped to
/// [SURGE_FLOOR, SURGE_CEILING].
pub fn surge_multiplier(zone: Option<&SurgeZone>, at: DateTime<Utc>, weather: Weather) -> f64 {
    let mut surge = 1.0;

    if let Some(zone) = zone {
        let ratio = zone.demand_ratio();
        if ratio > ZONE_RATIO_THRESHOLD {
            surge += ((ratio - ZONE_RATIO_THRESHOLD) * ZONE_RATIO_SLOPE).min(ZONE_RATIO_BONUS_CAP);
        }
        surge = surge.max(zone.multiplier);
    }

    if is_peak_hour(at) {
        surge *= PEAK_MULTIPLIER;
    }

    surge *= weather.factor();
    surge.clamp(SURGE_FLOOR, SURGE_CEILING)
}

/// Discount multiplier for a pooled seat: 15% off per companion, eroded 2%
/// per detour minute, never below 0.50. Solo rides pay full price.
pub fn pool_discount(pool_size: usize, detour_minutes: f64) -> f64 {
    if pool_size <= 1 {
        return 1.0;
    }

    let raw = DISCOUNT_PER_COMPANION * (pool_size as f64 - 1.0)
        - DETOUR_PENALTY_PER_MIN * detour_minutes.max(0.0);
    (1.0 - raw.max(0.0)).max(DISCOUNT_FLOOR)
}

pub fn price(factors: &FareFactors) -> Quote {
    let (base, breakdown) = base_fare(factors.vehicle_class, factors.distance_km, factors.time_min);
    let surge = surge_multiplier(factors.zone, factors.requested_at, factors.weather);
    let discount = pool_discount(factors.pool_size, factors.detour_minutes);

    Quote {
        base,
        surge_multiplier: surge,
        pool_discount: discount,
        total: base * surge * discount,
        breakdown,
    }
}

/// Raw target multiplier and tier for a zone's demand ratio.
pub fn demand_tier(ratio: f64) -> (DemandTier, f64) {
    if ratio < 0.5 {
        (DemandTier::Low, 1.0)
    } else if ratio < 1.5 {
        (DemandTier::Normal, 1.0)
    } else if ratio < 3.0 {
        (DemandTier::High, 1.0 + (ratio - 1.5) * 0.4)
    } else {
        (DemandTier::VeryHigh, 1.6 + (ratio - 3.0) * 0.3)
    }
}

/// One refresh step: exponentially smooth the raw target toward the previous
/// multiplier and clamp to the allowed band.
pub fn refresh_surge(
    active_requests: u32,
    available_drivers: u32,
    previous: f64,
) -> (DemandTier, f64) {
    let ratio = active_requests as f64 / available_drivers.max(1) as f64;
    let (tier, raw) = demand_tier(ratio);
    let smoothed = SMOOTHING_ALPHA * raw + (1.0 - SMOOTHING_ALPHA) * previous;

    (tier, smoothed.clamp(SURGE_FLOOR, SURGE_CEILING))
}

/// Round to 2 decimals for user-visible monetary output.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{self, Coordinates};
    use chrono::TimeZone;

    fn weekday_morning() -> DateTime<Utc> {
        // Monday 2024-03-04 09:00 UTC
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    fn sunday_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap()
    }

    #[test]
    fn single_rider_weekday_morning_quote() {
        // JFK to midtown, sedan, weekday peak, no surge zone.
        let distance = geo::distance_km(
            Coordinates::new(40.6413, -73.7781),
            Coordinates::new(40.7580, -73.9855),
        );
        let time = geo::travel_time_min(distance);

        let quote = price(&FareFactors {
            vehicle_class: VehicleClass::Sedan,
            distance_km: distance,
            time_min: time,
            zone: None,
            requested_at: weekday_morning(),
            weather: Weather::Clear,
            pool_size: 1,
            detour_minutes: 0.0,
        });

        assert!((quote.base - 70.29).abs() < 0.6, "base {}", quote.base);
        assert!((quote.surge_multiplier - 1.3).abs() < 1e-9);
        assert!((quote.pool_discount - 1.0).abs() < 1e-9);
        assert!((quote.total - 91.38).abs() < 0.8, "total {}", quote.total);
    }

    #[test]
    fn minimum_fare_kicks_in_on_short_hops() {
        let (base, breakdown) = base_fare(VehicleClass::Sedan, 1.0, 2.0);
        assert!((base - 8.00).abs() < 1e-9);
        assert!(breakdown.minimum_applied);

        let (base, breakdown) = base_fare(VehicleClass::Van, 2.0, 4.0);
        assert!((base - 15.00).abs() < 1e-9);
        assert!(breakdown.minimum_applied);
    }

    #[test]
    fn peak_hours_are_weekday_commute_windows() {
        assert!(is_peak_hour(weekday_morning()));
        assert!(is_peak_hour(
            Utc.with_ymd_and_hms(2024, 3, 8, 17, 30, 0).unwrap()
        ));
        assert!(!is_peak_hour(sunday_noon()));
        assert!(!is_peak_hour(
            Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
        ));
        assert!(!is_peak_hour(
            Utc.with_ymd_and_hms(2024, 3, 4, 20, 0, 0).unwrap()
        ));
    }

    #[test]
    fn zone_pressure_raises_surge_and_stored_multiplier_is_a_floor() {
        let mut zone = SurgeZone::new("jfk", Coordinates::new(40.6413, -73.7781), 3.0);
        zone.active_requests = 20;
        zone.available_drivers = 5; // ratio 4.0 -> bonus min(2.5*0.5, 1.5) capped
        let surge = surge_multiplier(Some(&zone), sunday_noon(), Weather::Clear);
        assert!((surge - 2.25).abs() < 1e-9, "surge {surge}");

        zone.active_requests = 0;
        zone.multiplier = 1.8;
        let surge = surge_multiplier(Some(&zone), sunday_noon(), Weather::Clear);
        assert!((surge - 1.8).abs() < 1e-9);
    }

    #[test]
    fn surge_is_clamped_to_band() {
        let mut zone = SurgeZone::new("jfk", Coordinates::new(40.6413, -73.7781), 3.0);
        zone.active_requests = 100;
        zone.available_drivers = 1;
        zone.multiplier = 3.5;
        let surge = surge_multiplier(Some(&zone), weekday_morning(), Weather::Snow);
        assert!((surge - SURGE_CEILING).abs() < 1e-9);

        let surge = surge_multiplier(None, sunday_noon(), Weather::Clear);
        assert!((surge - SURGE_FLOOR).abs() < 1e-9);
    }

    #[test]
    fn pool_discount_stays_between_half_and_full_price() {
        for size in 0..8 {
            for detour in [0.0, 5.0, 20.0, 120.0, -3.0] {
                let d = pool_discount(size, detour);
                assert!((0.50..=1.0).contains(&d), "size {size} detour {detour}: {d}");
            }
        }

        assert!((pool_discount(1, 10.0) - 1.0).abs() < 1e-9);
        assert!((pool_discount(3, 0.0) - 0.70).abs() < 1e-9);
        // Detour erodes the discount: 0.30 - 0.02*10 = 0.10 off.
        assert!((pool_discount(3, 10.0) - 0.90).abs() < 1e-9);
        // Large parties bottom out at the floor.
        assert!((pool_discount(8, 0.0) - 0.50).abs() < 1e-9);
    }

    #[test]
    fn demand_tiers_follow_the_ratio_table() {
        assert_eq!(demand_tier(0.2).0, DemandTier::Low);
        assert_eq!(demand_tier(1.0).0, DemandTier::Normal);
        let (tier, raw) = demand_tier(2.0);
        assert_eq!(tier, DemandTier::High);
        assert!((raw - 1.2).abs() < 1e-9);
        let (tier, raw) = demand_tier(6.0);
        assert_eq!(tier, DemandTier::VeryHigh);
        assert!((raw - 2.5).abs() < 1e-9);
    }

    #[test]
    fn refresh_smooths_toward_raw_target() {
        // active=30, drivers=5 -> ratio 6, raw 2.5, smoothed 1.45.
        let (tier, first) = refresh_surge(30, 5, 1.0);
        assert_eq!(tier, DemandTier::VeryHigh);
        assert!((first - 1.45).abs() < 1e-9, "first {first}");

        // Repeated ticks with the same inputs converge toward 2.5.
        let (_, second) = refresh_surge(30, 5, first);
        assert!(second > first && second < 2.5);

        let mut value = second;
        for _ in 0..40 {
            value = refresh_surge(30, 5, value).1;
        }
        assert!((value - 2.5).abs() < 0.01, "converged to {value}");
    }

    #[test]
    fn refresh_never_leaves_the_band() {
        let (_, v) = refresh_surge(1000, 1, 3.5);
        assert!(v <= SURGE_CEILING);
        let (_, v) = refresh_surge(0, 10, 1.0);
        assert!(v >= SURGE_FLOOR);
    }

    #[test]
    fn rounding_is_to_cents() {
        assert!((round2(91.3771) - 91.38).abs() < 1e-9);
        assert!((round2(8.004) - 8.0).abs() < 1e-9);
    }
}
