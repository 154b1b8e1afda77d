//! Waypoint sequencing for shared trips.
//!
//! Expands riders into pickup/dropoff stops, builds a feasible order with a
//! nearest-feasible greedy pass, then improves it with 2-opt. Capacity,
//! pickup-before-dropoff precedence and per-rider detour tolerances are
//! enforced by a single sequence evaluator that every candidate order must
//! pass. Infeasibility is a normal `None` result, not an error.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::WaypointKind;
use crate::geo::{self, Coordinates};

const TWO_OPT_MAX_ITERATIONS: usize = 100;
const DISTANCE_EPSILON: f64 = 1e-9;

#[derive(Clone, Debug)]
pub struct RiderSpec {
    pub passenger_id: Uuid,
    pub pickup: Coordinates,
    pub dropoff: Coordinates,
    pub seats: u32,
    pub luggage: u32,
    pub max_detour_minutes: f64,
    pub direct_distance_km: f64,
    pub direct_time_min: f64,
    pub requested_at: DateTime<Utc>,
}

impl RiderSpec {
    /// Build a rider entry from trip endpoints, deriving the direct leg.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        passenger_id: Uuid,
        pickup: Coordinates,
        dropoff: Coordinates,
        seats: u32,
        luggage: u32,
        max_detour_minutes: f64,
        requested_at: DateTime<Utc>,
    ) -> Self {
        let direct_distance_km = geo::distance_km(pickup, dropoff);
        Self {
            passenger_id,
            pickup,
            dropoff,
            seats,
            luggage,
            max_detour_minutes,
            direct_distance_km,
            direct_time_min: geo::travel_time_min(direct_distance_km),
            requested_at,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct VehicleLimits {
    pub max_seats: u32,
    pub max_luggage: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub passenger_id: Uuid,
    pub kind: WaypointKind,
    pub coordinates: Coordinates,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlannedRoute {
    pub stops: Vec<Stop>,
    pub total_distance_km: f64,
    pub total_time_min: f64,
    /// Realized detour per passenger: onboard time minus direct time.
    pub detour_minutes: HashMap<Uuid, f64>,
    /// Σ direct distance / realized distance; 1.0 = perfectly co-linear.
    pub efficiency: f64,
}

impl PlannedRoute {
    fn empty() -> Self {
        Self {
            stops: Vec::new(),
            total_distance_km: 0.0,
            total_time_min: 0.0,
            detour_minutes: HashMap::new(),
            efficiency: 1.0,
        }
    }
}

struct SequenceMetrics {
    total_distance_km: f64,
    total_time_min: f64,
    detour_minutes: HashMap<Uuid, f64>,
}

/// Walk a candidate order accumulating distance, time and onboard load.
/// Returns `None` if the order breaks precedence, overloads the vehicle, or
/// blows any rider's detour tolerance.
fn evaluate_sequence(
    start: Coordinates,
    stops: &[Stop],
    riders: &HashMap<Uuid, &RiderSpec>,
    limits: &VehicleLimits,
) -> Option<SequenceMetrics> {
    let mut position = start;
    let mut elapsed_min = 0.0;
    let mut total_km = 0.0;
    let mut seats_onboard = 0u32;
    let mut luggage_onboard = 0u32;
    let mut pickup_time: HashMap<Uuid, f64> = HashMap::new();
    let mut detours: HashMap<Uuid, f64> = HashMap::new();

    for stop in stops {
        let rider = riders.get(&stop.passenger_id)?;

        let leg_km = geo::distance_km(position, stop.coordinates);
        total_km += leg_km;
        elapsed_min += geo::travel_time_min(leg_km);
        position = stop.coordinates;

        match stop.kind {
            WaypointKind::Pickup => {
                if pickup_time.contains_key(&rider.passenger_id) {
                    return None;
                }
                seats_onboard += rider.seats;
                luggage_onboard += rider.luggage;
                if seats_onboard > limits.max_seats || luggage_onboard > limits.max_luggage {
                    return None;
                }
                pickup_time.insert(rider.passenger_id, elapsed_min);
            }
            WaypointKind::Dropoff => {
                // A dropoff before its pickup has no defined onboard time.
                let boarded = pickup_time.get(&rider.passenger_id)?;
                if detours.contains_key(&rider.passenger_id) {
                    return None;
                }
                let onboard_min = elapsed_min - boarded;
                let detour = onboard_min - rider.direct_time_min;
                if detour > rider.max_detour_minutes + DISTANCE_EPSILON {
                    return None;
                }
                seats_onboard = seats_onboard.saturating_sub(rider.seats);
                luggage_onboard = luggage_onboard.saturating_sub(rider.luggage);
                detours.insert(rider.passenger_id, detour);
            }
        }
    }

    if detours.len() != riders.len() {
        return None;
    }

    Some(SequenceMetrics {
        total_distance_km: total_km,
        total_time_min: elapsed_min,
        detour_minutes: detours,
    })
}

/// Nearest-feasible greedy construction. Ties on distance go to the rider
/// who has been waiting longest.
fn greedy_sequence(
    start: Coordinates,
    riders: &[RiderSpec],
    limits: &VehicleLimits,
) -> Option<Vec<Stop>> {
    let mut pending: Vec<Stop> = riders
        .iter()
        .flat_map(|r| {
            [
                Stop {
                    passenger_id: r.passenger_id,
                    kind: WaypointKind::Pickup,
                    coordinates: r.pickup,
                },
                Stop {
                    passenger_id: r.passenger_id,
                    kind: WaypointKind::Dropoff,
                    coordinates: r.dropoff,
                },
            ]
        })
        .collect();

    let by_id: HashMap<Uuid, &RiderSpec> =
        riders.iter().map(|r| (r.passenger_id, r)).collect();

    let mut ordered = Vec::with_capacity(pending.len());
    let mut position = start;
    let mut seats_onboard = 0u32;
    let mut luggage_onboard = 0u32;
    let mut onboard: HashMap<Uuid, bool> = HashMap::new();

    while !pending.is_empty() {
        let mut best: Option<(usize, f64)> = None;

        for (idx, stop) in pending.iter().enumerate() {
            let rider = by_id[&stop.passenger_id];
            let feasible = match stop.kind {
                WaypointKind::Pickup => {
                    seats_onboard + rider.seats <= limits.max_seats
                        && luggage_onboard + rider.luggage <= limits.max_luggage
                }
                WaypointKind::Dropoff => onboard.get(&stop.passenger_id).copied().unwrap_or(false),
            };
            if !feasible {
                continue;
            }

            let dist = geo::distance_km(position, stop.coordinates);
            let better = match best {
                None => true,
                Some((best_idx, best_dist)) => {
                    if dist + DISTANCE_EPSILON < best_dist {
                        true
                    } else if (dist - best_dist).abs() <= DISTANCE_EPSILON {
                        rider.requested_at < by_id[&pending[best_idx].passenger_id].requested_at
                    } else {
                        false
                    }
                }
            };
            if better {
                best = Some((idx, dist));
            }
        }

        let (idx, _) = best?;
        let stop = pending.swap_remove(idx);
        let rider = by_id[&stop.passenger_id];
        match stop.kind {
            WaypointKind::Pickup => {
                seats_onboard += rider.seats;
                luggage_onboard += rider.luggage;
                onboard.insert(stop.passenger_id, true);
            }
            WaypointKind::Dropoff => {
                seats_onboard = seats_onboard.saturating_sub(rider.seats);
                luggage_onboard = luggage_onboard.saturating_sub(rider.luggage);
                onboard.insert(stop.passenger_id, false);
            }
        }
        position = stop.coordinates;
        ordered.push(stop);
    }

    Some(ordered)
}

/// 2-opt: reverse [i+1, j] segments while a strictly shorter order exists
/// that still passes the full evaluator, up to an iteration cap.
fn two_opt(
    start: Coordinates,
    mut stops: Vec<Stop>,
    riders: &HashMap<Uuid, &RiderSpec>,
    limits: &VehicleLimits,
    mut best: SequenceMetrics,
) -> (Vec<Stop>, SequenceMetrics) {
    let n = stops.len();
    if n < 3 {
        return (stops, best);
    }

    for _ in 0..TWO_OPT_MAX_ITERATIONS {
        let mut improved = false;

        for i in 0..n.saturating_sub(2) {
            for j in (i + 2)..n {
                let mut candidate = stops.clone();
                candidate[i + 1..=j].reverse();

                if let Some(metrics) = evaluate_sequence(start, &candidate, riders, limits) {
                    if metrics.total_distance_km + DISTANCE_EPSILON < best.total_distance_km {
                        stops = candidate;
                        best = metrics;
                        improved = true;
                    }
                }
            }
        }

        if !improved {
            break;
        }
    }

    (stops, best)
}

/// Plan a feasible pickup/dropoff order, or report that none exists.
pub fn plan_route(
    start: Coordinates,
    riders: &[RiderSpec],
    limits: &VehicleLimits,
) -> Option<PlannedRoute> {
    if riders.is_empty() {
        return Some(PlannedRoute::empty());
    }

    let by_id: HashMap<Uuid, &RiderSpec> =
        riders.iter().map(|r| (r.passenger_id, r)).collect();

    let stops = greedy_sequence(start, riders, limits)?;
    let metrics = evaluate_sequence(start, &stops, &by_id, limits)?;
    let (stops, metrics) = two_opt(start, stops, &by_id, limits, metrics);

    let direct_total: f64 = riders.iter().map(|r| r.direct_distance_km).sum();
    let efficiency = if metrics.total_distance_km > DISTANCE_EPSILON {
        direct_total / metrics.total_distance_km
    } else {
        1.0
    };

    Some(PlannedRoute {
        stops,
        total_distance_km: metrics.total_distance_km,
        total_time_min: metrics.total_time_min,
        detour_minutes: metrics.detour_minutes,
        efficiency,
    })
}
