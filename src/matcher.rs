//! Batch matching: cluster pending requests by pickup proximity, select
//! mutually compatible subsets, and turn feasible plans into proposals.
//!
//! The matcher is a pure pass over in-memory state. It never writes anything;
//! the dispatch service commits (or discards) each proposal independently.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::{Passenger, Pool, VehicleClass};
use crate::geo;
use crate::planner::{self, PlannedRoute, RiderSpec, VehicleLimits};
use crate::pricing;

/// Largest-class ceilings used by the admission predicate.
pub const COMBINED_SEATS_CEILING: u32 = 6;
pub const COMBINED_LUGGAGE_CEILING: u32 = 8;

#[derive(Clone, Debug)]
pub struct MatcherConfig {
    pub budget: Duration,
    pub cluster_radius_km: f64,
    pub max_pool_size: usize,
    pub direction_tolerance_deg: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            budget: Duration::from_millis(250),
            cluster_radius_km: 5.0,
            max_pool_size: 4,
            direction_tolerance_deg: geo::DEFAULT_BEARING_TOLERANCE_DEG,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MatchProposal {
    pub pool_id: Uuid,
    pub passenger_ids: Vec<Uuid>,
    pub vehicle_class: VehicleClass,
    pub total_seats: u32,
    pub total_luggage: u32,
    pub route: PlannedRoute,
    /// Pre-commit fare per passenger; dispatch reprices with the realized
    /// detour before persisting.
    pub fares: HashMap<Uuid, f64>,
    pub efficiency: f64,
}

/// Walk passengers in request order; each unassigned passenger seeds a
/// cluster and absorbs every later unassigned pickup within the radius.
/// Deterministic given input order, intentionally non-optimal.
fn cluster_by_pickup(pending: &[Passenger], radius_km: f64) -> Vec<Vec<usize>> {
    let mut assigned = vec![false; pending.len()];
    let mut clusters = Vec::new();

    for i in 0..pending.len() {
        if assigned[i] {
            continue;
        }
        assigned[i] = true;
        let mut cluster = vec![i];

        for j in (i + 1)..pending.len() {
            if assigned[j] {
                continue;
            }
            if geo::within_radius_km(pending[j].pickup, pending[i].pickup, radius_km) {
                assigned[j] = true;
                cluster.push(j);
            }
        }

        clusters.push(cluster);
    }

    clusters
}

fn combined_load<'a, I>(members: I) -> (u32, u32)
where
    I: IntoIterator<Item = &'a Passenger>,
{
    members.into_iter().fold((0, 0), |(seats, luggage), p| {
        (seats + p.seats_required, luggage + p.luggage_count)
    })
}

/// Admission predicate: the candidate heads the same way as every admitted
/// member and the combined load fits the largest-class ceilings.
fn is_compatible(admitted: &[&Passenger], candidate: &Passenger, tolerance_deg: f64) -> bool {
    let aligned = admitted.iter().all(|member| {
        geo::same_direction(
            member.pickup,
            member.dropoff,
            candidate.pickup,
            candidate.dropoff,
            tolerance_deg,
        )
    });
    if !aligned {
        return false;
    }

    let (seats, luggage) = combined_load(admitted.iter().copied());
    seats + candidate.seats_required <= COMBINED_SEATS_CEILING
        && luggage + candidate.luggage_count <= COMBINED_LUGGAGE_CEILING
}

fn all_mutually_compatible(members: &[&Passenger], tolerance_deg: f64) -> bool {
    for (idx, member) in members.iter().enumerate() {
        if !is_compatible(&members[..idx], member, tolerance_deg) {
            return false;
        }
    }
    true
}

/// Try to turn a passenger subset into a proposal: pick the smallest vehicle
/// class that fits, plan a route from the pickup centroid, and price each
/// seat at the pre-commit pool discount.
pub fn try_form_pool(members: &[&Passenger]) -> Option<MatchProposal> {
    let (total_seats, total_luggage) = combined_load(members.iter().copied());
    let vehicle_class = VehicleClass::smallest_for(total_seats, total_luggage)?;

    let pickups: Vec<_> = members.iter().map(|p| p.pickup).collect();
    let start = geo::centroid(&pickups);

    let riders: Vec<RiderSpec> = members
        .iter()
        .map(|p| {
            RiderSpec::new(
                p.id,
                p.pickup,
                p.dropoff,
                p.seats_required,
                p.luggage_count,
                p.max_detour_minutes,
                p.requested_at,
            )
        })
        .collect();

    let limits = VehicleLimits {
        max_seats: vehicle_class.max_seats(),
        max_luggage: vehicle_class.max_luggage(),
    };
    let route = planner::plan_route(start, &riders, &limits)?;

    let discount = pricing::pool_discount(members.len(), 0.0);
    let fares = members
        .iter()
        .map(|p| (p.id, p.base_fare * p.surge_multiplier * discount))
        .collect();

    let efficiency = route.efficiency;
    Some(MatchProposal {
        pool_id: Uuid::new_v4(),
        passenger_ids: members.iter().map(|p| p.id).collect(),
        vehicle_class,
        total_seats,
        total_luggage,
        route,
        fares,
        efficiency,
    })
}

/// Greedy growth: seed with the oldest unassigned member, then walk the rest
/// newest-first admitting compatible candidates until the pool caps out.
fn grow_pools(
    mut remaining: Vec<&Passenger>,
    config: &MatcherConfig,
    started: Instant,
) -> Vec<MatchProposal> {
    let mut proposals = Vec::new();

    while !remaining.is_empty() {
        if started.elapsed() >= config.budget {
            tracing::warn!(
                unassigned = remaining.len(),
                "matcher budget exhausted mid-cluster"
            );
            break;
        }

        let seed = remaining.remove(0);
        let mut admitted = vec![seed];

        for candidate in remaining.iter().rev() {
            if admitted.len() >= config.max_pool_size {
                break;
            }
            if is_compatible(&admitted, candidate, config.direction_tolerance_deg) {
                admitted.push(candidate);
            }
        }

        match try_form_pool(&admitted) {
            Some(proposal) => {
                remaining.retain(|p| !proposal.passenger_ids.contains(&p.id));
                proposals.push(proposal);
            }
            None => {
                // The group didn't work out; the seed still gets a shot at a
                // solo pool. Companions return to the pile for later seeds.
                if admitted.len() > 1 {
                    if let Some(proposal) = try_form_pool(&[seed]) {
                        proposals.push(proposal);
                    }
                }
            }
        }
    }

    proposals
}

/// One matching pass. `pending` must be sorted oldest-first; `forming` is
/// accepted for the augmentation path, which stays unwired in the batch
/// cycle.
pub fn build_proposals(
    pending: &[Passenger],
    forming: &[Pool],
    config: &MatcherConfig,
) -> Vec<MatchProposal> {
    debug_assert!(
        pending.iter().all(|p| p.is_pending()),
        "matcher input must be pending passengers"
    );
    debug_assert!(
        forming.iter().all(|pool| pool.is_forming()),
        "augmentation candidates must still be forming"
    );

    let started = Instant::now();
    tracing::debug!(
        pending = pending.len(),
        forming = forming.len(),
        "matching pass started"
    );

    let mut proposals = Vec::new();

    for cluster in cluster_by_pickup(pending, config.cluster_radius_km) {
        if started.elapsed() >= config.budget {
            tracing::warn!("matcher budget exhausted, emitting partial result");
            break;
        }

        let members: Vec<&Passenger> = cluster.iter().map(|&idx| &pending[idx]).collect();

        if members.len() <= config.max_pool_size
            && all_mutually_compatible(&members, config.direction_tolerance_deg)
        {
            if let Some(proposal) = try_form_pool(&members) {
                proposals.push(proposal);
                continue;
            }
        }

        proposals.extend(grow_pools(members, config, started));
    }

    proposals
}

/// Score for admitting one more passenger into an existing pool: fuller and
/// older pools rank lower. Used when online augmentation is wired in.
pub fn existing_pool_score(pool: &Pool, now: DateTime<Utc>) -> f64 {
    let occupancy = pool.current_seats as f64 / pool.max_seats.max(1) as f64;
    let age_penalty = (pool.age_minutes(now) * 2.0).min(30.0);
    (100.0 - 20.0 * occupancy - age_penalty).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinates;
    use chrono::TimeZone;

    fn pending_passenger(
        pickup: Coordinates,
        dropoff: Coordinates,
        seats: u32,
        luggage: u32,
        order: i64,
    ) -> Passenger {
        let mut p = Passenger::new(
            Uuid::new_v4(),
            pickup,
            dropoff,
            seats,
            luggage,
            20.0,
            50.0,
            1.0,
        );
        p.requested_at = Utc.timestamp_opt(1_700_000_000 + order, 0).unwrap();
        p
    }

    fn jfk_cluster() -> Vec<Passenger> {
        vec![
            pending_passenger(
                Coordinates::new(40.6413, -73.7781),
                Coordinates::new(40.7550, -73.9840),
                1,
                1,
                0,
            ),
            pending_passenger(
                Coordinates::new(40.6420, -73.7790),
                Coordinates::new(40.7560, -73.9850),
                1,
                0,
                1,
            ),
            pending_passenger(
                Coordinates::new(40.6425, -73.7795),
                Coordinates::new(40.7570, -73.9860),
                1,
                2,
                2,
            ),
        ]
    }

    #[test]
    fn three_aligned_riders_form_one_sedan_pool() {
        let pending = jfk_cluster();
        let proposals = build_proposals(&pending, &[], &MatcherConfig::default());

        assert_eq!(proposals.len(), 1);
        let proposal = &proposals[0];
        assert_eq!(proposal.passenger_ids.len(), 3);
        assert_eq!(proposal.vehicle_class, VehicleClass::Sedan);
        assert_eq!(proposal.total_seats, 3);
        assert_eq!(proposal.total_luggage, 3);
        assert_eq!(proposal.route.stops.len(), 6);

        // Pre-commit price carries the three-way discount.
        for p in &pending {
            let fare = proposal.fares[&p.id];
            assert!((fare - p.base_fare * p.surge_multiplier * 0.70).abs() < 1e-9);
        }
    }

    #[test]
    fn opposite_directions_split_into_singletons() {
        let pending = vec![
            pending_passenger(
                Coordinates::new(40.6413, -73.7781),
                Coordinates::new(40.7580, -73.9855),
                1,
                0,
                0,
            ),
            // Same block, dropoff the opposite way.
            pending_passenger(
                Coordinates::new(40.6414, -73.7782),
                Coordinates::new(40.5200, -73.5600),
                1,
                0,
                1,
            ),
        ];

        let proposals = build_proposals(&pending, &[], &MatcherConfig::default());
        assert_eq!(proposals.len(), 2);
        for proposal in &proposals {
            assert_eq!(proposal.passenger_ids.len(), 1);
        }
    }

    #[test]
    fn distant_pickups_land_in_separate_clusters() {
        let pending = vec![
            pending_passenger(
                Coordinates::new(40.6413, -73.7781),
                Coordinates::new(40.7550, -73.9840),
                1,
                0,
                0,
            ),
            // ~20 km away, far beyond the 5 km cluster radius.
            pending_passenger(
                Coordinates::new(40.7580, -73.9855),
                Coordinates::new(40.8000, -74.0100),
                1,
                0,
                1,
            ),
        ];

        let proposals = build_proposals(&pending, &[], &MatcherConfig::default());
        assert_eq!(proposals.len(), 2);
    }

    #[test]
    fn oversized_party_never_matches() {
        let pending = vec![pending_passenger(
            Coordinates::new(40.6413, -73.7781),
            Coordinates::new(40.7550, -73.9840),
            9,
            0,
            0,
        )];

        let proposals = build_proposals(&pending, &[], &MatcherConfig::default());
        assert!(proposals.is_empty());
    }

    #[test]
    fn seat_ceiling_blocks_admission() {
        // 4 + 4 seats exceeds the 6-seat admission ceiling; each party still
        // pools alone.
        let pending = vec![
            pending_passenger(
                Coordinates::new(40.6413, -73.7781),
                Coordinates::new(40.7550, -73.9840),
                4,
                0,
                0,
            ),
            pending_passenger(
                Coordinates::new(40.6420, -73.7790),
                Coordinates::new(40.7560, -73.9850),
                4,
                0,
                1,
            ),
        ];

        let proposals = build_proposals(&pending, &[], &MatcherConfig::default());
        assert_eq!(proposals.len(), 2);
        for proposal in &proposals {
            assert_eq!(proposal.passenger_ids.len(), 1);
            assert_eq!(proposal.vehicle_class, VehicleClass::Sedan);
        }
    }

    #[test]
    fn proposals_are_deterministic_for_fixed_input() {
        let pending = jfk_cluster();
        let config = MatcherConfig::default();

        let first = build_proposals(&pending, &[], &config);
        let second = build_proposals(&pending, &[], &config);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.passenger_ids, b.passenger_ids);
            assert_eq!(a.vehicle_class, b.vehicle_class);
            let order_a: Vec<_> = a.route.stops.iter().map(|s| (s.passenger_id, s.kind)).collect();
            let order_b: Vec<_> = b.route.stops.iter().map(|s| (s.passenger_id, s.kind)).collect();
            assert_eq!(order_a, order_b);
        }
    }

    #[test]
    fn exhausted_budget_returns_partial_result() {
        let pending = jfk_cluster();
        let config = MatcherConfig {
            budget: Duration::ZERO,
            ..MatcherConfig::default()
        };

        let proposals = build_proposals(&pending, &[], &config);
        assert!(proposals.is_empty());
    }

    #[test]
    fn existing_pool_score_penalizes_occupancy_and_age() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut pool = Pool::new(
            Uuid::new_v4(),
            VehicleClass::Sedan,
            2,
            0,
            10.0,
            serde_json::Value::Null,
        );
        pool.created_at = now;
        let score = existing_pool_score(&pool, now);
        assert!((score - 90.0).abs() < 1e-9, "score {score}");

        // Fifteen minutes old: age penalty saturates at 30.
        pool.created_at = now - chrono::Duration::minutes(20);
        let score = existing_pool_score(&pool, now);
        assert!((score - 60.0).abs() < 1e-9, "score {score}");

        pool.current_seats = 4;
        let score = existing_pool_score(&pool, now);
        assert!((score - 50.0).abs() < 1e-9, "score {score}");
    }
}
