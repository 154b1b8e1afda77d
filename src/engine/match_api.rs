use async_trait::async_trait;

use super::Engine;
use crate::api::{MatchAPI, MatchSummary};
use crate::entities::{Pool, Waypoint};
use crate::error::{not_found_error, storage_error, Error};
use crate::matcher::{self, MatchProposal};
use crate::pricing;

#[async_trait]
impl MatchAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn run_matching_cycle(&self) -> Result<MatchSummary, Error> {
        let pending = self
            .store
            .query_pending_passengers(self.config.pending_fetch_limit)
            .await?;
        let forming = self
            .store
            .query_forming_pools(chrono::Duration::minutes(
                self.config.forming_pool_max_age_minutes,
            ))
            .await?;

        let proposals = matcher::build_proposals(&pending, &forming, &self.config.matcher);
        tracing::info!(
            pending = pending.len(),
            proposals = proposals.len(),
            "matching cycle planned"
        );

        // Proposal commits are independent: one failure must not take the
        // rest of the cycle down with it.
        let mut summary = MatchSummary::default();
        for proposal in proposals {
            let pool_id = proposal.pool_id;
            match self.commit_proposal(proposal).await {
                Ok(seated) => {
                    summary.matched += seated;
                    summary.pools_created += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        pool_id = %pool_id,
                        code = err.code,
                        message = %err.message,
                        "proposal commit failed, cycle continues"
                    );
                }
            }
        }

        tracing::info!(
            matched = summary.matched,
            pools = summary.pools_created,
            "matching cycle finished"
        );
        Ok(summary)
    }
}

impl Engine {
    async fn commit_proposal(&self, proposal: MatchProposal) -> Result<u32, Error> {
        let route_json = serde_json::to_value(&proposal.route).map_err(storage_error)?;
        let pool = Pool::new(
            proposal.pool_id,
            proposal.vehicle_class,
            proposal.total_seats,
            proposal.total_luggage,
            proposal.route.total_distance_km,
            route_json,
        );
        self.store.insert_pool(&pool).await?;

        for (seq, stop) in proposal.route.stops.iter().enumerate() {
            self.store
                .insert_waypoint(&Waypoint::new(
                    pool.id,
                    stop.passenger_id,
                    seq as u32,
                    stop.kind,
                    stop.coordinates,
                ))
                .await?;
        }

        // The committed fare replaces the proposal's pre-commit estimate:
        // same discount curve, but with each rider's realized detour.
        let pool_size = proposal.passenger_ids.len();
        let mut seated = 0u32;
        for passenger_id in &proposal.passenger_ids {
            let mut passenger = self
                .store
                .fetch_passenger(*passenger_id)
                .await?
                .ok_or_else(|| not_found_error("matched passenger vanished"))?;

            let detour = proposal
                .route
                .detour_minutes
                .get(passenger_id)
                .copied()
                .unwrap_or(0.0);
            let final_fare = passenger.base_fare
                * passenger.surge_multiplier
                * pricing::pool_discount(pool_size, detour);

            passenger.assign_to_pool(pool.id, final_fare)?;
            self.store.update_passenger(&passenger).await?;
            seated += 1;
        }

        tracing::info!(pool_id = %pool.id, seated, class = pool.vehicle_class.name(), "pool committed");
        Ok(seated)
    }
}
