use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::Engine;
use crate::api::{CancelOutcome, FareEstimate, RideAPI, RideDetails, RideIntake, RideReceipt};
use crate::entities::{pool_lease_name, Passenger, PassengerStatus, VehicleClass};
use crate::error::{conflict_error, invalid_state_error, not_found_error, Error};
use crate::geo::{self, Coordinates};
use crate::pricing::{self, FareFactors};
use crate::sync::{self, LeaseOutcome};

#[async_trait]
impl RideAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn create_request(&self, intake: RideIntake) -> Result<RideReceipt, Error> {
        let distance_km = geo::distance_km(intake.pickup, intake.dropoff);
        let time_min = geo::travel_time_min(distance_km);
        let zone = self.surge_zone_at(intake.pickup).await?;

        // Advisory estimate: solo sedan pricing. The committed fare is set
        // at match time.
        let quote = pricing::price(&FareFactors {
            vehicle_class: VehicleClass::Sedan,
            distance_km,
            time_min,
            zone: zone.as_ref(),
            requested_at: Utc::now(),
            weather: self.config.weather,
            pool_size: 1,
            detour_minutes: 0.0,
        });

        let passenger = Passenger::new(
            intake.user_id,
            intake.pickup,
            intake.dropoff,
            intake.seats_required,
            intake.luggage_count,
            intake.max_detour_minutes,
            quote.base,
            quote.surge_multiplier,
        );
        self.store.insert_passenger(&passenger).await?;

        let surge_zone = match zone {
            Some(mut zone) => {
                zone.active_requests += 1;
                self.store.update_surge_zone(&zone).await?;
                Some(zone.name)
            }
            None => None,
        };

        tracing::info!(passenger_id = %passenger.id, "ride request accepted");

        Ok(RideReceipt {
            passenger_id: passenger.id,
            estimated_fare: quote.total,
            status: passenger.status,
            surge_zone,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, id: Uuid) -> Result<RideDetails, Error> {
        let passenger = self
            .store
            .fetch_passenger(id)
            .await?
            .ok_or_else(|| not_found_error("passenger not found"))?;

        let waypoints = match passenger.pool_id {
            Some(pool_id) => self.store.waypoints_for_pool(pool_id).await?,
            None => Vec::new(),
        };

        Ok(RideDetails {
            passenger,
            waypoints,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn rides_for_user(
        &self,
        user_id: Uuid,
        status: Option<PassengerStatus>,
    ) -> Result<Vec<Passenger>, Error> {
        self.store.passengers_for_user(user_id, status).await
    }

    #[tracing::instrument(skip(self))]
    async fn estimate_fare(
        &self,
        pickup: Coordinates,
        dropoff: Coordinates,
        vehicle_class: VehicleClass,
    ) -> Result<FareEstimate, Error> {
        let distance_km = geo::distance_km(pickup, dropoff);
        let time_min = geo::travel_time_min(distance_km);
        let zone = self.surge_zone_at(pickup).await?;

        let quote = pricing::price(&FareFactors {
            vehicle_class,
            distance_km,
            time_min,
            zone: zone.as_ref(),
            requested_at: Utc::now(),
            weather: self.config.weather,
            pool_size: 1,
            detour_minutes: 0.0,
        });

        Ok(FareEstimate {
            quote,
            distance_km,
            time_min,
            vehicle_class,
            surge_zone: zone.map(|z| z.name),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_request(
        &self,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<CancelOutcome, Error> {
        let passenger = self
            .store
            .fetch_passenger(id)
            .await?
            .ok_or_else(|| not_found_error("passenger not found"))?;

        if passenger.status.is_terminal() {
            return Err(invalid_state_error("ride already finished"));
        }

        // Unpooled rides cancel without coordination.
        let Some(pool_id) = passenger.pool_id else {
            let mut passenger = passenger;
            passenger.cancel(reason)?;
            self.store.update_passenger(&passenger).await?;
            return Ok(CancelOutcome {
                passenger_id: id,
                status: passenger.status,
                refund_amount: 0.0,
            });
        };

        let name = pool_lease_name(pool_id);
        let holder = Uuid::new_v4();
        let store = Arc::clone(&self.store);

        let outcome = sync::with_lease(
            &self.store,
            &name,
            holder,
            &self.config.lease,
            move || async move {
                // Re-read under the lease: a concurrent cancel may have
                // already emptied the pool or finished this passenger.
                let mut passenger = store
                    .fetch_passenger(id)
                    .await?
                    .ok_or_else(|| not_found_error("passenger not found"))?;
                if passenger.status.is_terminal() {
                    return Err(invalid_state_error("ride already finished"));
                }

                let seats = passenger.seats_required;
                let luggage = passenger.luggage_count;
                let pooled = passenger.pool_id;

                passenger.cancel(reason)?;
                store.update_passenger(&passenger).await?;

                if let Some(pool_id) = pooled {
                    if let Some(mut pool) = store.fetch_pool(pool_id).await? {
                        store.delete_waypoints_for_passenger(pool_id, id).await?;
                        pool.release_capacity(seats, luggage);
                        let emptied = pool.is_empty();
                        store.update_pool_under_lease(&pool).await?;
                        if emptied {
                            tracing::info!(pool_id = %pool_id, "last passenger left, destroying pool");
                            store.delete_pool(pool_id).await?;
                        }
                    }
                }

                Ok(CancelOutcome {
                    passenger_id: id,
                    status: passenger.status,
                    refund_amount: 0.0,
                })
            },
        )
        .await?;

        match outcome {
            LeaseOutcome::Completed(result) => Ok(result),
            LeaseOutcome::Unavailable => {
                Err(conflict_error("pool is busy, retry the cancellation"))
            }
        }
    }
}
