use async_trait::async_trait;
use uuid::Uuid;

use super::Engine;
use crate::api::{PoolAPI, PoolDetails};
use crate::entities::{Passenger, Pool, PoolStatus};
use crate::error::{conflict_error, not_found_error, Error};
use crate::storage::VersionOutcome;
use crate::sync;

#[async_trait]
impl PoolAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn find_pool(&self, id: Uuid) -> Result<PoolDetails, Error> {
        let pool = self
            .store
            .fetch_pool(id)
            .await?
            .ok_or_else(|| not_found_error("pool not found"))?;
        let waypoints = self.store.waypoints_for_pool(id).await?;

        Ok(PoolDetails { pool, waypoints })
    }

    #[tracing::instrument(skip(self))]
    async fn list_pools(&self, status: Option<PoolStatus>) -> Result<Vec<Pool>, Error> {
        self.store.list_pools(status).await
    }

    #[tracing::instrument(skip(self))]
    async fn start_pool(&self, id: Uuid) -> Result<Pool, Error> {
        let pool = self
            .transition_pool(id, |pool| pool.start_transit())
            .await?;
        self.flip_pool_passengers(&pool, |p| p.start_transit())
            .await?;
        Ok(pool)
    }

    #[tracing::instrument(skip(self))]
    async fn complete_pool(&self, id: Uuid) -> Result<Pool, Error> {
        let pool = self.transition_pool(id, |pool| pool.complete()).await?;
        self.flip_pool_passengers(&pool, |p| p.complete()).await?;
        Ok(pool)
    }
}

impl Engine {
    /// Optimistic transition: refetch, mutate, write conditionally on the
    /// version that was read. Conflicts are retried with backoff; the last
    /// conflict surfaces if the budget runs out.
    async fn transition_pool<F>(&self, id: Uuid, transition: F) -> Result<Pool, Error>
    where
        F: Fn(&mut Pool) -> Result<(), Error>,
    {
        sync::retry_with_backoff(&self.config.backoff, || async {
            let mut pool = self
                .store
                .fetch_pool(id)
                .await?
                .ok_or_else(|| not_found_error("pool not found"))?;
            let expected = pool.version;
            transition(&mut pool)?;

            match self.store.update_pool_by_version(&pool, expected).await? {
                VersionOutcome::Updated { new_version } => {
                    pool.version = new_version;
                    Ok(pool)
                }
                VersionOutcome::Conflict => {
                    Err(conflict_error("pool changed underneath the update"))
                }
            }
        })
        .await
    }

    /// Move every passenger riding in the pool through the matching
    /// transition. Passengers that already left (cancelled under the pool
    /// lease) are skipped.
    async fn flip_pool_passengers<F>(&self, pool: &Pool, flip: F) -> Result<(), Error>
    where
        F: Fn(&mut Passenger) -> Result<(), Error>,
    {
        let waypoints = self.store.waypoints_for_pool(pool.id).await?;
        let mut rider_ids: Vec<Uuid> = waypoints.iter().map(|w| w.passenger_id).collect();
        rider_ids.sort();
        rider_ids.dedup();

        for rider_id in rider_ids {
            let mut passenger = match self.store.fetch_passenger(rider_id).await? {
                Some(passenger) => passenger,
                None => continue,
            };
            if let Err(err) = flip(&mut passenger) {
                tracing::warn!(
                    passenger_id = %rider_id,
                    code = err.code,
                    "passenger skipped during pool transition"
                );
                continue;
            }
            self.store.update_passenger(&passenger).await?;
        }

        Ok(())
    }
}
