//! Narrow persistence interface. The core is agnostic to the backing store;
//! everything it needs is expressed here, including the lease and
//! version-check primitives whose atomicity each store must provide itself.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::{
    LeaseRecord, Passenger, PassengerStatus, Pool, PoolStatus, SurgeZone, Waypoint,
};
use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionOutcome {
    Updated { new_version: i64 },
    Conflict,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn insert_passenger(&self, passenger: &Passenger) -> Result<(), Error>;
    async fn fetch_passenger(&self, id: Uuid) -> Result<Option<Passenger>, Error>;
    async fn update_passenger(&self, passenger: &Passenger) -> Result<(), Error>;
    /// Pending passengers in FIFO request order, bounded.
    async fn query_pending_passengers(&self, limit: u32) -> Result<Vec<Passenger>, Error>;
    async fn passengers_for_user(
        &self,
        user_id: Uuid,
        status: Option<PassengerStatus>,
    ) -> Result<Vec<Passenger>, Error>;

    /// Insert a freshly formed pool at version 0.
    async fn insert_pool(&self, pool: &Pool) -> Result<(), Error>;
    async fn fetch_pool(&self, id: Uuid) -> Result<Option<Pool>, Error>;
    /// Unconditional update plus version bump. The caller must hold the
    /// pool's lease. Returns the new version.
    async fn update_pool_under_lease(&self, pool: &Pool) -> Result<i64, Error>;
    /// Conditional update: applied only if the stored version equals
    /// `expected_version`, atomically bumping it by one.
    async fn update_pool_by_version(
        &self,
        pool: &Pool,
        expected_version: i64,
    ) -> Result<VersionOutcome, Error>;
    /// Deletes the pool and cascades to its waypoints.
    async fn delete_pool(&self, id: Uuid) -> Result<(), Error>;
    async fn query_forming_pools(&self, max_age: chrono::Duration) -> Result<Vec<Pool>, Error>;
    async fn list_pools(&self, status: Option<PoolStatus>) -> Result<Vec<Pool>, Error>;

    async fn insert_waypoint(&self, waypoint: &Waypoint) -> Result<(), Error>;
    async fn waypoints_for_pool(&self, pool_id: Uuid) -> Result<Vec<Waypoint>, Error>;
    async fn delete_waypoints_for_passenger(
        &self,
        pool_id: Uuid,
        passenger_id: Uuid,
    ) -> Result<(), Error>;

    /// Install a lease for `name` iff none exists or the existing one has
    /// expired (steal). The expiry check and the write must be atomic on the
    /// underlying store.
    async fn try_acquire_lease(&self, name: &str, holder: Uuid, ttl: Duration)
        -> Result<bool, Error>;
    /// Delete the lease only when `holder` matches; mismatches are silent
    /// no-ops.
    async fn release_lease(&self, name: &str, holder: Uuid) -> Result<(), Error>;
    async fn fetch_lease(&self, name: &str) -> Result<Option<LeaseRecord>, Error>;
    /// Delete every expired lease; returns how many were removed.
    async fn sweep_expired_leases(&self) -> Result<u64, Error>;

    async fn insert_surge_zone(&self, zone: &SurgeZone) -> Result<(), Error>;
    async fn list_surge_zones(&self) -> Result<Vec<SurgeZone>, Error>;
    async fn update_surge_zone(&self, zone: &SurgeZone) -> Result<(), Error>;
}
