//! In-memory store for tests and single-process development. A single mutex
//! over the whole state gives every trait contract its atomicity for free;
//! the guard is never held across an await point.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::entities::{
    LeaseRecord, Passenger, PassengerStatus, Pool, PoolStatus, SurgeZone, Waypoint,
};
use crate::error::{conflict_error, not_found_error, storage_error, Error};
use crate::storage::{Storage, VersionOutcome};

#[derive(Default)]
struct Inner {
    passengers: HashMap<Uuid, Passenger>,
    pools: HashMap<Uuid, Pool>,
    waypoints: Vec<Waypoint>,
    leases: HashMap<String, LeaseRecord>,
    zones: HashMap<Uuid, SurgeZone>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, Error> {
        self.inner.lock().map_err(storage_error)
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn insert_passenger(&self, passenger: &Passenger) -> Result<(), Error> {
        let mut inner = self.lock()?;
        if inner.passengers.contains_key(&passenger.id) {
            return Err(conflict_error("passenger id already exists"));
        }
        inner.passengers.insert(passenger.id, passenger.clone());
        Ok(())
    }

    async fn fetch_passenger(&self, id: Uuid) -> Result<Option<Passenger>, Error> {
        Ok(self.lock()?.passengers.get(&id).cloned())
    }

    async fn update_passenger(&self, passenger: &Passenger) -> Result<(), Error> {
        let mut inner = self.lock()?;
        if !inner.passengers.contains_key(&passenger.id) {
            return Err(not_found_error("passenger not found"));
        }
        inner.passengers.insert(passenger.id, passenger.clone());
        Ok(())
    }

    async fn query_pending_passengers(&self, limit: u32) -> Result<Vec<Passenger>, Error> {
        let inner = self.lock()?;
        let mut pending: Vec<Passenger> = inner
            .passengers
            .values()
            .filter(|p| p.status == PassengerStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|p| p.requested_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn passengers_for_user(
        &self,
        user_id: Uuid,
        status: Option<PassengerStatus>,
    ) -> Result<Vec<Passenger>, Error> {
        let inner = self.lock()?;
        let mut rides: Vec<Passenger> = inner
            .passengers
            .values()
            .filter(|p| p.user_id == user_id && status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        rides.sort_by_key(|p| p.requested_at);
        Ok(rides)
    }

    async fn insert_pool(&self, pool: &Pool) -> Result<(), Error> {
        let mut inner = self.lock()?;
        if inner.pools.contains_key(&pool.id) {
            return Err(conflict_error("pool id already exists"));
        }
        let mut pool = pool.clone();
        pool.version = 0;
        inner.pools.insert(pool.id, pool);
        Ok(())
    }

    async fn fetch_pool(&self, id: Uuid) -> Result<Option<Pool>, Error> {
        Ok(self.lock()?.pools.get(&id).cloned())
    }

    async fn update_pool_under_lease(&self, pool: &Pool) -> Result<i64, Error> {
        let mut inner = self.lock()?;
        let stored = inner
            .pools
            .get_mut(&pool.id)
            .ok_or_else(|| not_found_error("pool not found"))?;

        let new_version = stored.version + 1;
        let mut updated = pool.clone();
        updated.version = new_version;
        *stored = updated;
        Ok(new_version)
    }

    async fn update_pool_by_version(
        &self,
        pool: &Pool,
        expected_version: i64,
    ) -> Result<VersionOutcome, Error> {
        let mut inner = self.lock()?;
        let stored = inner
            .pools
            .get_mut(&pool.id)
            .ok_or_else(|| not_found_error("pool not found"))?;

        if stored.version != expected_version {
            return Ok(VersionOutcome::Conflict);
        }

        let new_version = expected_version + 1;
        let mut updated = pool.clone();
        updated.version = new_version;
        *stored = updated;
        Ok(VersionOutcome::Updated { new_version })
    }

    async fn delete_pool(&self, id: Uuid) -> Result<(), Error> {
        let mut inner = self.lock()?;
        inner.pools.remove(&id);
        inner.waypoints.retain(|w| w.pool_id != id);
        Ok(())
    }

    async fn query_forming_pools(&self, max_age: chrono::Duration) -> Result<Vec<Pool>, Error> {
        let now = Utc::now();
        let inner = self.lock()?;
        let mut pools: Vec<Pool> = inner
            .pools
            .values()
            .filter(|p| p.status == PoolStatus::Forming && now - p.created_at <= max_age)
            .cloned()
            .collect();
        pools.sort_by_key(|p| p.created_at);
        Ok(pools)
    }

    async fn list_pools(&self, status: Option<PoolStatus>) -> Result<Vec<Pool>, Error> {
        let inner = self.lock()?;
        let mut pools: Vec<Pool> = inner
            .pools
            .values()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        pools.sort_by_key(|p| p.created_at);
        Ok(pools)
    }

    async fn insert_waypoint(&self, waypoint: &Waypoint) -> Result<(), Error> {
        self.lock()?.waypoints.push(waypoint.clone());
        Ok(())
    }

    async fn waypoints_for_pool(&self, pool_id: Uuid) -> Result<Vec<Waypoint>, Error> {
        let inner = self.lock()?;
        let mut waypoints: Vec<Waypoint> = inner
            .waypoints
            .iter()
            .filter(|w| w.pool_id == pool_id)
            .cloned()
            .collect();
        waypoints.sort_by_key(|w| w.seq);
        Ok(waypoints)
    }

    async fn delete_waypoints_for_passenger(
        &self,
        pool_id: Uuid,
        passenger_id: Uuid,
    ) -> Result<(), Error> {
        self.lock()?
            .waypoints
            .retain(|w| !(w.pool_id == pool_id && w.passenger_id == passenger_id));
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        holder: Uuid,
        ttl: Duration,
    ) -> Result<bool, Error> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).map_err(storage_error)?;
        let mut inner = self.lock()?;

        match inner.leases.get_mut(name) {
            None => {
                inner.leases.insert(
                    name.to_string(),
                    LeaseRecord {
                        name: name.to_string(),
                        holder,
                        acquired_at: now,
                        expires_at,
                        lease_version: 0,
                    },
                );
                Ok(true)
            }
            Some(lease) if lease.is_expired(now) => {
                lease.holder = holder;
                lease.acquired_at = now;
                lease.expires_at = expires_at;
                lease.lease_version += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    async fn release_lease(&self, name: &str, holder: Uuid) -> Result<(), Error> {
        let mut inner = self.lock()?;
        if inner.leases.get(name).map(|l| l.holder) == Some(holder) {
            inner.leases.remove(name);
        }
        Ok(())
    }

    async fn fetch_lease(&self, name: &str) -> Result<Option<LeaseRecord>, Error> {
        Ok(self.lock()?.leases.get(name).cloned())
    }

    async fn sweep_expired_leases(&self) -> Result<u64, Error> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        let before = inner.leases.len();
        inner.leases.retain(|_, lease| !lease.is_expired(now));
        Ok((before - inner.leases.len()) as u64)
    }

    async fn insert_surge_zone(&self, zone: &SurgeZone) -> Result<(), Error> {
        self.lock()?.zones.insert(zone.id, zone.clone());
        Ok(())
    }

    async fn list_surge_zones(&self) -> Result<Vec<SurgeZone>, Error> {
        let inner = self.lock()?;
        let mut zones: Vec<SurgeZone> = inner.zones.values().cloned().collect();
        zones.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(zones)
    }

    async fn update_surge_zone(&self, zone: &SurgeZone) -> Result<(), Error> {
        let mut inner = self.lock()?;
        if !inner.zones.contains_key(&zone.id) {
            return Err(not_found_error("surge zone not found"));
        }
        inner.zones.insert(zone.id, zone.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::VehicleClass;
    use crate::geo::Coordinates;

    fn passenger(order_secs: i64) -> Passenger {
        let mut p = Passenger::new(
            Uuid::new_v4(),
            Coordinates::new(40.6413, -73.7781),
            Coordinates::new(40.7580, -73.9855),
            1,
            0,
            15.0,
            50.0,
            1.0,
        );
        p.requested_at = Utc::now() + chrono::Duration::seconds(order_secs);
        p
    }

    fn pool() -> Pool {
        Pool::new(
            Uuid::new_v4(),
            VehicleClass::Sedan,
            2,
            1,
            10.0,
            serde_json::Value::Null,
        )
    }

    #[tokio::test]
    async fn pending_query_is_fifo_and_bounded() {
        let store = MemoryStore::new();
        let newest = passenger(20);
        let middle = passenger(10);
        let oldest = passenger(0);
        for p in [&newest, &middle, &oldest] {
            store.insert_passenger(p).await.unwrap();
        }

        let pending = store.query_pending_passengers(2).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, oldest.id);
        assert_eq!(pending[1].id, middle.id);
    }

    #[tokio::test]
    async fn version_check_detects_conflicts() {
        let store = MemoryStore::new();
        let p = pool();
        store.insert_pool(&p).await.unwrap();

        // Two writers read version 0; only the first conditional write lands.
        let outcome = store.update_pool_by_version(&p, 0).await.unwrap();
        assert_eq!(outcome, VersionOutcome::Updated { new_version: 1 });

        let outcome = store.update_pool_by_version(&p, 0).await.unwrap();
        assert_eq!(outcome, VersionOutcome::Conflict);

        // Refetch and retry succeeds at the next version.
        let fresh = store.fetch_pool(p.id).await.unwrap().unwrap();
        assert_eq!(fresh.version, 1);
        let outcome = store.update_pool_by_version(&fresh, 1).await.unwrap();
        assert_eq!(outcome, VersionOutcome::Updated { new_version: 2 });
    }

    #[tokio::test]
    async fn lease_blocks_then_expires_then_steals() {
        let store = MemoryStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert!(store
            .try_acquire_lease("pool:x", first, Duration::from_secs(30))
            .await
            .unwrap());
        assert!(!store
            .try_acquire_lease("pool:x", second, Duration::from_secs(30))
            .await
            .unwrap());

        // An expired lease is stolen in place, bumping its version.
        assert!(store
            .try_acquire_lease("pool:y", first, Duration::ZERO)
            .await
            .unwrap());
        assert!(store
            .try_acquire_lease("pool:y", second, Duration::from_secs(30))
            .await
            .unwrap());
        let lease = store.fetch_lease("pool:y").await.unwrap().unwrap();
        assert_eq!(lease.holder, second);
        assert_eq!(lease.lease_version, 1);
    }

    #[tokio::test]
    async fn stale_holder_cannot_release_a_refreshed_lease() {
        let store = MemoryStore::new();
        let stale = Uuid::new_v4();
        let current = Uuid::new_v4();

        assert!(store
            .try_acquire_lease("pool:z", stale, Duration::ZERO)
            .await
            .unwrap());
        assert!(store
            .try_acquire_lease("pool:z", current, Duration::from_secs(30))
            .await
            .unwrap());

        // The stale holder's release is a silent no-op.
        store.release_lease("pool:z", stale).await.unwrap();
        let lease = store.fetch_lease("pool:z").await.unwrap().unwrap();
        assert_eq!(lease.holder, current);

        store.release_lease("pool:z", current).await.unwrap();
        assert!(store.fetch_lease("pool:z").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_leases() {
        let store = MemoryStore::new();
        let holder = Uuid::new_v4();
        store
            .try_acquire_lease("expired", holder, Duration::ZERO)
            .await
            .unwrap();
        store
            .try_acquire_lease("live", holder, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.sweep_expired_leases().await.unwrap(), 1);
        assert!(store.fetch_lease("expired").await.unwrap().is_none());
        assert!(store.fetch_lease("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_pool_cascades_to_waypoints() {
        let store = MemoryStore::new();
        let p = pool();
        let rider = Uuid::new_v4();
        store.insert_pool(&p).await.unwrap();
        store
            .insert_waypoint(&Waypoint::new(
                p.id,
                rider,
                0,
                crate::entities::WaypointKind::Pickup,
                Coordinates::new(40.0, -73.0),
            ))
            .await
            .unwrap();

        store.delete_pool(p.id).await.unwrap();
        assert!(store.fetch_pool(p.id).await.unwrap().is_none());
        assert!(store.waypoints_for_pool(p.id).await.unwrap().is_empty());
    }
}
