//! Postgres-backed store. Entities are kept as JSONB documents beside the
//! columns the queries filter on; lease steal and the optimistic version
//! check are single conditional statements so their atomicity comes from the
//! database.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{Executor, Pool as DbPool, Postgres, Row};
use uuid::Uuid;

use crate::entities::{
    LeaseRecord, Passenger, PassengerStatus, Pool, PoolStatus, SurgeZone, Waypoint,
};
use crate::error::{not_found_error, storage_error, Error};
use crate::storage::{Storage, VersionOutcome};

pub struct PgStore {
    pool: DbPool<Postgres>,
}

impl PgStore {
    pub async fn new(db_uri: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_uri)
            .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS passengers (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                status VARCHAR NOT NULL,
                requested_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            )",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS pools (
                id UUID PRIMARY KEY,
                status VARCHAR NOT NULL,
                version BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            )",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS waypoints (
                id UUID PRIMARY KEY,
                pool_id UUID NOT NULL,
                passenger_id UUID NOT NULL,
                seq INT4 NOT NULL,
                data JSONB NOT NULL
            )",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS pool_leases (
                name TEXT PRIMARY KEY,
                holder UUID NOT NULL,
                acquired_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL,
                lease_version BIGINT NOT NULL
            )",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS surge_zones (
                id UUID PRIMARY KEY,
                name VARCHAR NOT NULL,
                data JSONB NOT NULL
            )",
        )
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Storage for PgStore {
    async fn insert_passenger(&self, passenger: &Passenger) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        conn.execute(
            sqlx::query(
                "INSERT INTO passengers (id, user_id, status, requested_at, data)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(passenger.id)
            .bind(passenger.user_id)
            .bind(passenger.status.name())
            .bind(passenger.requested_at)
            .bind(Json(passenger)),
        )
        .await?;

        Ok(())
    }

    async fn fetch_passenger(&self, id: Uuid) -> Result<Option<Passenger>, Error> {
        let mut conn = self.pool.acquire().await?;
        let maybe_row = conn
            .fetch_optional(sqlx::query("SELECT data FROM passengers WHERE id = $1").bind(id))
            .await?;

        match maybe_row {
            Some(row) => {
                let Json(passenger): Json<Passenger> = row.try_get("data")?;
                Ok(Some(passenger))
            }
            None => Ok(None),
        }
    }

    async fn update_passenger(&self, passenger: &Passenger) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        let result = conn
            .execute(
                sqlx::query("UPDATE passengers SET status = $2, data = $3 WHERE id = $1")
                    .bind(passenger.id)
                    .bind(passenger.status.name())
                    .bind(Json(passenger)),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found_error("passenger not found"));
        }
        Ok(())
    }

    async fn query_pending_passengers(&self, limit: u32) -> Result<Vec<Passenger>, Error> {
        let mut conn = self.pool.acquire().await?;
        let rows = conn
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM passengers WHERE status = 'pending'
                     ORDER BY requested_at ASC LIMIT $1",
                )
                .bind(limit as i64),
            )
            .await?;

        rows.into_iter()
            .map(|row| {
                let Json(passenger): Json<Passenger> = row.try_get("data")?;
                Ok(passenger)
            })
            .collect()
    }

    async fn passengers_for_user(
        &self,
        user_id: Uuid,
        status: Option<PassengerStatus>,
    ) -> Result<Vec<Passenger>, Error> {
        let mut conn = self.pool.acquire().await?;
        let rows = match status {
            Some(status) => {
                conn.fetch_all(
                    sqlx::query(
                        "SELECT data FROM passengers WHERE user_id = $1 AND status = $2
                         ORDER BY requested_at ASC",
                    )
                    .bind(user_id)
                    .bind(status.name()),
                )
                .await?
            }
            None => {
                conn.fetch_all(
                    sqlx::query(
                        "SELECT data FROM passengers WHERE user_id = $1
                         ORDER BY requested_at ASC",
                    )
                    .bind(user_id),
                )
                .await?
            }
        };

        rows.into_iter()
            .map(|row| {
                let Json(passenger): Json<Passenger> = row.try_get("data")?;
                Ok(passenger)
            })
            .collect()
    }

    async fn insert_pool(&self, pool: &Pool) -> Result<(), Error> {
        let mut fresh = pool.clone();
        fresh.version = 0;

        let mut conn = self.pool.acquire().await?;
        conn.execute(
            sqlx::query(
                "INSERT INTO pools (id, status, version, created_at, data)
                 VALUES ($1, $2, 0, $3, $4)",
            )
            .bind(fresh.id)
            .bind(fresh.status.name())
            .bind(fresh.created_at)
            .bind(Json(&fresh)),
        )
        .await?;

        Ok(())
    }

    async fn fetch_pool(&self, id: Uuid) -> Result<Option<Pool>, Error> {
        let mut conn = self.pool.acquire().await?;
        let maybe_row = conn
            .fetch_optional(sqlx::query("SELECT data FROM pools WHERE id = $1").bind(id))
            .await?;

        match maybe_row {
            Some(row) => {
                let Json(pool): Json<Pool> = row.try_get("data")?;
                Ok(Some(pool))
            }
            None => Ok(None),
        }
    }

    async fn update_pool_under_lease(&self, pool: &Pool) -> Result<i64, Error> {
        let mut conn = self.pool.acquire().await?;
        let maybe_row = conn
            .fetch_optional(
                sqlx::query(
                    "UPDATE pools
                     SET status = $2,
                         version = version + 1,
                         data = jsonb_set($3::jsonb, '{version}', to_jsonb(version + 1))
                     WHERE id = $1
                     RETURNING version",
                )
                .bind(pool.id)
                .bind(pool.status.name())
                .bind(Json(pool)),
            )
            .await?;

        let row = maybe_row.ok_or_else(|| not_found_error("pool not found"))?;
        let version: i64 = row.try_get("version")?;
        Ok(version)
    }

    async fn update_pool_by_version(
        &self,
        pool: &Pool,
        expected_version: i64,
    ) -> Result<VersionOutcome, Error> {
        let mut conn = self.pool.acquire().await?;
        let result = conn
            .execute(
                sqlx::query(
                    "UPDATE pools
                     SET status = $2,
                         version = $4 + 1,
                         data = jsonb_set($3::jsonb, '{version}', to_jsonb($4::bigint + 1))
                     WHERE id = $1 AND version = $4",
                )
                .bind(pool.id)
                .bind(pool.status.name())
                .bind(Json(pool))
                .bind(expected_version),
            )
            .await?;

        if result.rows_affected() == 1 {
            return Ok(VersionOutcome::Updated {
                new_version: expected_version + 1,
            });
        }

        let exists = conn
            .fetch_optional(sqlx::query("SELECT 1 FROM pools WHERE id = $1").bind(pool.id))
            .await?;
        match exists {
            Some(_) => Ok(VersionOutcome::Conflict),
            None => Err(not_found_error("pool not found")),
        }
    }

    async fn delete_pool(&self, id: Uuid) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        conn.execute(sqlx::query("DELETE FROM waypoints WHERE pool_id = $1").bind(id))
            .await?;
        conn.execute(sqlx::query("DELETE FROM pools WHERE id = $1").bind(id))
            .await?;
        Ok(())
    }

    async fn query_forming_pools(&self, max_age: chrono::Duration) -> Result<Vec<Pool>, Error> {
        let cutoff = Utc::now() - max_age;
        let mut conn = self.pool.acquire().await?;
        let rows = conn
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM pools WHERE status = 'forming' AND created_at >= $1
                     ORDER BY created_at ASC",
                )
                .bind(cutoff),
            )
            .await?;

        rows.into_iter()
            .map(|row| {
                let Json(pool): Json<Pool> = row.try_get("data")?;
                Ok(pool)
            })
            .collect()
    }

    async fn list_pools(&self, status: Option<PoolStatus>) -> Result<Vec<Pool>, Error> {
        let mut conn = self.pool.acquire().await?;
        let rows = match status {
            Some(status) => {
                conn.fetch_all(
                    sqlx::query(
                        "SELECT data FROM pools WHERE status = $1 ORDER BY created_at ASC",
                    )
                    .bind(status.name()),
                )
                .await?
            }
            None => {
                conn.fetch_all(sqlx::query("SELECT data FROM pools ORDER BY created_at ASC"))
                    .await?
            }
        };

        rows.into_iter()
            .map(|row| {
                let Json(pool): Json<Pool> = row.try_get("data")?;
                Ok(pool)
            })
            .collect()
    }

    async fn insert_waypoint(&self, waypoint: &Waypoint) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        conn.execute(
            sqlx::query(
                "INSERT INTO waypoints (id, pool_id, passenger_id, seq, data)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(waypoint.id)
            .bind(waypoint.pool_id)
            .bind(waypoint.passenger_id)
            .bind(waypoint.seq as i32)
            .bind(Json(waypoint)),
        )
        .await?;

        Ok(())
    }

    async fn waypoints_for_pool(&self, pool_id: Uuid) -> Result<Vec<Waypoint>, Error> {
        let mut conn = self.pool.acquire().await?;
        let rows = conn
            .fetch_all(
                sqlx::query("SELECT data FROM waypoints WHERE pool_id = $1 ORDER BY seq ASC")
                    .bind(pool_id),
            )
            .await?;

        rows.into_iter()
            .map(|row| {
                let Json(waypoint): Json<Waypoint> = row.try_get("data")?;
                Ok(waypoint)
            })
            .collect()
    }

    async fn delete_waypoints_for_passenger(
        &self,
        pool_id: Uuid,
        passenger_id: Uuid,
    ) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        conn.execute(
            sqlx::query("DELETE FROM waypoints WHERE pool_id = $1 AND passenger_id = $2")
                .bind(pool_id)
                .bind(passenger_id),
        )
        .await?;
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

        // Steal-if-expired folded into the insert so the expiry check and the
        // write happen in one statement.
        let mut conn = self.pool.acquire().await?;
        let result = conn
            .execute(
                sqlx::query(
                    "INSERT INTO pool_leases (name, holder, acquired_at, expires_at, lease_version)
                     VALUES ($1, $2, $3, $4, 0)
                     ON CONFLICT (name) DO UPDATE
                     SET holder = EXCLUDED.holder,
                         acquired_at = EXCLUDED.acquired_at,
                         expires_at = EXCLUDED.expires_at,
                         lease_version = pool_leases.lease_version + 1
                     WHERE pool_leases.expires_at <= now()",
                )
                .bind(name)
                .bind(holder)
                .bind(now)
                .bind(expires_at),
            )
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_lease(&self, name: &str, holder: Uuid) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        conn.execute(
            sqlx::query("DELETE FROM pool_leases WHERE name = $1 AND holder = $2")
                .bind(name)
                .bind(holder),
        )
        .await?;
        Ok(())
    }

    async fn fetch_lease(&self, name: &str) -> Result<Option<LeaseRecord>, Error> {
        let mut conn = self.pool.acquire().await?;
        let maybe_row = conn
            .fetch_optional(
                sqlx::query(
                    "SELECT name, holder, acquired_at, expires_at, lease_version
                     FROM pool_leases WHERE name = $1",
                )
                .bind(name),
            )
            .await?;

        match maybe_row {
            Some(row) => Ok(Some(LeaseRecord {
                name: row.try_get("name")?,
                holder: row.try_get("holder")?,
                acquired_at: row.try_get("acquired_at")?,
                expires_at: row.try_get("expires_at")?,
                lease_version: row.try_get("lease_version")?,
            })),
            None => Ok(None),
        }
    }

    async fn sweep_expired_leases(&self) -> Result<u64, Error> {
        let mut conn = self.pool.acquire().await?;
        let result = conn
            .execute(sqlx::query("DELETE FROM pool_leases WHERE expires_at <= now()"))
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_surge_zone(&self, zone: &SurgeZone) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        conn.execute(
            sqlx::query("INSERT INTO surge_zones (id, name, data) VALUES ($1, $2, $3)")
                .bind(zone.id)
                .bind(&zone.name)
                .bind(Json(zone)),
        )
        .await?;
        Ok(())
    }

    async fn list_surge_zones(&self) -> Result<Vec<SurgeZone>, Error> {
        let mut conn = self.pool.acquire().await?;
        let rows = conn
            .fetch_all(sqlx::query("SELECT data FROM surge_zones ORDER BY name ASC"))
            .await?;

        rows.into_iter()
            .map(|row| {
                let Json(zone): Json<SurgeZone> = row.try_get("data")?;
                Ok(zone)
            })
            .collect()
    }

    async fn update_surge_zone(&self, zone: &SurgeZone) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        let result = conn
            .execute(
                sqlx::query("UPDATE surge_zones SET name = $2, data = $3 WHERE id = $1")
                    .bind(zone.id)
                    .bind(&zone.name)
                    .bind(Json(zone)),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found_error("surge zone not found"));
        }
        Ok(())
    }
}
