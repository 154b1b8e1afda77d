use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Passenger, PassengerStatus, Pool, PoolStatus, VehicleClass, Waypoint};
use crate::error::Error;
use crate::geo::Coordinates;
use crate::pricing::Quote;

/// Typed intake record. Field validation (coordinate ranges, positive
/// seats) is the transport's job; the engine trusts what it receives.
#[derive(Clone, Debug, Deserialize)]
pub struct RideIntake {
    pub user_id: Uuid,
    pub pickup: Coordinates,
    pub dropoff: Coordinates,
    pub seats_required: u32,
    pub luggage_count: u32,
    pub max_detour_minutes: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct RideReceipt {
    pub passenger_id: Uuid,
    pub estimated_fare: f64,
    pub status: PassengerStatus,
    pub surge_zone: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RideDetails {
    pub passenger: Passenger,
    pub waypoints: Vec<Waypoint>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FareEstimate {
    pub quote: Quote,
    pub distance_km: f64,
    pub time_min: f64,
    pub vehicle_class: VehicleClass,
    pub surge_zone: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CancelOutcome {
    pub passenger_id: Uuid,
    pub status: PassengerStatus,
    // TODO: refund computation is undefined upstream; always 0 until the
    // billing policy lands.
    pub refund_amount: f64,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct MatchSummary {
    pub matched: u32,
    pub pools_created: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct PoolDetails {
    pub pool: Pool,
    pub waypoints: Vec<Waypoint>,
}

#[async_trait]
pub trait RideAPI {
    async fn create_request(&self, intake: RideIntake) -> Result<RideReceipt, Error>;
    async fn find_ride(&self, id: Uuid) -> Result<RideDetails, Error>;
    async fn rides_for_user(
        &self,
        user_id: Uuid,
        status: Option<PassengerStatus>,
    ) -> Result<Vec<Passenger>, Error>;
    async fn estimate_fare(
        &self,
        pickup: Coordinates,
        dropoff: Coordinates,
        vehicle_class: VehicleClass,
    ) -> Result<FareEstimate, Error>;
    async fn cancel_request(&self, id: Uuid, reason: Option<String>)
        -> Result<CancelOutcome, Error>;
}

#[async_trait]
pub trait MatchAPI {
    async fn run_matching_cycle(&self) -> Result<MatchSummary, Error>;
}

#[async_trait]
pub trait PoolAPI {
    async fn find_pool(&self, id: Uuid) -> Result<PoolDetails, Error>;
    async fn list_pools(&self, status: Option<PoolStatus>) -> Result<Vec<Pool>, Error>;
    async fn start_pool(&self, id: Uuid) -> Result<Pool, Error>;
    async fn complete_pool(&self, id: Uuid) -> Result<Pool, Error>;
}

#[async_trait]
pub trait MaintenanceAPI {
    async fn refresh_surge_zones(&self) -> Result<u32, Error>;
    async fn sweep_leases(&self) -> Result<u64, Error>;
}

pub trait API: RideAPI + MatchAPI + PoolAPI + MaintenanceAPI {}

pub type DynAPI = Arc<dyn API + Send + Sync>;
