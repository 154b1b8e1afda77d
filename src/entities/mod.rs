mod lease;
mod passenger;
mod pool;
mod surge;
mod waypoint;

pub use lease::{pool_lease_name, LeaseRecord};
pub use passenger::{Passenger, PassengerStatus};
pub use pool::{Pool, PoolStatus, VehicleClass};
pub use surge::{DemandTier, SurgeZone, SURGE_CEILING, SURGE_FLOOR};
pub use waypoint::{Waypoint, WaypointKind};
