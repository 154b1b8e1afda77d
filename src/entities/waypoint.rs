use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinates;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointKind {
    Pickup,
    Dropoff,
}

impl WaypointKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pickup => "pickup",
            Self::Dropoff => "dropoff",
        }
    }
}

/// One stop along a committed route. Owned by its pool; deleted with it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: Uuid,
    pub pool_id: Uuid,
    pub passenger_id: Uuid,
    pub seq: u32,
    pub kind: WaypointKind,
    pub coordinates: Coordinates,
}

impl Waypoint {
    pub fn new(
        pool_id: Uuid,
        passenger_id: Uuid,
        seq: u32,
        kind: WaypointKind,
        coordinates: Coordinates,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pool_id,
            passenger_id,
            seq,
            kind,
            coordinates,
        }
    }
}
