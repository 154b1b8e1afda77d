use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{invalid_state_error, Error};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    Sedan,
    Suv,
    Van,
}

impl VehicleClass {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sedan => "sedan",
            Self::Suv => "suv",
            Self::Van => "van",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sedan" => Some(Self::Sedan),
            "suv" => Some(Self::Suv),
            "van" => Some(Self::Van),
            _ => None,
        }
    }

    pub fn max_seats(&self) -> u32 {
        match self {
            Self::Sedan => 4,
            Self::Suv => 6,
            Self::Van => 8,
        }
    }

    pub fn max_luggage(&self) -> u32 {
        match self {
            Self::Sedan => 3,
            Self::Suv => 5,
            Self::Van => 8,
        }
    }

    pub fn rate_per_km(&self) -> f64 {
        match self {
            Self::Sedan => 2.50,
            Self::Suv => 3.50,
            Self::Van => 4.50,
        }
    }

    pub fn rate_per_min(&self) -> f64 {
        match self {
            Self::Sedan => 0.40,
            Self::Suv => 0.55,
            Self::Van => 0.70,
        }
    }

    pub fn min_fare(&self) -> f64 {
        match self {
            Self::Sedan => 8.00,
            Self::Suv => 12.00,
            Self::Van => 15.00,
        }
    }

    /// Smallest class whose capacity dominates both totals.
    pub fn smallest_for(seats: u32, luggage: u32) -> Option<Self> {
        [Self::Sedan, Self::Suv, Self::Van]
            .into_iter()
            .find(|class| seats <= class.max_seats() && luggage <= class.max_luggage())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Forming,
    Matched,
    InTransit,
    Completed,
}

impl PoolStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Forming => "forming",
            Self::Matched => "matched",
            Self::InTransit => "in_transit",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "forming" => Some(Self::Forming),
            "matched" => Some(Self::Matched),
            "in_transit" => Some(Self::InTransit),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pool {
    pub id: Uuid,
    pub driver_id: Option<Uuid>,
    pub vehicle_class: VehicleClass,
    pub max_seats: u32,
    pub max_luggage: u32,
    pub current_seats: u32,
    pub current_luggage: u32,
    pub status: PoolStatus,
    pub total_distance_km: f64,
    pub planned_route: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotonic counter for optimistic concurrency; bumped by the store on
    /// every mutation.
    pub version: i64,
}

impl Pool {
    pub fn new(
        id: Uuid,
        vehicle_class: VehicleClass,
        current_seats: u32,
        current_luggage: u32,
        total_distance_km: f64,
        planned_route: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            driver_id: None,
            vehicle_class,
            max_seats: vehicle_class.max_seats(),
            max_luggage: vehicle_class.max_luggage(),
            current_seats,
            current_luggage,
            status: PoolStatus::Forming,
            total_distance_km,
            planned_route,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_forming(&self) -> bool {
        self.status == PoolStatus::Forming
    }

    pub fn is_empty(&self) -> bool {
        self.current_seats == 0
    }

    pub fn age_minutes(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds() as f64 / 60.0
    }

    /// Forming|Matched → InTransit. A driver is not required: assignment is
    /// handled outside this engine.
    pub fn start_transit(&mut self) -> Result<(), Error> {
        match self.status {
            PoolStatus::Forming | PoolStatus::Matched => {
                self.status = PoolStatus::InTransit;
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(invalid_state_error("pool already departed")),
        }
    }

    pub fn complete(&mut self) -> Result<(), Error> {
        match self.status {
            PoolStatus::InTransit => {
                self.status = PoolStatus::Completed;
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(invalid_state_error("pool is not in transit")),
        }
    }

    /// Give back a cancelling passenger's share of the load.
    pub fn release_capacity(&mut self, seats: u32, luggage: u32) {
        self.current_seats = self.current_seats.saturating_sub(seats);
        self.current_luggage = self.current_luggage.saturating_sub(luggage);
        self.updated_at = Utc::now();
    }
}
