use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_state_error, Error};
use crate::geo::Coordinates;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Passenger {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pickup: Coordinates,
    pub dropoff: Coordinates,
    pub luggage_count: u32,
    pub seats_required: u32,
    pub max_detour_minutes: f64,
    pub status: PassengerStatus,
    pub pool_id: Option<Uuid>,
    pub base_fare: f64,
    pub final_fare: Option<f64>,
    pub surge_multiplier: f64,
    pub requested_at: DateTime<Utc>,
    pub matched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassengerStatus {
    Pending,
    Matched,
    InTransit,
    Completed,
    Cancelled,
}

impl PassengerStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Matched => "matched",
            Self::InTransit => "in_transit",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "matched" => Some(Self::Matched),
            "in_transit" => Some(Self::InTransit),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl Passenger {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        pickup: Coordinates,
        dropoff: Coordinates,
        seats_required: u32,
        luggage_count: u32,
        max_detour_minutes: f64,
        base_fare: f64,
        surge_multiplier: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            pickup,
            dropoff,
            luggage_count,
            seats_required,
            max_detour_minutes,
            status: PassengerStatus::Pending,
            pool_id: None,
            base_fare,
            final_fare: None,
            surge_multiplier,
            requested_at: Utc::now(),
            matched_at: None,
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == PassengerStatus::Pending
    }

    /// Pending → Matched, attaching the pool reference and committed fare.
    pub fn assign_to_pool(&mut self, pool_id: Uuid, final_fare: f64) -> Result<(), Error> {
        match self.status {
            PassengerStatus::Pending => {
                self.status = PassengerStatus::Matched;
                self.pool_id = Some(pool_id);
                self.final_fare = Some(final_fare);
                self.matched_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(invalid_state_error("passenger is not pending")),
        }
    }

    pub fn start_transit(&mut self) -> Result<(), Error> {
        match self.status {
            PassengerStatus::Matched => {
                self.status = PassengerStatus::InTransit;
                Ok(())
            }
            _ => Err(invalid_state_error("passenger is not matched")),
        }
    }

    pub fn complete(&mut self) -> Result<(), Error> {
        match self.status {
            PassengerStatus::InTransit => {
                self.status = PassengerStatus::Completed;
                self.completed_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(invalid_state_error("passenger is not in transit")),
        }
    }

    /// Any non-terminal state → Cancelled. Clears the pool reference so a
    /// cancelled record may legally outlive its pool.
    pub fn cancel(&mut self, reason: Option<String>) -> Result<(), Error> {
        if self.status.is_terminal() {
            return Err(invalid_state_error("passenger already finished"));
        }

        self.status = PassengerStatus::Cancelled;
        self.pool_id = None;
        self.cancelled_at = Some(Utc::now());
        self.cancellation_reason = reason;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passenger() -> Passenger {
        Passenger::new(
            Uuid::new_v4(),
            Coordinates::new(40.6413, -73.7781),
            Coordinates::new(40.7580, -73.9855),
            1,
            0,
            20.0,
            70.29,
            1.0,
        )
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut p = passenger();
        assert!(p.is_pending());

        p.assign_to_pool(Uuid::new_v4(), 63.26).unwrap();
        assert_eq!(p.status, PassengerStatus::Matched);
        assert!(p.pool_id.is_some());
        assert!(p.matched_at.is_some());

        p.start_transit().unwrap();
        p.complete().unwrap();
        assert_eq!(p.status, PassengerStatus::Completed);
    }

    #[test]
    fn cancel_clears_pool_reference() {
        let mut p = passenger();
        p.assign_to_pool(Uuid::new_v4(), 63.26).unwrap();
        p.cancel(Some("changed plans".into())).unwrap();

        assert_eq!(p.status, PassengerStatus::Cancelled);
        assert!(p.pool_id.is_none());
        assert!(p.cancelled_at.is_some());
    }

    #[test]
    fn cancel_is_rejected_in_terminal_states() {
        let mut p = passenger();
        p.cancel(None).unwrap();
        assert!(p.cancel(None).is_err());

        let mut q = passenger();
        q.assign_to_pool(Uuid::new_v4(), 10.0).unwrap();
        q.start_transit().unwrap();
        q.complete().unwrap();
        assert!(q.cancel(None).is_err());
    }

    #[test]
    fn match_requires_pending() {
        let mut p = passenger();
        p.cancel(None).unwrap();
        assert!(p.assign_to_pool(Uuid::new_v4(), 10.0).is_err());
    }
}
