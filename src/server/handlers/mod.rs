pub mod pools;
pub mod rides;

use serde_json::{json, Value};

use crate::entities::{Passenger, Pool, Waypoint};
use crate::error::{validation_error, Error};
use crate::geo::Coordinates;
use crate::pricing::round2;

pub(crate) fn parse_coordinates(lat: f64, lng: f64, field: &str) -> Result<Coordinates, Error> {
    let point = Coordinates::new(lat, lng);
    if !point.is_valid() {
        return Err(
            validation_error(&format!("{field} coordinates are out of range"))
                .with_details(json!({ "field": field, "lat": lat, "lng": lng })),
        );
    }
    Ok(point)
}

pub(crate) fn passenger_view(p: &Passenger) -> Value {
    json!({
        "id": p.id,
        "user_id": p.user_id,
        "pickup": p.pickup,
        "dropoff": p.dropoff,
        "seats_required": p.seats_required,
        "luggage_count": p.luggage_count,
        "max_detour_minutes": p.max_detour_minutes,
        "status": p.status.name(),
        "pool_id": p.pool_id,
        "base_fare": round2(p.base_fare),
        "final_fare": p.final_fare.map(round2),
        "surge_multiplier": p.surge_multiplier,
        "requested_at": p.requested_at.to_rfc3339(),
        "matched_at": p.matched_at.map(|t| t.to_rfc3339()),
        "completed_at": p.completed_at.map(|t| t.to_rfc3339()),
        "cancelled_at": p.cancelled_at.map(|t| t.to_rfc3339()),
        "cancellation_reason": p.cancellation_reason,
    })
}

pub(crate) fn waypoint_view(w: &Waypoint) -> Value {
    json!({
        "id": w.id,
        "pool_id": w.pool_id,
        "passenger_id": w.passenger_id,
        "seq": w.seq,
        "kind": w.kind.name(),
        "coordinates": w.coordinates,
    })
}

pub(crate) fn pool_view(pool: &Pool) -> Value {
    json!({
        "id": pool.id,
        "driver_id": pool.driver_id,
        "vehicle_class": pool.vehicle_class.name(),
        "max_seats": pool.max_seats,
        "max_luggage": pool.max_luggage,
        "current_seats": pool.current_seats,
        "current_luggage": pool.current_luggage,
        "status": pool.status.name(),
        "total_distance_km": pool.total_distance_km,
        "planned_route": pool.planned_route,
        "created_at": pool.created_at.to_rfc3339(),
        "updated_at": pool.updated_at.to_rfc3339(),
        "version": pool.version,
    })
}
