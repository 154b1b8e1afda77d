use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::{DynAPI, RideIntake};
use crate::entities::{PassengerStatus, VehicleClass};
use crate::error::{validation_error, Error};
use crate::pricing::round2;
use crate::server::handlers::{parse_coordinates, passenger_view, waypoint_view};

#[derive(Deserialize)]
pub struct RequestRideParams {
    user_id: Uuid,
    pickup_lat: f64,
    pickup_lng: f64,
    dropoff_lat: f64,
    dropoff_lng: f64,
    luggage_count: Option<u32>,
    seats_required: Option<u32>,
    max_detour_minutes: Option<f64>,
}

#[derive(Deserialize)]
pub struct CancelParams {
    reason: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusFilterParams {
    status: Option<String>,
}

#[derive(Deserialize)]
pub struct EstimateParams {
    pickup_lat: f64,
    pickup_lng: f64,
    dropoff_lat: f64,
    dropoff_lng: f64,
    vehicle_type: Option<String>,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    Json(params): Json<RequestRideParams>,
) -> Result<(StatusCode, Json<Value>), Error> {
    let pickup = parse_coordinates(params.pickup_lat, params.pickup_lng, "pickup")?;
    let dropoff = parse_coordinates(params.dropoff_lat, params.dropoff_lng, "dropoff")?;

    let seats_required = params.seats_required.unwrap_or(1);
    if seats_required == 0 {
        return Err(validation_error("seats_required must be at least 1"));
    }
    let max_detour_minutes = params.max_detour_minutes.unwrap_or(15.0);
    if max_detour_minutes <= 0.0 {
        return Err(validation_error("max_detour_minutes must be positive"));
    }

    let receipt = api
        .create_request(RideIntake {
            user_id: params.user_id,
            pickup,
            dropoff,
            seats_required,
            luggage_count: params.luggage_count.unwrap_or(0),
            max_detour_minutes,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "passenger_id": receipt.passenger_id,
            "estimated_price": round2(receipt.estimated_fare),
            "status": receipt.status.name(),
            "surge_zone": receipt.surge_zone,
        })),
    ))
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, Error> {
    let details = api.find_ride(id).await?;

    Ok(Json(json!({
        "passenger": passenger_view(&details.passenger),
        "waypoints": details.waypoints.iter().map(waypoint_view).collect::<Vec<_>>(),
    })))
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
    params: Option<Json<CancelParams>>,
) -> Result<Json<Value>, Error> {
    let reason = params.and_then(|Json(p)| p.reason);
    let outcome = api.cancel_request(id, reason).await?;

    Ok(Json(json!({
        "success": true,
        "passenger_id": outcome.passenger_id,
        "status": outcome.status.name(),
        "refund_amount": round2(outcome.refund_amount),
    })))
}

pub async fn for_user(
    Extension(api): Extension<DynAPI>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<StatusFilterParams>,
) -> Result<Json<Value>, Error> {
    let status = params
        .status
        .as_deref()
        .map(|raw| {
            PassengerStatus::parse(raw).ok_or_else(|| validation_error("unknown ride status"))
        })
        .transpose()?;

    let rides = api.rides_for_user(user_id, status).await?;

    Ok(Json(json!({
        "rides": rides.iter().map(passenger_view).collect::<Vec<_>>(),
    })))
}

pub async fn estimate(
    Extension(api): Extension<DynAPI>,
    Query(params): Query<EstimateParams>,
) -> Result<Json<Value>, Error> {
    let pickup = parse_coordinates(params.pickup_lat, params.pickup_lng, "pickup")?;
    let dropoff = parse_coordinates(params.dropoff_lat, params.dropoff_lng, "dropoff")?;

    let vehicle_class = match params.vehicle_type.as_deref() {
        Some(raw) => {
            VehicleClass::parse(raw).ok_or_else(|| validation_error("unknown vehicle class"))?
        }
        None => VehicleClass::Sedan,
    };

    let estimate = api.estimate_fare(pickup, dropoff, vehicle_class).await?;

    Ok(Json(json!({
        "pricing": {
            "vehicle_class": estimate.vehicle_class.name(),
            "distance_km": estimate.distance_km,
            "estimated_minutes": estimate.time_min,
            "base_fare": round2(estimate.quote.base),
            "surge_multiplier": estimate.quote.surge_multiplier,
            "pool_discount": estimate.quote.pool_discount,
            "total": round2(estimate.quote.total),
            "breakdown": {
                "distance_component": round2(estimate.quote.breakdown.distance_component),
                "time_component": round2(estimate.quote.breakdown.time_component),
                "minimum_applied": estimate.quote.breakdown.minimum_applied,
            },
        },
        "surge_zone": estimate.surge_zone,
    })))
}

pub async fn run_match(Extension(api): Extension<DynAPI>) -> Result<Json<Value>, Error> {
    let summary = api.run_matching_cycle().await?;

    Ok(Json(json!({
        "matched": summary.matched,
        "pools_created": summary.pools_created,
    })))
}
