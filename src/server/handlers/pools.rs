use axum::extract::{Extension, Path, Query};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::DynAPI;
use crate::entities::PoolStatus;
use crate::error::{validation_error, Error};
use crate::server::handlers::{pool_view, waypoint_view};

#[derive(Deserialize)]
pub struct StatusFilterParams {
    status: Option<String>,
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, Error> {
    let details = api.find_pool(id).await?;

    Ok(Json(json!({
        "pool": pool_view(&details.pool),
        "waypoints": details.waypoints.iter().map(waypoint_view).collect::<Vec<_>>(),
    })))
}

pub async fn list(
    Extension(api): Extension<DynAPI>,
    Query(params): Query<StatusFilterParams>,
) -> Result<Json<Value>, Error> {
    let status = params
        .status
        .as_deref()
        .map(|raw| PoolStatus::parse(raw).ok_or_else(|| validation_error("unknown pool status")))
        .transpose()?;

    let pools = api.list_pools(status).await?;

    Ok(Json(json!({
        "pools": pools.iter().map(pool_view).collect::<Vec<_>>(),
    })))
}

pub async fn start(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, Error> {
    let pool = api.start_pool(id).await?;
    Ok(Json(json!({ "pool": pool_view(&pool) })))
}

pub async fn complete(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, Error> {
    let pool = api.complete_pool(id).await?;
    Ok(Json(json!({ "pool": pool_view(&pool) })))
}
