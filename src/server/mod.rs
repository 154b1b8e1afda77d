mod handlers;

use std::net::SocketAddr;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};

use crate::api::DynAPI;
use crate::server::handlers::{pools, rides};

pub fn router(api: DynAPI) -> Router {
    Router::new()
        .route("/api/rides/request", post(rides::create))
        .route("/api/rides/estimate", get(rides::estimate))
        .route("/api/rides/match", post(rides::run_match))
        .route("/api/rides/user/:user_id", get(rides::for_user))
        .route("/api/rides/:id", get(rides::find))
        .route("/api/rides/:id/cancel", post(rides::cancel))
        .route("/api/pools", get(pools::list))
        .route("/api/pools/:id", get(pools::find))
        .route("/api/pools/:id/start", post(pools::start))
        .route("/api/pools/:id/complete", post(pools::complete))
        .layer(Extension(api))
}

pub async fn serve(api: DynAPI, addr: SocketAddr) {
    let app = router(api);

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
