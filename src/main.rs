use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use farepool::api::{DynAPI, MaintenanceAPI, MatchAPI};
use farepool::config::EngineConfig;
use farepool::engine::Engine;
use farepool::server;
use farepool::storage::{MemoryStore, PgStore, Storage};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let store: Arc<dyn Storage> = match std::env::var("DATABASE_URL") {
        Ok(url) => Arc::new(PgStore::new(&url, 5).await.expect("database connection")),
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, falling back to the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let engine = Engine::new(store, EngineConfig::default());
    let api: DynAPI = Arc::new(engine);

    spawn_matching_tick(api.clone(), Duration::from_secs(30));
    spawn_surge_tick(api.clone(), Duration::from_secs(60));
    spawn_sweep_tick(api.clone(), Duration::from_secs(60));

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));

    server::serve(api, addr).await;
}

fn spawn_matching_tick(api: DynAPI, period: Duration) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        loop {
            tick.tick().await;
            if let Err(err) = api.run_matching_cycle().await {
                tracing::error!(code = err.code, message = %err.message, "matching cycle failed");
            }
        }
    });
}

fn spawn_surge_tick(api: DynAPI, period: Duration) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        loop {
            tick.tick().await;
            if let Err(err) = api.refresh_surge_zones().await {
                tracing::error!(code = err.code, message = %err.message, "surge refresh failed");
            }
        }
    });
}

fn spawn_sweep_tick(api: DynAPI, period: Duration) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        loop {
            tick.tick().await;
            if let Err(err) = api.sweep_leases().await {
                tracing::error!(code = err.code, message = %err.message, "lease sweep failed");
            }
        }
    });
}
