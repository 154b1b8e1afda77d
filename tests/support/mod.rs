#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;

use farepool::api::RideIntake;
use farepool::config::EngineConfig;
use farepool::engine::Engine;
use farepool::entities::SurgeZone;
use farepool::geo::Coordinates;
use farepool::storage::{MemoryStore, Storage};

pub fn engine() -> (Arc<MemoryStore>, Engine) {
    engine_with_config(EngineConfig::default())
}

pub fn engine_with_config(config: EngineConfig) -> (Arc<MemoryStore>, Engine) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(store.clone() as Arc<dyn Storage>, config);
    (store, engine)
}

pub fn jfk() -> Coordinates {
    Coordinates::new(40.6413, -73.7781)
}

pub fn midtown() -> Coordinates {
    Coordinates::new(40.7580, -73.9855)
}

pub fn intake(pickup: Coordinates, dropoff: Coordinates) -> RideIntake {
    RideIntake {
        user_id: Uuid::new_v4(),
        pickup,
        dropoff,
        seats_required: 1,
        luggage_count: 0,
        max_detour_minutes: 20.0,
    }
}

/// Three riders leaving the same airport block for nearby midtown corners.
pub fn jfk_trio() -> Vec<RideIntake> {
    vec![
        RideIntake {
            luggage_count: 1,
            ..intake(Coordinates::new(40.6413, -73.7781), Coordinates::new(40.7550, -73.9840))
        },
        RideIntake {
            luggage_count: 0,
            ..intake(Coordinates::new(40.6420, -73.7790), Coordinates::new(40.7560, -73.9850))
        },
        RideIntake {
            luggage_count: 2,
            ..intake(Coordinates::new(40.6425, -73.7795), Coordinates::new(40.7570, -73.9860))
        },
    ]
}

pub async fn seed_zone(store: &MemoryStore, name: &str, center: Coordinates) -> SurgeZone {
    let mut zone = SurgeZone::new(name, center, 3.0);
    zone.available_drivers = 10;
    store.insert_surge_zone(&zone).await.unwrap();
    zone
}
