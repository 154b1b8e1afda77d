mod maintenance_api;
mod match_api;
mod pools_api;
mod rides_api;

use std::sync::Arc;

use crate::api::API;
use crate::config::EngineConfig;
use crate::entities::SurgeZone;
use crate::error::Error;
use crate::geo::Coordinates;
use crate::storage::Storage;

/// The dispatch service: owns every state transition, delegating fare math,
/// planning and matching to their pure modules and all persistence to the
/// store behind it.
pub struct Engine {
    store: Arc<dyn Storage>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(store: Arc<dyn Storage>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// First zone whose radius contains the point, if any.
    pub(crate) async fn surge_zone_at(
        &self,
        point: Coordinates,
    ) -> Result<Option<SurgeZone>, Error> {
        let zones = self.store.list_surge_zones().await?;
        Ok(zones.into_iter().find(|zone| zone.contains(point)))
    }
}

impl API for Engine {}
