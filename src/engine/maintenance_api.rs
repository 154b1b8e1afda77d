use async_trait::async_trait;

use super::Engine;
use crate::api::MaintenanceAPI;
use crate::error::Error;
use crate::pricing;

#[async_trait]
impl MaintenanceAPI for Engine {
    /// Smooth every zone's multiplier toward its demand target.
    #[tracing::instrument(skip(self))]
    async fn refresh_surge_zones(&self) -> Result<u32, Error> {
        let zones = self.store.list_surge_zones().await?;
        let mut refreshed = 0;

        for mut zone in zones {
            let (demand, multiplier) = pricing::refresh_surge(
                zone.active_requests,
                zone.available_drivers,
                zone.multiplier,
            );
            zone.demand = demand;
            zone.multiplier = multiplier;
            self.store.update_surge_zone(&zone).await?;
            tracing::debug!(
                zone = %zone.name,
                tier = zone.demand.name(),
                multiplier = zone.multiplier,
                "surge zone refreshed"
            );
            refreshed += 1;
        }

        Ok(refreshed)
    }

    /// Expired-lease GC. Steal-on-expiry keeps correctness without it; this
    /// bounds storage growth.
    #[tracing::instrument(skip(self))]
    async fn sweep_leases(&self) -> Result<u64, Error> {
        let swept = self.store.sweep_expired_leases().await?;
        if swept > 0 {
            tracing::info!(swept, "expired leases removed");
        }
        Ok(swept)
    }
}
