use crate::matcher::MatcherConfig;
use crate::pricing::Weather;
use crate::sync::{BackoffOptions, LeaseOptions};

/// Engine tunables. Deployments override individual fields before
/// constructing the engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub matcher: MatcherConfig,
    pub lease: LeaseOptions,
    pub backoff: BackoffOptions,
    pub weather: Weather,
    /// How many pending passengers one matching cycle considers.
    pub pending_fetch_limit: u32,
    /// Forming pools older than this are no longer match candidates.
    pub forming_pool_max_age_minutes: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matcher: MatcherConfig::default(),
            lease: LeaseOptions::default(),
            backoff: BackoffOptions::default(),
            weather: Weather::default(),
            pending_fetch_limit: 100,
            forming_pool_max_age_minutes: 10,
        }
    }
}
