//! Engine configuration.

use std::time::Duration;

/// Job action tag used for every contact update dispatch.
pub const ACTION_UPDATE_CONTACT: &str = "ACTION_UPDATE_CONTACT";

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long a fetched subscription list snapshot stays fresh.
    pub subscription_cache_lifetime: Duration,
    /// Minimum time between foreground-triggered resolves.
    pub foreground_resolve_interval: Duration,
    /// Action tag passed to the job dispatcher.
    pub job_action: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            subscription_cache_lifetime: Duration::from_secs(10 * 60),
            foreground_resolve_interval: Duration::from_secs(24 * 60 * 60),
            job_action: ACTION_UPDATE_CONTACT.to_string(),
        }
    }
}
