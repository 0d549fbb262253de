use std::time::Duration;

/// Contains the broker's level capacity and housekeeping intervals.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Maximum number of children a domain, cluster, or channel will accept
    /// before assignment skips it in favor of creating a new one. The check
    /// is advisory: slight over-capacity under races or partial outages is
    /// tolerated rather than serialized.
    pub level_capacity: u64,
    /// How long the correlator waits for a reply to a broker-issued command
    /// before reporting failure to the waiter.
    pub request_timeout: Duration,
    /// Age threshold past which a tracked batch is dropped even with
    /// outstanding feedback.
    pub batch_max_age: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            level_capacity: 1000,
            request_timeout: Duration::from_secs(30),
            batch_max_age: Duration::from_secs(300),
        }
    }
}
