#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::Constant;
use bon::Builder;

const DEFAULT_RECONNECT_DELAY_DURATION: Duration = Duration::from_secs(3);
/// Broadcast channel capacity for incoming messages.
const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// Configuration for WebSocket client behavior.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
    /// Number of inbound messages buffered per subscriber before it starts lagging
    #[builder(default = DEFAULT_BROADCAST_CAPACITY)]
    pub broadcast_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Configuration for automatic reconnection behavior.
///
/// Reconnection is unbounded: after every unintentional disconnect the next attempt is made
/// after the same fixed `delay`, until the connection is disposed.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct ReconnectConfig {
    /// Fixed delay between a disconnect and the next connection attempt
    #[builder(default = DEFAULT_RECONNECT_DELAY_DURATION)]
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<ReconnectConfig> for Constant {
    fn from(config: ReconnectConfig) -> Self {
        Constant::new(config.delay)
    }
}
