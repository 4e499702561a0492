use std::time::Duration;

use bon::Builder;

use crate::reconnect::ReconnectPolicy;

pub(crate) const DEFAULT_RECONNECT_CHECK_INTERVAL: Duration = Duration::from_millis(5000);

/// Configuration for a [`Connection`](crate::Connection).
///
/// ```
/// use std::time::Duration;
///
/// use ws_lifecycle::Config;
///
/// let config = Config::builder()
///     .uri("wss://example.com/socket")
///     .reconnect_check_interval(Duration::from_secs(1))
///     .build();
///
/// assert!(config.auto_reconnect);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct Config {
    /// Endpoint to connect to
    pub uri: String,
    /// Poll for reconnection after the connection closes
    #[builder(default = true)]
    pub auto_reconnect: bool,
    /// How often the reconnection poller checks whether to reconnect
    #[builder(default = DEFAULT_RECONNECT_CHECK_INTERVAL)]
    pub reconnect_check_interval: Duration,
}

impl Config {
    /// Configuration with default reconnection settings.
    pub fn new<S: Into<String>>(uri: S) -> Self {
        Self::builder().uri(uri).build()
    }

    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.auto_reconnect, self.reconnect_check_interval)
    }
}
