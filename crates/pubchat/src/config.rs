use std::time::Duration;

/// Broker command endpoint used when nothing else is configured.
pub const DEFAULT_BROKER_ENDPOINT: &str = "tcp://broker:5555";
/// Fan-out proxy endpoint used when nothing else is configured.
pub const DEFAULT_PROXY_ENDPOINT: &str = "tcp://proxy:5558";

pub const BROKER_ENV: &str = "PUBCHAT_BROKER";
pub const PROXY_ENV: &str = "PUBCHAT_PROXY";

/// Pause after a failed broadcast receive before trying again.
pub const DEFAULT_RECEIVE_BACKOFF: Duration = Duration::from_millis(100);

/// Connection settings shared by the interactive client and the bot.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Command channel endpoint (REQ side of the broker).
    pub broker_endpoint: String,
    /// Broadcast endpoint (XPUB side of the fan-out proxy).
    pub proxy_endpoint: String,
    /// Upper bound on a single request/response exchange. `None` waits forever.
    pub request_timeout: Option<Duration>,
    pub receive_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_endpoint: default_broker_endpoint(),
            proxy_endpoint: default_proxy_endpoint(),
            request_timeout: None,
            receive_backoff: DEFAULT_RECEIVE_BACKOFF,
        }
    }
}

impl ClientConfig {
    /// Apply command-line overrides on top of the environment defaults.
    pub fn with_overrides(
        broker: Option<String>,
        proxy: Option<String>,
        timeout_ms: Option<u64>,
    ) -> Self {
        let mut config = Self::default();
        if let Some(broker) = broker {
            config.broker_endpoint = broker;
        }
        if let Some(proxy) = proxy {
            config.proxy_endpoint = proxy;
        }
        config.request_timeout = timeout_ms.map(Duration::from_millis);
        config
    }
}

/// Broker endpoint: `$PUBCHAT_BROKER`, else [`DEFAULT_BROKER_ENDPOINT`].
pub fn default_broker_endpoint() -> String {
    std::env::var(BROKER_ENV).unwrap_or_else(|_| DEFAULT_BROKER_ENDPOINT.to_string())
}

/// Proxy endpoint: `$PUBCHAT_PROXY`, else [`DEFAULT_PROXY_ENDPOINT`].
pub fn default_proxy_endpoint() -> String {
    std::env::var(PROXY_ENV).unwrap_or_else(|_| DEFAULT_PROXY_ENDPOINT.to_string())
}
