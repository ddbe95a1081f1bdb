//! Endpoint presets and client options.
//!
//! Every deployment exposes four URLs: the REST base, the websocket connect
//! endpoint, the SSE connect endpoint, and the SSE egress endpoint used for
//! control messages. [`SdkConfig::for_environment`] fills all four from a
//! preset; individual URLs can then be overridden.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::ReconnectPolicy;

/// Production REST API base URL.
pub const PRODUCTION_BASE_URL: &str = "https://api.assisfy.com/api/v1";
/// Production websocket endpoint.
pub const PRODUCTION_SOCKET_URL: &str = "wss://api.assisfy.com/v1/connect";
/// Production SSE endpoint.
pub const PRODUCTION_SSE_URL: &str = "https://api.assisfy.com/events/v1/connect";
/// Production SSE egress endpoint.
pub const PRODUCTION_SSE_EGRESS_URL: &str = "https://api.assisfy.com/events/v1/egress";

pub const STAGING_BASE_URL: &str = "https://api-staging.assisfy.com/api/v1";
pub const STAGING_SOCKET_URL: &str = "wss://api-staging.assisfy.com/v1/connect";
pub const STAGING_SSE_URL: &str = "https://api-staging.assisfy.com/events/v1/connect";
pub const STAGING_SSE_EGRESS_URL: &str = "https://api-staging.assisfy.com/events/v1/egress";

pub const DEVELOPMENT_BASE_URL: &str = "https://api-dev.assisfy.com/api/v1";
pub const DEVELOPMENT_SOCKET_URL: &str = "wss://api-dev.assisfy.com/v1/connect";
pub const DEVELOPMENT_SSE_URL: &str = "https://api-dev.assisfy.com/events/v1/connect";
pub const DEVELOPMENT_SSE_EGRESS_URL: &str = "https://api-dev.assisfy.com/events/v1/egress";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deployment the SDK talks to.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Environment {
    #[default]
    Production,
    Staging,
    Development,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "staging" | "stage" => Ok(Self::Staging),
            "development" | "dev" => Ok(Self::Development),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Resolved endpoints and HTTP options used by sessions and transports.
#[derive(Clone, Debug, PartialEq)]
pub struct SdkConfig {
    /// REST API base, e.g. `https://api.assisfy.com/api/v1`.
    pub base_url: String,
    /// Websocket connect endpoint for the duplex transport.
    pub socket_url: String,
    /// SSE connect endpoint for the stream transport.
    pub sse_url: String,
    /// HTTP endpoint accepting control messages for SSE sessions.
    pub sse_egress_url: String,
    /// TCP connect timeout applied to every HTTP request.
    pub connect_timeout: Duration,
    /// Backoff used when an SSE subscription drops and is reopened.
    pub reconnect: ReconnectPolicy,
}

impl SdkConfig {
    /// Returns the preset endpoints for `environment`.
    pub fn for_environment(environment: Environment) -> Self {
        let (base_url, socket_url, sse_url, sse_egress_url) = match environment {
            Environment::Production => (
                PRODUCTION_BASE_URL,
                PRODUCTION_SOCKET_URL,
                PRODUCTION_SSE_URL,
                PRODUCTION_SSE_EGRESS_URL,
            ),
            Environment::Staging => (
                STAGING_BASE_URL,
                STAGING_SOCKET_URL,
                STAGING_SSE_URL,
                STAGING_SSE_EGRESS_URL,
            ),
            Environment::Development => (
                DEVELOPMENT_BASE_URL,
                DEVELOPMENT_SOCKET_URL,
                DEVELOPMENT_SSE_URL,
                DEVELOPMENT_SSE_EGRESS_URL,
            ),
        };

        Self {
            base_url: base_url.to_string(),
            socket_url: socket_url.to_string(),
            sse_url: sse_url.to_string(),
            sse_egress_url: sse_egress_url.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Overrides the REST base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = normalize_url(url.into());
        self
    }

    /// Overrides the websocket endpoint.
    pub fn with_socket_url(mut self, url: impl Into<String>) -> Self {
        self.socket_url = normalize_url(url.into());
        self
    }

    /// Overrides the SSE endpoint.
    pub fn with_sse_url(mut self, url: impl Into<String>) -> Self {
        self.sse_url = normalize_url(url.into());
        self
    }

    /// Overrides the SSE egress endpoint.
    pub fn with_sse_egress_url(mut self, url: impl Into<String>) -> Self {
        self.sse_egress_url = normalize_url(url.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Production)
    }
}

fn normalize_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::{
        Environment, SdkConfig, DEVELOPMENT_SOCKET_URL, PRODUCTION_BASE_URL,
        PRODUCTION_SSE_EGRESS_URL, STAGING_SSE_URL,
    };

    #[test]
    fn default_config_uses_production_endpoints() {
        let config = SdkConfig::default();
        assert_eq!(config.base_url, PRODUCTION_BASE_URL);
        assert_eq!(config.sse_egress_url, PRODUCTION_SSE_EGRESS_URL);
    }

    #[test]
    fn environment_presets_select_matching_hosts() {
        assert_eq!(
            SdkConfig::for_environment(Environment::Development).socket_url,
            DEVELOPMENT_SOCKET_URL
        );
        assert_eq!(
            SdkConfig::for_environment(Environment::Staging).sse_url,
            STAGING_SSE_URL
        );
    }

    #[test]
    fn overrides_trim_whitespace_and_trailing_slash() {
        let config = SdkConfig::for_environment(Environment::Development)
            .with_base_url("http://127.0.0.1:31190/api/v1/  \n")
            .with_socket_url(" ws://127.0.0.1:31190/v1/connect");
        assert_eq!(config.base_url, "http://127.0.0.1:31190/api/v1");
        assert_eq!(config.socket_url, "ws://127.0.0.1:31190/v1/connect");
        assert_eq!(config.sse_url, super::DEVELOPMENT_SSE_URL);
    }

    #[test]
    fn environment_parses_short_names() {
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert_eq!(" Production ".parse::<Environment>(), Ok(Environment::Production));
        assert!("qa".parse::<Environment>().is_err());
    }
}
