//! Command-line and environment configuration.
//!
//! Every flag falls back to a `SATURN_*` environment variable, so the
//! gateway can be configured entirely from its deployment environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::http::HeaderName;
use clap::Parser;
use saturn_core::RateLimitPolicy;

use crate::network::{NetworkConfig, DEFAULT_PORT};
use crate::service::ServiceConfig;
use crate::telemetry::LogFormat;

/// Invalid combinations clap cannot reject on its own.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid proxy header name {0:?}")]
    InvalidProxyHeader(String),
    #[error("rate-limit window must be at least one second")]
    ZeroWindow,
    #[error("rate limits must not be negative")]
    NegativeLimit,
    #[error("enforced rate limit must admit at least one request per window")]
    ZeroEnforcedLimit,
}

#[derive(Clone, Parser)]
#[command(name = "saturn-gateway", version, about = "Rate-limited calendar and contact gateway")]
pub struct Cli {
    /// Bind address.
    #[arg(long, env = "SATURN_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port. 0 picks an ephemeral port.
    #[arg(long, env = "SATURN_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// redb database file. Without it documents live in memory only.
    #[arg(long, env = "SATURN_DB")]
    pub db: Option<PathBuf>,

    /// Upstream bearer credential.
    #[arg(long, env = "SATURN_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Upstream refresh credential.
    #[arg(long, env = "SATURN_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: String,

    /// Rate-limit window length in seconds.
    #[arg(long, env = "SATURN_RATELIMIT_WINDOW_SECS", default_value_t = 120)]
    pub ratelimit_window_secs: u64,

    /// Limit reported in headers for callers without an override.
    #[arg(long, env = "SATURN_RATELIMIT_DISPLAY_LIMIT", default_value_t = 1)]
    pub ratelimit_display_limit: i64,

    /// Limit enforced for callers without an override.
    #[arg(long, env = "SATURN_RATELIMIT_ENFORCED_LIMIT", default_value_t = 90)]
    pub ratelimit_enforced_limit: i64,

    /// Trusted header carrying the client address. Empty disables it.
    #[arg(long, env = "SATURN_PROXY_HEADER", default_value = "X-Real-IP")]
    pub proxy_header: String,

    /// Per-request timeout in seconds.
    #[arg(long, env = "SATURN_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "SATURN_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Address for the Prometheus scrape endpoint. Disabled when unset.
    #[arg(long, env = "SATURN_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..NetworkConfig::default()
        }
    }

    /// # Errors
    ///
    /// See [`ConfigError`].
    pub fn service_config(&self) -> Result<ServiceConfig, ConfigError> {
        if self.ratelimit_window_secs == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.ratelimit_display_limit < 0 || self.ratelimit_enforced_limit < 0 {
            return Err(ConfigError::NegativeLimit);
        }
        if self.ratelimit_enforced_limit == 0 {
            return Err(ConfigError::ZeroEnforcedLimit);
        }

        let header = self.proxy_header.trim();
        let proxy_header = if header.is_empty() {
            None
        } else {
            Some(
                HeaderName::from_bytes(header.as_bytes())
                    .map_err(|_| ConfigError::InvalidProxyHeader(header.to_string()))?,
            )
        };

        Ok(ServiceConfig {
            rate_limit: RateLimitPolicy {
                display_limit_default: self.ratelimit_display_limit,
                enforced_limit_default: self.ratelimit_enforced_limit,
                ..RateLimitPolicy::with_window(Duration::from_secs(self.ratelimit_window_secs))
            },
            proxy_header,
        })
    }
}
