use axum::http::HeaderName;
use saturn_core::RateLimitPolicy;

/// Proxy header trusted for caller identification unless configured otherwise.
pub const DEFAULT_PROXY_HEADER: &str = "x-real-ip";

/// Configuration for the per-request caller pipeline.
///
/// Controls the rate-limit window and thresholds and which inbound header,
/// if any, overrides the transport address for identification.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Window length and the separately defaulted display/enforced limits.
    pub rate_limit: RateLimitPolicy,
    /// Header whose value replaces the peer address as caller identity.
    /// `None` disables the override.
    pub proxy_header: Option<HeaderName>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitPolicy::default(),
            proxy_header: Some(HeaderName::from_static(DEFAULT_PROXY_HEADER)),
        }
    }
}
