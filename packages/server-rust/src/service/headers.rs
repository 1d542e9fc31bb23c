//! Rate-limit response headers.

use axum::http::{HeaderName, HeaderValue, Response};
use saturn_core::RateLimitHeaders;

/// Merges the three rate-limit headers into `response`, replacing any
/// values a handler may have set.
pub fn decorate<B>(response: &mut Response<B>, values: &RateLimitHeaders) {
    let headers = response.headers_mut();
    for (name, value) in values.to_pairs() {
        // Names are constants and values are decimal numbers, so neither
        // conversion can fail in practice.
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            continue;
        };
        headers.insert(name, value);
    }
}
