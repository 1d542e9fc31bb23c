//! Caller identification from request metadata.
//!
//! Identity is address based: the trusted proxy header when present,
//! otherwise the transport peer address. No storage is touched and the
//! header's trustworthiness is not validated here; putting a proxy that
//! overwrites it in front of the server is a deployment concern.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request};
use saturn_core::CallerIdentity;

/// Derives a [`CallerIdentity`] from a request.
#[derive(Debug, Clone, Default)]
pub struct Identifier {
    proxy_header: Option<HeaderName>,
}

impl Identifier {
    #[must_use]
    pub fn new(proxy_header: Option<HeaderName>) -> Self {
        Self { proxy_header }
    }

    /// Identity for `req`.
    ///
    /// Falls back to [`CallerIdentity::unknown`] when neither the proxy
    /// header nor the peer address is available. All such requests share
    /// one rate-limit bucket.
    #[must_use]
    pub fn identify<B>(&self, req: &Request<B>) -> CallerIdentity {
        if let Some(forwarded) = self.forwarded_for(req) {
            return CallerIdentity::new(forwarded);
        }

        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(CallerIdentity::unknown, |ConnectInfo(addr)| {
                CallerIdentity::new(addr.ip().to_string())
            })
    }

    fn forwarded_for<'r, B>(&self, req: &'r Request<B>) -> Option<&'r str> {
        let name = self.proxy_header.as_ref()?;
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}
