//! Process-wide session with the upstream live-data API.
//!
//! The session owns the bearer credential used for every upstream call and
//! the refresh credential used to renew it. When the upstream issues a new
//! bearer token the session swaps it in memory first and then notifies
//! every registered [`TokenRefreshHandler`]. Handler failures are logged
//! and never roll back the in-memory swap.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

/// Observer notified whenever the upstream issues a refreshed credential.
#[async_trait]
pub trait TokenRefreshHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Called with the new bearer token after the session has adopted it.
    async fn on_token_refreshed(&self, token: &str) -> anyhow::Result<()>;
}

/// Credentials and refresh subscribers for the upstream API.
pub struct UpstreamSession {
    bearer: ArcSwap<String>,
    refresh_token: String,
    handlers: RwLock<Vec<Arc<dyn TokenRefreshHandler>>>,
    closed: AtomicBool,
}

impl UpstreamSession {
    #[must_use]
    pub fn new(bearer: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            bearer: ArcSwap::from_pointee(bearer.into()),
            refresh_token: refresh_token.into(),
            handlers: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// The bearer token currently presented to the upstream.
    #[must_use]
    pub fn bearer_token(&self) -> Arc<String> {
        self.bearer.load_full()
    }

    #[must_use]
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// Registers `handler` for every future refresh.
    pub fn subscribe(&self, handler: Arc<dyn TokenRefreshHandler>) {
        debug!(handler = handler.name(), "token refresh handler registered");
        self.handlers.write().push(handler);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Adopts `token` as the bearer credential and notifies subscribers.
    ///
    /// Returns the number of handlers that failed. Failures are logged and
    /// leave the in-memory credential in place.
    pub async fn apply_refresh(&self, token: String) -> usize {
        self.bearer.store(Arc::new(token.clone()));
        info!("upstream issued a refreshed credential");

        // Snapshot so no lock is held across handler awaits.
        let handlers: Vec<_> = self.handlers.read().clone();
        let mut failed = 0;
        for handler in handlers {
            if let Err(err) = handler.on_token_refreshed(&token).await {
                failed += 1;
                warn!(
                    handler = handler.name(),
                    error = %err,
                    "token refresh handler failed; continuing with in-memory credential"
                );
            }
        }
        failed
    }

    /// Marks the session closed. Called once during shutdown.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("upstream session closed");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for UpstreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamSession")
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
