//! HTTP handler definitions for the Saturn gateway.
//!
//! This module defines `AppState` (the context object built once at
//! startup and carried through axum extractors) and re-exports all handler
//! functions for building the router.

pub mod health;
pub mod resources;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use resources::{calendar_handler, contact_handler, ApiError};

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController};
use crate::render::ResourceRenderer;
use crate::service::{Identifier, RateLimiter};
use crate::storage::DocumentStore;
use crate::upstream::UpstreamSession;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Document store shared by the rate limiter and credential persister.
    pub store: Arc<dyn DocumentStore>,
    /// Upstream session holding the active credential.
    pub session: Arc<UpstreamSession>,
    /// Produces calendar and contact documents.
    pub renderer: Arc<dyn ResourceRenderer>,
    /// Caller identification for the pipeline.
    pub identifier: Arc<Identifier>,
    /// Per-caller rate limiter for the pipeline.
    pub limiter: Arc<RateLimiter>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Network configuration (bind address, timeouts).
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

#[cfg(test)]
pub(crate) mod testing {
    use saturn_core::{ManualClock, RateLimitPolicy};

    use super::*;
    use crate::render::FixtureRenderer;
    use crate::storage::MemoryDocumentStore;

    /// Start of the test clock, millis since epoch.
    pub const T0: i64 = 1_700_000_000_000;

    /// State backed by an in-memory store, a manual clock, and the
    /// fixture renderer.
    pub fn state_with(
        store: Arc<dyn DocumentStore>,
        clock: Arc<ManualClock>,
        renderer: FixtureRenderer,
    ) -> AppState {
        AppState {
            limiter: Arc::new(RateLimiter::new(
                Arc::clone(&store),
                clock,
                RateLimitPolicy::default(),
            )),
            store,
            session: Arc::new(UpstreamSession::new("bearer", "refresh")),
            renderer: Arc::new(renderer),
            identifier: Arc::new(Identifier::new(Some(
                axum::http::HeaderName::from_static("x-real-ip"),
            ))),
            shutdown: Arc::new(ShutdownController::new()),
            config: Arc::new(NetworkConfig::default()),
            start_time: Instant::now(),
        }
    }

    pub fn test_state() -> AppState {
        state_with(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(ManualClock::new(T0)),
            FixtureRenderer::new(),
        )
    }
}
