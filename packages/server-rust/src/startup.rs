//! One-time assembly of the application context.
//!
//! Opens the document store, reconciles the upstream credential, wires the
//! refresh persister into the session, and builds the [`AppState`] every
//! request runs against. Any failure here stops the process.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use saturn_core::{ClockSource, SystemClock};
use tracing::info;

use crate::cli::{Cli, ConfigError};
use crate::network::{AppState, ShutdownController};
use crate::render::ResourceRenderer;
use crate::service::{Identifier, RateLimiter};
use crate::storage::{DocumentStore, MemoryDocumentStore, StoreError};
use crate::token::{CredentialPersister, RotationError, TokenRotator};
use crate::upstream::UpstreamSession;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open document store: {0}")]
    Store(#[source] StoreError),
    #[error("a database path was given but persistent storage is not compiled in")]
    PersistenceDisabled,
    #[error(transparent)]
    Rotation(#[from] RotationError),
}

/// Opens the configured store: redb at `path`, or memory when `None`.
///
/// # Errors
///
/// [`StartupError::Store`] if the file cannot be opened,
/// [`StartupError::PersistenceDisabled`] without the `redb` feature.
pub fn open_store(path: Option<&Path>) -> Result<Arc<dyn DocumentStore>, StartupError> {
    let Some(path) = path else {
        info!("using in-memory document store; state is lost on restart");
        return Ok(Arc::new(MemoryDocumentStore::new()));
    };

    #[cfg(feature = "redb")]
    {
        let store = crate::storage::RedbDocumentStore::open(path).map_err(StartupError::Store)?;
        info!(path = %path.display(), "opened redb document store");
        Ok(Arc::new(store))
    }
    #[cfg(not(feature = "redb"))]
    {
        let _ = path;
        Err(StartupError::PersistenceDisabled)
    }
}

/// Builds the application state from the command line.
///
/// # Errors
///
/// See [`StartupError`].
pub async fn initialize(
    cli: &Cli,
    renderer: Arc<dyn ResourceRenderer>,
) -> Result<AppState, StartupError> {
    let store = open_store(cli.db.as_deref())?;
    assemble(cli, store, renderer, Arc::new(SystemClock)).await
}

/// Builds the application state around an already opened store.
///
/// # Errors
///
/// See [`StartupError`].
pub async fn assemble(
    cli: &Cli,
    store: Arc<dyn DocumentStore>,
    renderer: Arc<dyn ResourceRenderer>,
    clock: Arc<dyn ClockSource>,
) -> Result<AppState, StartupError> {
    let service = cli.service_config()?;
    let network = cli.network_config();

    let active = TokenRotator::new(Arc::clone(&store))
        .reconcile(&cli.token)
        .await?;
    info!(
        source = ?active.source,
        expires_at = active.expires_at,
        "upstream credential selected"
    );

    let session = Arc::new(UpstreamSession::new(active.token, cli.refresh_token.clone()));
    session.subscribe(Arc::new(CredentialPersister::new(Arc::clone(&store))));

    Ok(AppState {
        limiter: Arc::new(RateLimiter::new(
            Arc::clone(&store),
            clock,
            service.rate_limit,
        )),
        identifier: Arc::new(Identifier::new(service.proxy_header)),
        store,
        session,
        renderer,
        shutdown: Arc::new(ShutdownController::new()),
        config: Arc::new(network),
        start_time: Instant::now(),
    })
}
