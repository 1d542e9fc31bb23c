//! Persists refreshed credentials so the next startup can adopt them.

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use saturn_core::{CredentialDocument, TOKEN_COLLECTION};
use tracing::info;

use super::claims::decode_expiry_blocking;
use crate::storage::DocumentStore;
use crate::upstream::TokenRefreshHandler;

/// [`TokenRefreshHandler`] that replaces the stored credential set with
/// the refreshed token.
///
/// Holds only the store; the session it listens to is unaffected by
/// anything that happens here.
pub struct CredentialPersister {
    store: Arc<dyn DocumentStore>,
}

impl CredentialPersister {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TokenRefreshHandler for CredentialPersister {
    fn name(&self) -> &'static str {
        "credential-persister"
    }

    async fn on_token_refreshed(&self, token: &str) -> anyhow::Result<()> {
        // An unreadable token would only be discarded at the next startup.
        let expires_at = decode_expiry_blocking(token.to_string())
            .await
            .context("refreshed credential not persisted")?;

        self.store
            .replace_all(
                TOKEN_COLLECTION,
                CredentialDocument::new(token).to_document(),
            )
            .await
            .context("failed to persist refreshed credential")?;

        metrics::counter!("saturn_token_rotations_total").increment(1);
        info!(expires_at, backend = self.store.backend(), "refreshed credential persisted");
        Ok(())
    }
}
