//! Startup reconciliation of the configured and persisted credentials.

use std::fmt;
use std::sync::Arc;

use saturn_core::{CredentialDocument, TOKEN_COLLECTION};
use tracing::{info, warn};

use super::claims::{decode_expiry_blocking, CredentialError};
use crate::storage::{DocumentStore, StoreError};

/// Fatal startup failures. The process cannot authenticate upstream
/// without a usable credential, so none of these are recovered from.
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("configured credential is unusable: {0}")]
    MalformedCredential(#[source] CredentialError),
    #[error("credential store unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),
}

/// Where the session's credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Configured,
    Persisted,
}

/// Credential chosen for the session.
#[derive(Clone, PartialEq)]
pub struct ActiveCredential {
    pub token: String,
    /// `exp` claim, seconds since epoch.
    pub expires_at: f64,
    pub source: CredentialSource,
}

impl fmt::Debug for ActiveCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("source", &self.source)
            .finish()
    }
}

/// Picks the fresher of the configured and persisted credentials.
pub struct TokenRotator {
    store: Arc<dyn DocumentStore>,
}

impl TokenRotator {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Decides the session credential.
    ///
    /// The persisted credential wins only if its `exp` is strictly later
    /// than the configured one's. Otherwise it is deleted. A persisted
    /// credential that cannot be decoded is deleted as well, with a
    /// warning, since it can never win.
    ///
    /// # Errors
    ///
    /// [`RotationError::MalformedCredential`] if `configured` cannot be
    /// decoded, [`RotationError::StorageUnavailable`] if the store fails.
    pub async fn reconcile(&self, configured: &str) -> Result<ActiveCredential, RotationError> {
        let configured_exp = decode_expiry_blocking(configured.to_string())
            .await
            .map_err(RotationError::MalformedCredential)?;
        let configured = ActiveCredential {
            token: configured.to_string(),
            expires_at: configured_exp,
            source: CredentialSource::Configured,
        };

        let Some(doc) = self.store.find_one(TOKEN_COLLECTION).await? else {
            info!(expires_at = configured_exp, "no persisted credential, using configured");
            return Ok(configured);
        };

        let Some(persisted) = CredentialDocument::from_document(&doc) else {
            warn!(key = %doc.id, "persisted credential has no token field, discarding");
            self.store.delete(TOKEN_COLLECTION, &doc.id).await?;
            return Ok(configured);
        };

        match decode_expiry_blocking(persisted.token.clone()).await {
            Ok(persisted_exp) if persisted_exp > configured_exp => {
                info!(
                    expires_at = persisted_exp,
                    configured_expires_at = configured_exp,
                    "adopting fresher persisted credential"
                );
                Ok(ActiveCredential {
                    token: persisted.token,
                    expires_at: persisted_exp,
                    source: CredentialSource::Persisted,
                })
            }
            Ok(persisted_exp) => {
                info!(
                    expires_at = configured_exp,
                    persisted_expires_at = persisted_exp,
                    "configured credential is at least as fresh, discarding persisted"
                );
                self.store.delete(TOKEN_COLLECTION, &persisted.key).await?;
                Ok(configured)
            }
            Err(err) => {
                warn!(error = %err, "persisted credential is unreadable, discarding");
                self.store.delete(TOKEN_COLLECTION, &persisted.key).await?;
                Ok(configured)
            }
        }
    }
}
