//! Persisted bearer credential.

use crate::types::{Document, Value};

/// Collection holding zero or one [`CredentialDocument`].
pub const TOKEN_COLLECTION: &str = "token";

/// Key used for the credential document when it is written.
///
/// Readers must not rely on it: any document in the collection is the
/// credential.
pub const CREDENTIAL_KEY: &str = "current";

const TOKEN_FIELD: &str = "token";

/// The bearer credential persisted across restarts.
///
/// The token is opaque to this crate. Callers that need its expiry decode
/// the `exp` claim themselves.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialDocument {
    /// Key of the backing document, needed to delete it.
    pub key: String,
    pub token: String,
}

impl CredentialDocument {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            key: CREDENTIAL_KEY.to_string(),
            token: token.into(),
        }
    }

    /// Reads the credential from a raw document.
    ///
    /// Returns `None` if the document has no string `token` field.
    #[must_use]
    pub fn from_document(doc: &Document) -> Option<Self> {
        let token = doc.fields.get(TOKEN_FIELD)?.as_str()?;
        Some(Self {
            key: doc.id.clone(),
            token: token.to_string(),
        })
    }

    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut doc = Document::empty(self.key.clone());
        doc.fields
            .insert(TOKEN_FIELD.to_string(), Value::String(self.token.clone()));
        doc
    }
}

// Tokens are secrets; keep them out of logs.
impl std::fmt::Debug for CredentialDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialDocument")
            .field("key", &self.key)
            .field("token", &"<redacted>")
            .finish()
    }
}
