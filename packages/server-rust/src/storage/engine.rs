//! The [`DocumentStore`] trait and its error type.

use async_trait::async_trait;
use saturn_core::{Document, Update, UpdateError};

/// Errors surfaced by a [`DocumentStore`].
///
/// No engine retries internally; callers decide how to surface failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or failed mid-operation.
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    /// A stored document could not be encoded or decoded.
    #[error("document serialization failed: {0}")]
    Serialization(String),
    /// The update does not fit the stored document's shape.
    #[error("invalid update for {collection}/{key}: {source}")]
    InvalidUpdate {
        collection: String,
        key: String,
        #[source]
        source: UpdateError,
    },
}

/// Keyed document collections with get-or-create and partial updates.
///
/// Used as `Arc<dyn DocumentStore>`. Every method is atomic with respect
/// to the documents it touches; sequences of calls are not.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the document stored under `key`, inserting an empty one if
    /// absent. Never reports "not found".
    async fn get_or_create(&self, collection: &str, key: &str) -> Result<Document, StoreError>;

    /// Applies `update` to the document under `key` (creating it if
    /// absent) and returns the document as stored afterwards.
    ///
    /// The read-modify-write is atomic, so the returned document reflects
    /// exactly this update on top of the previous state.
    async fn update(
        &self,
        collection: &str,
        key: &str,
        update: &Update,
    ) -> Result<Document, StoreError>;

    /// Returns any one document of the collection, if it holds any.
    async fn find_one(&self, collection: &str) -> Result<Option<Document>, StoreError>;

    /// Deletes the document under `key`. Returns whether it existed.
    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError>;

    /// Atomically replaces the whole collection with `document`.
    ///
    /// Readers observe either the previous contents or exactly `document`,
    /// never an empty collection.
    async fn replace_all(&self, collection: &str, document: Document) -> Result<(), StoreError>;

    /// Number of documents in the collection.
    async fn count(&self, collection: &str) -> Result<usize, StoreError>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Applies `update` to a scratch copy so a failing update leaves `doc`
/// untouched.
pub(crate) fn apply_checked(
    collection: &str,
    doc: &Document,
    update: &Update,
) -> Result<Document, StoreError> {
    let mut scratch = doc.clone();
    scratch
        .apply(update)
        .map_err(|source| StoreError::InvalidUpdate {
            collection: collection.to_string(),
            key: doc.id.clone(),
            source,
        })?;
    Ok(scratch)
}
