//! Durable [`DocumentStore`] backed by a single `redb` database file.
//!
//! Each collection is a table keyed by document id, with documents
//! encoded as `MsgPack` via `rmp-serde`. Every operation runs in its own
//! redb transaction, so get-or-create, update, and replace-all commit
//! atomically. redb is synchronous; all calls are moved onto the blocking
//! pool so they never stall the async workers.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, TableError};
use saturn_core::{Document, Update};

use crate::storage::engine::{apply_checked, DocumentStore, StoreError};

type Collection<'a> = TableDefinition<'a, &'static str, &'static [u8]>;

fn table(collection: &str) -> Collection<'_> {
    TableDefinition::new(collection)
}

fn unavailable(err: impl Into<redb::Error>) -> StoreError {
    StoreError::Unavailable(err.into().to_string())
}

fn encode(doc: &Document) -> Result<Vec<u8>, StoreError> {
    rmp_serde::to_vec_named(doc).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Document, StoreError> {
    rmp_serde::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// File-backed document store.
#[derive(Clone)]
pub struct RedbDocumentStore {
    db: Arc<Database>,
}

impl RedbDocumentStore {
    /// Opens the database at `path`, creating the file if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file cannot be opened or
    /// is locked by another process.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(unavailable)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Runs `f` against the database on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Unavailable(format!("storage task failed: {e}")))?
    }
}

#[async_trait]
impl DocumentStore for RedbDocumentStore {
    async fn get_or_create(&self, collection: &str, key: &str) -> Result<Document, StoreError> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(unavailable)?;
            let doc = {
                let mut t = txn.open_table(table(&collection)).map_err(unavailable)?;
                let existing = t
                    .get(key.as_str())
                    .map_err(unavailable)?
                    .map(|guard| decode(guard.value()))
                    .transpose()?;
                match existing {
                    Some(doc) => doc,
                    None => {
                        let doc = Document::empty(key.as_str());
                        t.insert(key.as_str(), encode(&doc)?.as_slice())
                            .map_err(unavailable)?;
                        doc
                    }
                }
            };
            txn.commit().map_err(unavailable)?;
            Ok(doc)
        })
        .await
    }

    async fn update(
        &self,
        collection: &str,
        key: &str,
        update: &Update,
    ) -> Result<Document, StoreError> {
        let collection = collection.to_string();
        let key = key.to_string();
        let update = update.clone();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(unavailable)?;
            let updated = {
                let mut t = txn.open_table(table(&collection)).map_err(unavailable)?;
                let current = t
                    .get(key.as_str())
                    .map_err(unavailable)?
                    .map(|guard| decode(guard.value()))
                    .transpose()?
                    .unwrap_or_else(|| Document::empty(key.as_str()));
                let updated = apply_checked(&collection, &current, &update)?;
                t.insert(key.as_str(), encode(&updated)?.as_slice())
                    .map_err(unavailable)?;
                updated
            };
            txn.commit().map_err(unavailable)?;
            Ok(updated)
        })
        .await
    }

    async fn find_one(&self, collection: &str) -> Result<Option<Document>, StoreError> {
        let collection = collection.to_string();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(unavailable)?;
            let t = match txn.open_table(table(&collection)) {
                Ok(t) => t,
                Err(TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(e) => return Err(unavailable(e)),
            };
            let mut entries = t.iter().map_err(unavailable)?;
            let found = match entries.next() {
                Some(entry) => {
                    let (_, value) = entry.map_err(unavailable)?;
                    decode(value.value()).map(Some)
                }
                None => Ok(None),
            };
            found
        })
        .await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(unavailable)?;
            let existed = {
                let mut t = txn.open_table(table(&collection)).map_err(unavailable)?;
                let removed = t.remove(key.as_str()).map_err(unavailable)?;
                removed.is_some()
            };
            txn.commit().map_err(unavailable)?;
            Ok(existed)
        })
        .await
    }

    async fn replace_all(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        let collection = collection.to_string();
        self.blocking(move |db| {
            let bytes = encode(&document)?;
            let txn = db.begin_write().map_err(unavailable)?;
            txn.delete_table(table(&collection)).map_err(unavailable)?;
            {
                let mut t = txn.open_table(table(&collection)).map_err(unavailable)?;
                t.insert(document.id.as_str(), bytes.as_slice())
                    .map_err(unavailable)?;
            }
            txn.commit().map_err(unavailable)?;
            Ok(())
        })
        .await
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let collection = collection.to_string();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(unavailable)?;
            let t = match txn.open_table(table(&collection)) {
                Ok(t) => t,
                Err(TableError::TableDoesNotExist(_)) => return Ok(0),
                Err(e) => return Err(unavailable(e)),
            };
            let len = t.len().map_err(unavailable)?;
            Ok(usize::try_from(len).unwrap_or(usize::MAX))
        })
        .await
    }

    fn backend(&self) -> &'static str {
        "redb"
    }
}

#[cfg(test)]
mod tests {
    use saturn_core::Value;
    use tempfile::TempDir;

    use super::*;

    fn open_temp() -> (TempDir, RedbDocumentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbDocumentStore::open(dir.path().join("saturn.redb")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn get_or_create_then_update_persists() {
        let (_dir, store) = open_temp();
        let doc = store.get_or_create("users", "10.0.0.1").await.unwrap();
        assert!(doc.is_empty());

        let updated = store
            .update(
                "users",
                "10.0.0.1",
                &Update::new().set("rateLimit.count", 0_i64).inc("rateLimit.count", 1),
            )
            .await
            .unwrap();
        assert_eq!(updated.get_path("rateLimit.count"), Some(&Value::Int(1)));

        let reread = store.get_or_create("users", "10.0.0.1").await.unwrap();
        assert_eq!(reread, updated);
        assert_eq!(store.count("users").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saturn.redb");
        {
            let store = RedbDocumentStore::open(&path).unwrap();
            store
                .replace_all("token", Document::empty("current"))
                .await
                .unwrap();
        }
        let store = RedbDocumentStore::open(&path).unwrap();
        let found = store.find_one("token").await.unwrap();
        assert_eq!(found.map(|d| d.id), Some("current".to_string()));
    }

    #[tokio::test]
    async fn find_one_decodes_stored_fields() {
        let (_dir, store) = open_temp();
        store.get_or_create("token", "current").await.unwrap();
        store
            .update("token", "current", &Update::new().set("token", "abc"))
            .await
            .unwrap();

        let found = store.find_one("token").await.unwrap().unwrap();
        assert_eq!(found.id, "current");
        assert_eq!(found.get_path("token"), Some(&Value::from("abc")));
    }

    #[tokio::test]
    async fn missing_collection_reads_as_empty() {
        let (_dir, store) = open_temp();
        assert!(store.find_one("token").await.unwrap().is_none());
        assert_eq!(store.count("token").await.unwrap(), 0);
        assert!(!store.delete("token", "nope").await.unwrap());
    }

    #[tokio::test]
    async fn replace_all_drops_previous_documents() {
        let (_dir, store) = open_temp();
        store.get_or_create("token", "a").await.unwrap();
        store.get_or_create("token", "b").await.unwrap();
        store
            .replace_all("token", Document::empty("c"))
            .await
            .unwrap();
        assert_eq!(store.count("token").await.unwrap(), 1);
        assert_eq!(
            store.find_one("token").await.unwrap().map(|d| d.id),
            Some("c".to_string())
        );
    }

    #[tokio::test]
    async fn invalid_update_is_not_committed() {
        let (_dir, store) = open_temp();
        store
            .update("users", "k", &Update::new().set("n", "text"))
            .await
            .unwrap();
        let err = store
            .update("users", "k", &Update::new().inc("n", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidUpdate { .. }));
        let doc = store.get_or_create("users", "k").await.unwrap();
        assert_eq!(doc.get_path("n"), Some(&Value::from("text")));
    }
}
