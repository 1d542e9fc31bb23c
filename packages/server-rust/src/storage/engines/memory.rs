//! In-memory [`DocumentStore`] implementation backed by [`DashMap`].
//!
//! Each collection lives in its own `DashMap` entry; mutating operations
//! hold that entry's shard lock for their whole read-modify-write, which
//! makes them atomic without a separate lock. Contents are lost on
//! restart.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use saturn_core::{Document, Update};

use crate::storage::engine::{apply_checked, DocumentStore, StoreError};

/// Process-local document store for development and tests.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: DashMap<String, BTreeMap<String, Document>>,
}

impl MemoryDocumentStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_or_create(&self, collection: &str, key: &str) -> Result<Document, StoreError> {
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        let doc = docs
            .entry(key.to_string())
            .or_insert_with(|| Document::empty(key));
        Ok(doc.clone())
    }

    async fn update(
        &self,
        collection: &str,
        key: &str,
        update: &Update,
    ) -> Result<Document, StoreError> {
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        let doc = docs
            .entry(key.to_string())
            .or_insert_with(|| Document::empty(key));
        let updated = apply_checked(collection, doc, update)?;
        *doc = updated.clone();
        Ok(updated)
    }

    async fn find_one(&self, collection: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.values().next().cloned()))
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .collections
            .get_mut(collection)
            .is_some_and(|mut docs| docs.remove(key).is_some()))
    }

    async fn replace_all(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        docs.clear();
        docs.insert(document.id.clone(), document);
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        Ok(self.collections.get(collection).map_or(0, |docs| docs.len()))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
