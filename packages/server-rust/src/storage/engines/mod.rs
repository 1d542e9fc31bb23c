//! [`DocumentStore`](super::DocumentStore) engines.

mod memory;
#[cfg(feature = "redb")]
mod redb_store;

pub use memory::MemoryDocumentStore;
#[cfg(feature = "redb")]
pub use redb_store::RedbDocumentStore;
