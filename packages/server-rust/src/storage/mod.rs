//! Document storage for the Saturn gateway.
//!
//! Defines [`DocumentStore`], the get-or-create / partial-update contract
//! used by the rate limiter and the token rotator, plus its engines:
//!
//! - [`MemoryDocumentStore`]: `DashMap`-backed, process-local
//! - [`RedbDocumentStore`]: durable, file-backed (feature `redb`)
//!
//! Both engines apply each operation atomically per document, so
//! get-or-create never yields two divergent documents for one key and
//! `replace_all` never exposes an empty collection mid-way.

pub mod engine;
pub mod engines;

pub use engine::*;
pub use engines::*;
