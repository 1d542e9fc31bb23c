//! Bearer credential rotation.
//!
//! At startup [`TokenRotator::reconcile`] picks the fresher of the
//! configured and persisted credentials. Afterwards
//! [`CredentialPersister`] listens for refreshes issued by the upstream
//! session and replaces the persisted credential.

pub mod claims;
pub mod persister;
pub mod rotator;

pub use claims::{decode_expiry, decode_expiry_blocking, CredentialError};
pub use persister::CredentialPersister;
pub use rotator::{ActiveCredential, CredentialSource, RotationError, TokenRotator};
