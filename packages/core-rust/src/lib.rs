//! Saturn gateway core: documents, partial updates, rate-limit windows, and
//! the persisted credential.
//!
//! Everything here is synchronous and free of I/O. The server crate owns
//! storage, HTTP, and the upstream session.

pub mod caller;
pub mod clock;
pub mod credential;
pub mod ratelimit;
pub mod types;
pub mod update;

pub use caller::{CallerDocument, CallerIdentity, RateLimitState, USERS_COLLECTION};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use credential::{CredentialDocument, TOKEN_COLLECTION};
pub use ratelimit::{
    RateLimitDecision, RateLimitHeaders, RateLimitPolicy, WindowTransition, LIMIT_HEADER,
    REMAINING_HEADER, RESET_HEADER,
};
pub use types::{Document, Value};
pub use update::{Update, UpdateError, UpdateOp};
