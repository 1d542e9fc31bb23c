//! Caller identity and the per-caller document view.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Document, Value};

/// Collection holding one [`CallerDocument`] per caller identity.
pub const USERS_COLLECTION: &str = "users";

/// Dotted field paths of the rate-limit sub-record.
pub mod fields {
    pub const RATE_LIMIT: &str = "rateLimit";
    /// End instant of the active window, millis since epoch.
    pub const WINDOW_START: &str = "rateLimit.windowStart";
    pub const COUNT: &str = "rateLimit.count";
    pub const LIMIT_PER_WINDOW: &str = "rateLimit.limitPerWindow";
}

/// Key under which rate-limit state is tracked for a request source.
///
/// Currently derived from the network address of the caller. This is a
/// placeholder for a stronger scheme such as an authenticated subject id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    /// Identity shared by every request whose source cannot be determined.
    pub const UNKNOWN: &'static str = "unknown";

    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rate-limit sub-record of a [`CallerDocument`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    /// End instant of the active window (millis since epoch). The window is
    /// active while this lies in the future.
    pub window_start: Option<i64>,
    /// Requests counted in the active window, including the current one.
    pub count: i64,
    /// Per-caller limit override. `None` means "use the configured defaults".
    pub limit_per_window: Option<i64>,
}

/// Typed view over a caller's persisted document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerDocument {
    pub id: CallerIdentity,
    /// `None` when the caller has never been rate limited.
    pub rate_limit: Option<RateLimitState>,
}

impl CallerDocument {
    /// Builds the typed view from a raw document.
    ///
    /// Fields with unexpected types are treated as absent rather than
    /// rejected. A `rateLimit` that is not a map yields `None`, and the
    /// next request rewrites it as a fresh window.
    #[must_use]
    pub fn from_document(doc: &Document) -> Self {
        let rate_limit = doc.get_path(fields::RATE_LIMIT).and_then(Value::as_map).map(|_| {
            RateLimitState {
                window_start: doc.get_path(fields::WINDOW_START).and_then(Value::as_int),
                count: doc
                    .get_path(fields::COUNT)
                    .and_then(Value::as_int)
                    .unwrap_or(0),
                limit_per_window: doc
                    .get_path(fields::LIMIT_PER_WINDOW)
                    .and_then(Value::as_int),
            }
        });

        Self {
            id: CallerIdentity::new(doc.id.clone()),
            rate_limit,
        }
    }
}

impl From<&Document> for CallerDocument {
    fn from(doc: &Document) -> Self {
        Self::from_document(doc)
    }
}
