//! Fixed-window request counting per caller.
//!
//! Each caller document carries a `rateLimit` sub-record whose
//! `windowStart` field holds the instant the *current window ends*. A
//! request arriving at `now` either opens a new window (no window yet, or
//! `windowStart <= now`) or is counted into the active one. The counter
//! includes the current request before the admission check, so the first
//! request over the limit is the one rejected.
//!
//! Two thresholds are defaulted independently when a caller has no
//! `limitPerWindow` override: the *displayed* limit reported in response
//! headers and the *enforced* limit used for admission. They are kept as
//! separate knobs on [`RateLimitPolicy`].

use std::collections::BTreeMap;
use std::time::Duration;

use crate::caller::{fields, RateLimitState};
use crate::types::Value;
use crate::update::Update;

/// Response header carrying the per-window limit.
pub const LIMIT_HEADER: &str = "X-RateLimit-Limit";
/// Response header carrying `limit - count` (may be negative).
pub const REMAINING_HEADER: &str = "X-RateLimit-Remaining";
/// Response header carrying the seconds until the window ends.
pub const RESET_HEADER: &str = "X-RateLimit-Reset";

/// Window length and default thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Length of one window in milliseconds.
    pub window_ms: i64,
    /// Limit reported in headers when the caller has no override.
    pub display_limit_default: i64,
    /// Limit enforced at admission when the caller has no override. At
    /// least 1, so the first request of a fresh window is always admitted.
    pub enforced_limit_default: i64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            window_ms: 120_000,
            display_limit_default: 1,
            enforced_limit_default: 90,
        }
    }
}

/// Which branch of the window state machine a request takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowTransition {
    /// No window, or the previous one has ended. A new window ending at
    /// `window_end` is opened and the counter restarts.
    Opened { window_end: i64 },
    /// The window ending at `window_end` is still active.
    Continued { window_end: i64 },
}

impl WindowTransition {
    #[must_use]
    pub fn window_end(self) -> i64 {
        match self {
            Self::Opened { window_end } | Self::Continued { window_end } => window_end,
        }
    }
}

/// Computed values attached to every pipeline response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: i64,
    pub remaining: i64,
    /// Milliseconds until the window ends.
    pub reset_ms: i64,
}

impl RateLimitHeaders {
    /// Header name/value pairs in their wire representation.
    #[must_use]
    pub fn to_pairs(&self) -> [(&'static str, String); 3] {
        [
            (LIMIT_HEADER, self.limit.to_string()),
            (REMAINING_HEADER, self.remaining.to_string()),
            (RESET_HEADER, format_seconds(self.reset_ms)),
        ]
    }
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub headers: RateLimitHeaders,
    /// Post-increment request count for the active window.
    pub count: i64,
    /// Threshold the count was checked against.
    pub enforced_limit: i64,
    pub admitted: bool,
}

impl RateLimitPolicy {
    /// Builds a policy from a window duration, keeping the default thresholds.
    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        Self {
            window_ms: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
            ..Self::default()
        }
    }

    /// Decides which transition a request arriving at `now` takes.
    #[must_use]
    pub fn transition(&self, state: Option<&RateLimitState>, now: i64) -> WindowTransition {
        match state.and_then(|s| s.window_start) {
            Some(window_end) if window_end > now => WindowTransition::Continued { window_end },
            _ => WindowTransition::Opened {
                window_end: now.saturating_add(self.window_ms),
            },
        }
    }

    /// The partial update that records one request under `transition`.
    ///
    /// Opening a window sets its end, resets the counter and counts the
    /// request. Continuing only increments the counter. Without a readable
    /// sub-record (`state` is `None`) the whole `rateLimit` value is
    /// rewritten, replacing a missing or mistyped one.
    #[must_use]
    pub fn update_for(
        &self,
        state: Option<&RateLimitState>,
        transition: WindowTransition,
    ) -> Update {
        match (transition, state) {
            (WindowTransition::Opened { window_end }, Some(_)) => Update::new()
                .set(fields::WINDOW_START, window_end)
                .set(fields::COUNT, 0_i64)
                .inc(fields::COUNT, 1),
            (WindowTransition::Opened { window_end }, None) => Update::new()
                .set(fields::RATE_LIMIT, fresh_record(window_end))
                .inc(fields::COUNT, 1),
            (WindowTransition::Continued { .. }, _) => Update::new().inc(fields::COUNT, 1),
        }
    }

    /// Transition and update for a request arriving at `now`.
    #[must_use]
    pub fn plan(&self, state: Option<&RateLimitState>, now: i64) -> (WindowTransition, Update) {
        let transition = self.transition(state, now);
        (transition, self.update_for(state, transition))
    }

    /// Computes headers and admission from the post-update state.
    #[must_use]
    pub fn evaluate(&self, state: &RateLimitState, now: i64) -> RateLimitDecision {
        let limit = state.limit_per_window.unwrap_or(self.display_limit_default);
        let enforced_limit = state
            .limit_per_window
            .unwrap_or(self.enforced_limit_default);
        let window_end = state.window_start.unwrap_or(now);

        RateLimitDecision {
            headers: RateLimitHeaders {
                limit,
                remaining: limit.saturating_sub(state.count),
                reset_ms: window_end.saturating_sub(now),
            },
            count: state.count,
            enforced_limit,
            admitted: state.count <= enforced_limit,
        }
    }
}

/// A `rateLimit` sub-record for a window ending at `window_end`, count 0.
fn fresh_record(window_end: i64) -> Value {
    Value::Map(BTreeMap::from([
        ("windowStart".to_string(), Value::Int(window_end)),
        ("count".to_string(), Value::Int(0)),
    ]))
}

/// Renders milliseconds as decimal seconds with at most three fractional
/// digits and no trailing zeros (`120`, `119.5`, `0.001`).
#[must_use]
pub fn format_seconds(millis: i64) -> String {
    let sign = if millis < 0 { "-" } else { "" };
    let abs = millis.unsigned_abs();
    let whole = abs / 1000;
    let frac = abs % 1000;
    if frac == 0 {
        format!("{sign}{whole}")
    } else {
        let digits = format!("{frac:03}");
        format!("{sign}{whole}.{}", digits.trim_end_matches('0'))
    }
}
