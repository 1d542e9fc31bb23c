//! Typed per-request context accumulated by the caller pipeline.
//!
//! Each stage consumes the previous stage's record and produces the next,
//! so a later stage cannot run without the fields an earlier one provides:
//! [`Identified`] -> [`Fetched`] -> [`Admitted`].

use saturn_core::{CallerDocument, CallerIdentity, RateLimitDecision, RateLimitHeaders};

/// Output of identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identified {
    pub identity: CallerIdentity,
}

impl Identified {
    #[must_use]
    pub fn new(identity: CallerIdentity) -> Self {
        Self { identity }
    }

    #[must_use]
    pub fn fetched(self, document: CallerDocument) -> Fetched {
        Fetched {
            identity: self.identity,
            document,
        }
    }
}

/// Identity plus the caller document as read before counting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub identity: CallerIdentity,
    pub document: CallerDocument,
}

impl Fetched {
    #[must_use]
    pub fn counted(self, decision: RateLimitDecision) -> Counted {
        Counted {
            identity: self.identity,
            document: self.document,
            decision,
        }
    }
}

/// Context after the request has been counted. Admitted or not, the
/// headers are known from here on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counted {
    pub identity: CallerIdentity,
    pub document: CallerDocument,
    pub decision: RateLimitDecision,
}

impl Counted {
    #[must_use]
    pub fn headers(&self) -> RateLimitHeaders {
        self.decision.headers
    }

    /// Splits on the admission decision.
    ///
    /// # Errors
    ///
    /// Returns the context back when the request is over its limit.
    pub fn admit(self) -> Result<Admitted, Self> {
        if self.decision.admitted {
            Ok(Admitted(self))
        } else {
            Err(self)
        }
    }
}

/// Context of a request allowed through to its handler. Inserted into the
/// request extensions for handlers to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted(Counted);

impl Admitted {
    #[must_use]
    pub fn identity(&self) -> &CallerIdentity {
        &self.0.identity
    }

    #[must_use]
    pub fn headers(&self) -> RateLimitHeaders {
        self.0.headers()
    }

    #[must_use]
    pub fn decision(&self) -> &RateLimitDecision {
        &self.0.decision
    }
}
