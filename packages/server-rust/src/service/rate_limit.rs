//! Store-backed fixed-window rate limiter.

use std::sync::Arc;

use saturn_core::{
    CallerDocument, CallerIdentity, ClockSource, RateLimitDecision, RateLimitPolicy,
    USERS_COLLECTION,
};

use crate::storage::{DocumentStore, StoreError};

/// Counts requests per caller in the `users` collection.
///
/// The increment is applied through [`DocumentStore::update`], which
/// returns the post-update document atomically, so concurrent requests
/// from one caller inside an active window never lose a count. Two races
/// remain: concurrent first requests of an expired window each reset the
/// counter, and a window can expire between the fetch and the update, in
/// which case the request is counted into the expired window. Both can
/// admit at most a few extra requests.
pub struct RateLimiter {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn ClockSource>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn ClockSource>,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Fetches the caller's document, creating an empty one on first contact.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the store.
    pub async fn fetch(&self, identity: &CallerIdentity) -> Result<CallerDocument, StoreError> {
        let doc = self
            .store
            .get_or_create(USERS_COLLECTION, identity.as_str())
            .await?;
        Ok(CallerDocument::from_document(&doc))
    }

    /// Counts one request for `caller` and decides admission.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the store. Nothing is counted when
    /// the update fails.
    pub async fn check(&self, caller: &CallerDocument) -> Result<RateLimitDecision, StoreError> {
        let now = self.clock.now();
        let (_, update) = self.policy.plan(caller.rate_limit.as_ref(), now);
        let updated = self
            .store
            .update(USERS_COLLECTION, caller.id.as_str(), &update)
            .await?;

        // The update always writes the sub-record.
        let state = CallerDocument::from_document(&updated)
            .rate_limit
            .unwrap_or_default();
        Ok(self.policy.evaluate(&state, now))
    }
}
