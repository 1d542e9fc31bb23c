//! Per-request caller pipeline.
//!
//! Every resource request passes through these stages in order:
//!
//! 1. **Identification** (`identify`): request metadata -> `CallerIdentity`
//! 2. **Document fetch** (`rate_limit`): get-or-create the caller document
//! 3. **Rate limiting** (`rate_limit`): count the request, decide admission
//! 4. **Header decoration** (`headers`): attach `X-RateLimit-*` on the way out
//!
//! The stages are composed by [`CallerPipelineLayer`] and exchange the
//! typed records in `context`.

pub mod config;
pub mod context;
pub mod headers;
pub mod identify;
pub mod middleware;
pub mod rate_limit;

pub use config::ServiceConfig;
pub use context::{Admitted, Counted, Fetched, Identified};
pub use headers::decorate;
pub use identify::Identifier;
pub use middleware::{CallerPipelineLayer, PipelineError, Stage};
pub use rate_limit::RateLimiter;
