//! Tower middleware for the resource routes.
//!
//! - [`pipeline`]: identification, rate limiting and header decoration

pub mod pipeline;

pub use pipeline::{CallerPipelineLayer, CallerPipelineService, PipelineError, Stage};
