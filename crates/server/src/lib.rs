//! HTTP observer interface for the recast pipeline.

pub mod api;
pub mod metrics;
pub mod state;
