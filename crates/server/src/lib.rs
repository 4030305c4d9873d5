//! HTTP surface for the animedex aggregation service.

pub mod api;
pub mod metrics;
pub mod state;
