//! Aggregation pipeline: temporal windows and two-stage reduction.

pub mod aggregator;
pub mod temporal;

pub use aggregator::{GeoTemporalAggregator, ReductionRequest};
