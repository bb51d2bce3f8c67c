//! Analysis modules.
//!
//! Aggregation of user interaction events into per-user summaries.

pub mod aggregator;

pub use aggregator::*;
