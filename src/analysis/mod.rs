//! Analysis modules.
//!
//! Aggregation of parsed test records into dashboard statistics.

pub mod aggregator;
pub mod distribution;

pub use aggregator::*;
