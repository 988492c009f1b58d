//! Analysis modules.
//!
//! Report-level aggregation over analyzed items.

pub mod aggregator;

pub use aggregator::*;
