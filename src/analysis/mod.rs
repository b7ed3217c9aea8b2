//! Analysis modules.
//!
//! This module merges run records and selects intermittent tests.

pub mod aggregator;

pub use aggregator::*;
