//! Analysis modules.
//!
//! Keyword filtering and per-author ranking over fetched messages.

pub mod aggregator;

pub use aggregator::*;
