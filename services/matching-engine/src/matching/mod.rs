//! Matching logic module
//!
//! Price-time priority matching at the maker's price.

pub mod crossing;
pub mod executor;

pub use crossing::{can_match, incoming_can_match};
pub use executor::MatchExecutor;
