//! Types library for the peer-to-peer energy ledger
//!
//! Shared definitions for the order book ledger: identifiers, energy and price
//! units, order and trade records, per-participant settlement accounts and the
//! error taxonomy every service reports through.
//!
//! # Modules
//! - `ids`: Identifiers (OrderId, TradeId, OwnerId)
//! - `numeric`: Integer units (EnergyAmount, Price, Notional)
//! - `order`: Order records and lifecycle
//! - `trade`: Executed trade records
//! - `account`: Per-participant settlement view
//! - `errors`: Error taxonomy

pub mod ids;
pub mod numeric;
pub mod order;
pub mod trade;
pub mod account;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::trade::*;
    pub use crate::account::*;
    pub use crate::errors::*;
}
