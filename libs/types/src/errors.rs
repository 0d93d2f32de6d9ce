//! Error types for the energy ledger
//!
//! Comprehensive error taxonomy using thiserror. Every error reduces to one of
//! the caller-facing [`ErrorKind`]s through [`EngineError::kind`].

use crate::ids::{OrderId, OwnerId, TradeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-facing error classification surfaced by the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Non-positive amount or price; rejected before any mutation
    InvalidOrder,
    /// Unknown order or trade identifier
    NotFound,
    /// Cancel requested by someone other than the owner
    Unauthorized,
    /// Cancel of an order that is already terminal
    AlreadyInactive,
    /// Mutation that would break a ledger invariant
    InvalidState,
    /// Persistence unavailable or inconsistent
    StoreFailure,
}

/// Top-level engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Trade error: {0}")]
    Trade(#[from] TradeError),

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Classify this error for the caller
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Order(e) => e.kind(),
            EngineError::Trade(TradeError::NotFound { .. }) => ErrorKind::NotFound,
            EngineError::Store(_) => ErrorKind::StoreFailure,
        }
    }
}

/// Order-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid owner: {0}")]
    InvalidOwner(String),

    #[error("Invalid side: {0}")]
    InvalidSide(String),

    #[error("Order not found: {order_id}")]
    NotFound { order_id: OrderId },

    #[error("Order {order_id} is not owned by {requester}")]
    Unauthorized { order_id: OrderId, requester: OwnerId },

    #[error("Order {order_id} is already inactive")]
    AlreadyInactive { order_id: OrderId },

    #[error("Invalid state for order {order_id}: {reason}")]
    InvalidState { order_id: OrderId, reason: String },
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::InvalidAmount(_)
            | OrderError::InvalidPrice(_)
            | OrderError::InvalidOwner(_)
            | OrderError::InvalidSide(_) => ErrorKind::InvalidOrder,
            OrderError::NotFound { .. } => ErrorKind::NotFound,
            OrderError::Unauthorized { .. } => ErrorKind::Unauthorized,
            OrderError::AlreadyInactive { .. } => ErrorKind::AlreadyInactive,
            OrderError::InvalidState { .. } => ErrorKind::InvalidState,
        }
    }
}

/// Trade-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeError {
    #[error("Trade not found: {trade_id}")]
    NotFound { trade_id: TradeId },
}

/// Persistence failures; the in-flight mutation is abandoned without writes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Journal write failed: {0}")]
    Write(String),

    #[error("Journal read failed: {0}")]
    Read(String),

    #[error("Ledger inconsistent: {0}")]
    Inconsistent(String),

    /// A derived total no longer fits its integer width
    #[error("Ledger total overflow: {0}")]
    Overflow(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_error_display() {
        let err = OrderError::InvalidPrice("negative".to_string());
        assert_eq!(err.to_string(), "Invalid price: negative");
    }

    #[test]
    fn test_unauthorized_display() {
        let err = OrderError::Unauthorized {
            order_id: OrderId::new(3),
            requester: OwnerId::new("mallory"),
        };
        assert_eq!(err.to_string(), "Order 3 is not owned by mallory");
    }

    #[test]
    fn test_engine_error_from_order_error() {
        let engine_err: EngineError = OrderError::AlreadyInactive { order_id: OrderId::new(1) }.into();
        assert!(matches!(engine_err, EngineError::Order(_)));
        assert_eq!(engine_err.kind(), ErrorKind::AlreadyInactive);
    }

    #[test]
    fn test_error_kinds() {
        let cases: Vec<(EngineError, ErrorKind)> = vec![
            (OrderError::InvalidAmount("zero".into()).into(), ErrorKind::InvalidOrder),
            (OrderError::InvalidPrice("zero".into()).into(), ErrorKind::InvalidOrder),
            (OrderError::NotFound { order_id: OrderId::new(9) }.into(), ErrorKind::NotFound),
            (TradeError::NotFound { trade_id: TradeId::new(9) }.into(), ErrorKind::NotFound),
            (
                OrderError::Unauthorized {
                    order_id: OrderId::new(1),
                    requester: OwnerId::new("bob"),
                }
                .into(),
                ErrorKind::Unauthorized,
            ),
            (StoreError::Write("disk full".into()).into(), ErrorKind::StoreFailure),
        ];

        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{}", err);
        }
    }
}
