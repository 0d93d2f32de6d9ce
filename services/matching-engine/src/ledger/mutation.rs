//! Ledger mutations and commit batches
//!
//! A batch is the unit of atomicity: everything one submission or one
//! cancellation changes, validated together, journaled as one entry and
//! applied together.

use serde::{Deserialize, Serialize};
use types::ids::OrderId;
use types::numeric::EnergyAmount;
use types::order::{CloseReason, Order};
use types::trade::Trade;

/// One change to the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerMutation {
    /// A new active order with its full amount remaining
    OrderCreated(Order),
    /// New remaining amount / active flag for an existing active order
    ///
    /// `reason` is recorded only when `active` is false.
    OrderUpdated {
        order_id: OrderId,
        remaining: EnergyAmount,
        active: bool,
        reason: CloseReason,
    },
    TradeRecorded(Trade),
}

/// What produced a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    /// A matching pass for one submitted order
    Submit,
    /// An owner cancellation
    Cancel,
    /// A single store-level operation
    Direct,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Submit => "submit",
            BatchKind::Cancel => "cancel",
            BatchKind::Direct => "direct",
        }
    }
}

/// All mutations of one atomic commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBatch {
    pub kind: BatchKind,
    pub timestamp: i64,
    pub mutations: Vec<LedgerMutation>,
}

impl LedgerBatch {
    pub fn new(kind: BatchKind, timestamp: i64) -> Self {
        Self {
            kind,
            timestamp,
            mutations: Vec::new(),
        }
    }

    pub fn push(&mut self, mutation: LedgerMutation) {
        self.mutations.push(mutation);
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn trade_count(&self) -> usize {
        self.mutations
            .iter()
            .filter(|m| matches!(m, LedgerMutation::TradeRecorded(_)))
            .count()
    }
}
