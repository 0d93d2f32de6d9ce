//! Change feed events
//!
//! Events are derived from committed ledger batches, so the feed can be
//! regenerated from the journal after a restart with the same sequence
//! numbers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use types::ids::{OrderId, OwnerId, TradeId};
use types::numeric::{EnergyAmount, Price};
use types::order::{CloseReason, Side};

use crate::ledger::{LedgerBatch, LedgerMutation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedPayload {
    OrderPlaced {
        order_id: OrderId,
        owner: OwnerId,
        amount: EnergyAmount,
        price: Price,
        side: Side,
    },
    TradeExecuted {
        trade_id: TradeId,
        buyer: OwnerId,
        seller: OwnerId,
        amount: EnergyAmount,
        price: Price,
        buy_order_id: OrderId,
        sell_order_id: OrderId,
    },
    OrderCancelled {
        order_id: OrderId,
        reason: CloseReason,
    },
}

impl FeedPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            FeedPayload::OrderPlaced { .. } => "OrderPlaced",
            FeedPayload::TradeExecuted { .. } => "TradeExecuted",
            FeedPayload::OrderCancelled { .. } => "OrderCancelled",
        }
    }
}

/// One notification, numbered in generation order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEvent {
    /// Gapless, starting at 1
    pub sequence: u64,
    pub timestamp: i64,
    pub payload: FeedPayload,
}

impl PartialOrd for FeedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FeedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence.cmp(&other.sequence)
    }
}

/// Notifications implied by a committed batch, in mutation order
///
/// Fills that exhaust an order are reported through the trade; only
/// deactivations for any other reason produce `OrderCancelled`.
pub fn payloads_for_batch(batch: &LedgerBatch) -> Vec<FeedPayload> {
    batch
        .mutations
        .iter()
        .filter_map(|mutation| match mutation {
            LedgerMutation::OrderCreated(order) => Some(FeedPayload::OrderPlaced {
                order_id: order.order_id,
                owner: order.owner.clone(),
                amount: order.original_amount,
                price: order.price,
                side: order.side,
            }),
            LedgerMutation::TradeRecorded(trade) => Some(FeedPayload::TradeExecuted {
                trade_id: trade.trade_id,
                buyer: trade.buyer.clone(),
                seller: trade.seller.clone(),
                amount: trade.energy_amount,
                price: trade.price,
                buy_order_id: trade.buy_order_id,
                sell_order_id: trade.sell_order_id,
            }),
            LedgerMutation::OrderUpdated {
                order_id,
                active: false,
                reason,
                ..
            } if *reason != CloseReason::Filled => Some(FeedPayload::OrderCancelled {
                order_id: *order_id,
                reason: *reason,
            }),
            LedgerMutation::OrderUpdated { .. } => None,
        })
        .collect()
}
