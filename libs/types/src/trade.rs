//! Executed trade records
//!
//! A trade is created once, complete, by the matching pass that produced it
//! and is never mutated afterwards.

use crate::ids::{OrderId, OwnerId, TradeId};
use crate::numeric::{EnergyAmount, Notional, Price};
use crate::order::Side;
use serde::{Deserialize, Serialize};

/// Atomic exchange of energy between a buy and a sell order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,

    // Order references (informational only)
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,

    pub buyer: OwnerId,
    pub seller: OwnerId,

    pub energy_amount: EnergyAmount,
    /// Execution price, always the resting order's limit
    pub price: Price,
    pub timestamp: i64, // Unix nanos
    /// Side of the resting order that set the price
    pub maker_side: Side,

    /// Always true: trades are atomic, not staged
    pub completed: bool,
    /// Always false: kept for the external query shape only
    pub cancelled: bool,
}

impl Trade {
    /// Create a completed trade
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trade_id: TradeId,
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        buyer: OwnerId,
        seller: OwnerId,
        energy_amount: EnergyAmount,
        price: Price,
        timestamp: i64,
        maker_side: Side,
    ) -> Self {
        Self {
            trade_id,
            buy_order_id,
            sell_order_id,
            buyer,
            seller,
            energy_amount,
            price,
            timestamp,
            maker_side,
            completed: true,
            cancelled: false,
        }
    }

    /// Trade value (amount × price)
    pub fn notional(&self) -> Notional {
        self.energy_amount.notional_at(self.price)
    }

    /// Order id of the resting side
    pub fn maker_order_id(&self) -> OrderId {
        match self.maker_side {
            Side::BUY => self.buy_order_id,
            Side::SELL => self.sell_order_id,
        }
    }

    /// Order id of the incoming side
    pub fn taker_order_id(&self) -> OrderId {
        match self.maker_side {
            Side::BUY => self.sell_order_id,
            Side::SELL => self.buy_order_id,
        }
    }

    pub fn is_self_trade(&self) -> bool {
        self.buyer == self.seller
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade() -> Trade {
        Trade::new(
            TradeId::new(1),
            OrderId::new(2),
            OrderId::new(1),
            OwnerId::new("bob"),
            OwnerId::new("alice"),
            EnergyAmount::from_u64(10),
            Price::from_u64(90),
            1_708_123_456_789_000_000,
            Side::SELL,
        )
    }

    #[test]
    fn test_trade_creation() {
        let trade = sample_trade();
        assert!(trade.completed);
        assert!(!trade.cancelled);
        assert!(!trade.is_self_trade());
    }

    #[test]
    fn test_trade_notional() {
        assert_eq!(sample_trade().notional(), Notional::from_u128(900));
    }

    #[test]
    fn test_maker_taker_ids() {
        let trade = sample_trade();
        assert_eq!(trade.maker_order_id(), OrderId::new(1));
        assert_eq!(trade.taker_order_id(), OrderId::new(2));
    }

    #[test]
    fn test_trade_serialization() {
        let trade = sample_trade();
        let json = serde_json::to_string(&trade).unwrap();
        assert!(json.contains("\"maker_side\":\"SELL\""));
        let back: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(back, trade);
    }
}
