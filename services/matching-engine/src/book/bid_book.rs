//! Bid (buy-side) book
//!
//! Resting buy orders by price descending (best bid first). BTreeMap keeps
//! iteration deterministic.

use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::Price;
use types::order::Order;

use super::price_level::PriceLevel;
use super::DepthLevel;
use crate::ledger::LedgerStore;

#[derive(Debug, Clone, Default)]
pub struct BidBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: &Order) {
        self.levels
            .entry(order.price)
            .or_default()
            .insert(order.order_id, order.timestamp);
    }

    /// Returns true if the order was found and removed
    pub fn remove(&mut self, order_id: OrderId, price: Price) -> bool {
        let Some(level) = self.levels.get_mut(&price) else {
            return false;
        };
        let removed = level.remove(order_id);
        if level.is_empty() {
            self.levels.remove(&price);
        }
        removed
    }

    /// Highest bid price
    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next_back().copied()
    }

    /// Resting bids in matching priority: highest price, then time
    pub fn iter_priority(&self) -> impl Iterator<Item = (Price, OrderId)> + '_ {
        self.levels
            .iter()
            .rev()
            .flat_map(|(price, level)| level.iter().map(move |id| (*price, id)))
    }

    /// Top `depth` levels, amounts read from the store
    pub fn depth_snapshot(&self, depth: usize, store: &LedgerStore) -> Vec<DepthLevel> {
        self.levels
            .iter()
            .rev()
            .take(depth)
            .map(|(price, level)| DepthLevel::from_level(*price, level, store))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn order_count(&self) -> usize {
        self.levels.values().map(PriceLevel::order_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::OwnerId;
    use types::numeric::EnergyAmount;
    use types::order::Side;

    fn bid(id: u64, price: u64, ts: i64) -> Order {
        Order::new(
            OrderId::new(id),
            OwnerId::new("buyer"),
            Side::BUY,
            Price::from_u64(price),
            EnergyAmount::from_u64(1),
            ts,
        )
    }

    #[test]
    fn test_best_bid_is_highest() {
        let mut book = BidBook::new();
        book.insert(&bid(1, 100, 1));
        book.insert(&bid(2, 110, 2));
        book.insert(&bid(3, 90, 3));

        assert_eq!(book.best_price(), Some(Price::from_u64(110)));
        assert_eq!(book.level_count(), 3);
    }

    #[test]
    fn test_priority_order() {
        let mut book = BidBook::new();
        book.insert(&bid(1, 100, 1));
        book.insert(&bid(2, 110, 2));
        book.insert(&bid(3, 100, 3));

        let ids: Vec<u64> = book.iter_priority().map(|(_, id)| id.value()).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_remove_drops_empty_level() {
        let mut book = BidBook::new();
        book.insert(&bid(1, 100, 1));

        assert!(!book.remove(OrderId::new(1), Price::from_u64(99)));
        assert!(book.remove(OrderId::new(1), Price::from_u64(100)));
        assert!(book.is_empty());
        assert_eq!(book.order_count(), 0);
    }
}
