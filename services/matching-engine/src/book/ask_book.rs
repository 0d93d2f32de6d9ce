//! Ask (sell-side) book
//!
//! Resting sell orders by price ascending (best ask first).

use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::Price;
use types::order::Order;

use super::price_level::PriceLevel;
use super::DepthLevel;
use crate::ledger::LedgerStore;

#[derive(Debug, Clone, Default)]
pub struct AskBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: &Order) {
        self.levels
            .entry(order.price)
            .or_default()
            .insert(order.order_id, order.timestamp);
    }

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

    /// Lowest ask price
    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    /// Resting asks in matching priority: lowest price, then time
    pub fn iter_priority(&self) -> impl Iterator<Item = (Price, OrderId)> + '_ {
        self.levels
            .iter()
            .flat_map(|(price, level)| level.iter().map(move |id| (*price, id)))
    }

    pub fn depth_snapshot(&self, depth: usize, store: &LedgerStore) -> Vec<DepthLevel> {
        self.levels
            .iter()
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

    fn ask(id: u64, price: u64, amount: u64) -> Order {
        Order::new(
            OrderId::new(id),
            OwnerId::new("seller"),
            Side::SELL,
            Price::from_u64(price),
            EnergyAmount::from_u64(amount),
            id as i64,
        )
    }

    #[test]
    fn test_best_ask_is_lowest() {
        let mut book = AskBook::new();
        book.insert(&ask(1, 95, 5));
        book.insert(&ask(2, 90, 5));

        assert_eq!(book.best_price(), Some(Price::from_u64(90)));
        let ids: Vec<u64> = book.iter_priority().map(|(_, id)| id.value()).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_depth_reads_amounts_from_store() {
        let mut store = LedgerStore::new();
        let mut book = AskBook::new();
        for (amount, price) in [(5, 90), (3, 90), (7, 95), (1, 99)] {
            let id = store
                .create_order(
                    OwnerId::new("seller"),
                    EnergyAmount::from_u64(amount),
                    Price::from_u64(price),
                    Side::SELL,
                    0,
                )
                .unwrap();
            book.insert(store.get_order(id).unwrap());
        }

        let depth = book.depth_snapshot(2, &store);
        assert_eq!(depth.len(), 2);
        assert_eq!(depth[0].price, Price::from_u64(90));
        assert_eq!(depth[0].total_amount, 8);
        assert_eq!(depth[0].order_count, 2);
        assert_eq!(depth[1].price, Price::from_u64(95));
    }
}
