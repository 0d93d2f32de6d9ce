//! Price level with time priority
//!
//! A price level holds the identifiers of the resting orders at one price,
//! ordered by (timestamp, order id). Amounts are not stored here; the ledger
//! store is the only holder of order state.

use std::collections::VecDeque;
use types::ids::OrderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct LevelEntry {
    timestamp: i64,
    order_id: OrderId,
}

#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    /// Sorted by (timestamp, order id); earliest first
    orders: VecDeque<LevelEntry>,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert in time priority
    ///
    /// New orders normally carry the latest timestamp and the highest id, so
    /// this is a push to the back; the search handles rebuilds in any order.
    pub fn insert(&mut self, order_id: OrderId, timestamp: i64) {
        let entry = LevelEntry { timestamp, order_id };
        let at = self.orders.partition_point(|e| *e < entry);
        if self.orders.get(at) != Some(&entry) {
            self.orders.insert(at, entry);
        }
    }

    /// Remove an order, returning whether it was present
    pub fn remove(&mut self, order_id: OrderId) -> bool {
        match self.orders.iter().position(|e| e.order_id == order_id) {
            Some(pos) => {
                self.orders.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Order with the highest time priority
    pub fn front(&self) -> Option<OrderId> {
        self.orders.front().map(|e| e.order_id)
    }

    /// Order ids in time priority
    pub fn iter(&self) -> impl Iterator<Item = OrderId> + '_ {
        self.orders.iter().map(|e| e.order_id)
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}
