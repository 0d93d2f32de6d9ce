//! Order book index
//!
//! Index over the *active* orders in the ledger store, arranged for
//! price-time priority. The book holds identifiers only and is always
//! rebuildable from the store.

pub mod ask_book;
pub mod bid_book;
pub mod price_level;

pub use ask_book::AskBook;
pub use bid_book::BidBook;
pub use price_level::PriceLevel;

use serde::Serialize;
use types::ids::OrderId;
use types::numeric::Price;
use types::order::{Order, Side};

use crate::ledger::LedgerStore;

/// Aggregated view of one price level
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepthLevel {
    pub price: Price,
    /// Remaining kWh across the level, summed in u128 so any level fits
    pub total_amount: u128,
    pub order_count: usize,
}

impl DepthLevel {
    fn from_level(price: Price, level: &PriceLevel, store: &LedgerStore) -> Self {
        let total_amount = level
            .iter()
            .filter_map(|id| store.get_order(id).ok())
            .map(|o| o.energy_amount.kwh() as u128)
            .sum();
        Self {
            price,
            total_amount,
            order_count: level.order_count(),
        }
    }
}

/// Top-of-book snapshot for both sides
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookDepth {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    bids: BidBook,
    asks: AskBook,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every active order in the store
    pub fn rebuild(store: &LedgerStore) -> Self {
        let mut book = Self::new();
        for order in store.active_orders() {
            book.insert(order);
        }
        book
    }

    pub fn insert(&mut self, order: &Order) {
        match order.side {
            Side::BUY => self.bids.insert(order),
            Side::SELL => self.asks.insert(order),
        }
    }

    pub fn remove(&mut self, order_id: OrderId, side: Side, price: Price) -> bool {
        match side {
            Side::BUY => self.bids.remove(order_id, price),
            Side::SELL => self.asks.remove(order_id, price),
        }
    }

    /// Resting orders of `side` in matching priority
    pub fn iter_priority(&self, side: Side) -> Box<dyn Iterator<Item = (Price, OrderId)> + '_> {
        match side {
            Side::BUY => Box::new(self.bids.iter_priority()),
            Side::SELL => Box::new(self.asks.iter_priority()),
        }
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    /// A resting bid at or above a resting ask
    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(bid), Some(ask)) if bid >= ask)
    }

    pub fn depth(&self, levels: usize, store: &LedgerStore) -> BookDepth {
        BookDepth {
            bids: self.bids.depth_snapshot(levels, store),
            asks: self.asks.depth_snapshot(levels, store),
        }
    }

    pub fn order_count(&self) -> usize {
        self.bids.order_count() + self.asks.order_count()
    }
}
