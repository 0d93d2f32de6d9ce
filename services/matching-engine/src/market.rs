//! Thread-safe query and submission façade
//!
//! Writers hold the write lock for the whole scan-and-commit sequence, so
//! submissions and cancellations are linearized. Readers share the read lock
//! and only ever observe committed state.

use parking_lot::RwLock;
use std::sync::Arc;
use types::account::ParticipantAccount;
use types::errors::{EngineError, OrderError, StoreError, TradeError};
use types::ids::{OrderId, OwnerId, TradeId};
use types::order::{Order, Side};
use types::trade::Trade;

use crate::book::BookDepth;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::engine::{MatchingEngine, NewOrder, SubmitReceipt};
use crate::feed::{FeedError, FeedSubscription};
use crate::settlement::SettlementError;

#[derive(Clone)]
pub struct EnergyMarket {
    engine: Arc<RwLock<MatchingEngine>>,
}

impl EnergyMarket {
    /// Open an in-memory or journal-backed market per `config`
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        Ok(Self::from_engine(MatchingEngine::open(config)?))
    }

    pub fn open_with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        Ok(Self::from_engine(MatchingEngine::open_with_clock(config, clock)?))
    }

    /// Rebuild a journal-backed market without modifying the journal
    pub fn open_read_only(config: EngineConfig) -> Result<Self, EngineError> {
        Ok(Self::from_engine(MatchingEngine::open_read_only(
            config,
            Arc::new(SystemClock),
        )?))
    }

    pub fn in_memory() -> Self {
        Self::from_engine(MatchingEngine::new(EngineConfig::default()))
    }

    pub fn from_engine(engine: MatchingEngine) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
        }
    }

    /// Validate raw request fields and submit
    pub fn place_order(
        &self,
        owner: &str,
        amount: i128,
        price: i128,
        side: Side,
    ) -> Result<SubmitReceipt, EngineError> {
        let order = NewOrder::try_new(owner, amount, price, side)?;
        self.submit(order)
    }

    pub fn submit(&self, order: NewOrder) -> Result<SubmitReceipt, EngineError> {
        self.engine.write().submit_order(order)
    }

    pub fn submit_at(&self, order: NewOrder, timestamp: i64) -> Result<SubmitReceipt, EngineError> {
        self.engine.write().submit_order_at(order, timestamp)
    }

    pub fn cancel_order(&self, order_id: OrderId, requester: &OwnerId) -> Result<Order, EngineError> {
        self.engine.write().cancel_order(order_id, requester)
    }

    pub fn get_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.engine.read().get_order(order_id).cloned()
    }

    pub fn get_trade(&self, trade_id: TradeId) -> Result<Trade, TradeError> {
        self.engine.read().get_trade(trade_id).cloned()
    }

    pub fn get_active_orders_count(&self) -> usize {
        self.engine.read().count_active_orders()
    }

    pub fn account(&self, owner: &OwnerId) -> Option<ParticipantAccount> {
        self.engine.read().account(owner).cloned()
    }

    /// Every participant's account, in owner order
    pub fn accounts(&self) -> Vec<(OwnerId, ParticipantAccount)> {
        self.engine
            .read()
            .settlement()
            .accounts()
            .map(|(owner, account)| (owner.clone(), account.clone()))
            .collect()
    }

    pub fn depth(&self) -> BookDepth {
        self.engine.read().depth()
    }

    pub fn state_hash(&self) -> Result<String, StoreError> {
        self.engine.read().state_hash()
    }

    /// Events published from now on
    pub fn subscribe(&self) -> FeedSubscription {
        self.engine.read().feed().subscribe()
    }

    /// Retained events from `sequence` onwards, then live events
    pub fn subscribe_from(&self, sequence: u64) -> Result<FeedSubscription, FeedError> {
        self.engine.read().feed().subscribe_from(sequence)
    }

    pub fn reconcile(&self) -> Result<(), SettlementError> {
        self.engine.write().reconcile()
    }

    pub fn sync(&self) -> Result<(), StoreError> {
        self.engine.write().sync()
    }

    /// Run `f` against a consistent snapshot of the engine
    pub fn read<R>(&self, f: impl FnOnce(&MatchingEngine) -> R) -> R {
        f(&self.engine.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::errors::ErrorKind;

    #[test]
    fn test_market_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EnergyMarket>();
    }

    #[test]
    fn test_queries_return_owned_snapshots() {
        let market = EnergyMarket::in_memory();
        let receipt = market.place_order("alice", 10, 100, Side::BUY).unwrap();

        let first = market.get_order(receipt.order_id).unwrap();
        let second = market.get_order(receipt.order_id).unwrap();
        assert_eq!(first, second);
        assert_eq!(market.get_active_orders_count(), 1);
    }

    #[test]
    fn test_invalid_request_kinds() {
        let market = EnergyMarket::in_memory();
        let err = market.place_order("alice", 0, 100, Side::SELL).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOrder);

        let err = market.get_trade(TradeId::new(1)).unwrap_err();
        assert_eq!(EngineError::from(err).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_clones_share_state() {
        let market = EnergyMarket::in_memory();
        let other = market.clone();
        market.place_order("alice", 3, 50, Side::SELL).unwrap();
        assert_eq!(other.get_active_orders_count(), 1);
        assert_eq!(other.depth().asks.len(), 1);
    }
}
