//! Matching engine core
//!
//! Main coordinator for the ledger, the book index, settlement and the feed.
//! Every submission is matched against a read-only view of committed state,
//! collected into one ledger batch and committed as a unit. The book,
//! settlement view and feed only move after the commit succeeded.

use std::sync::Arc;
use tracing::{debug, error, info, warn};
use types::account::ParticipantAccount;
use types::errors::{EngineError, OrderError, StoreError, TradeError};
use types::ids::{OrderId, OwnerId, TradeId};
use types::numeric::{EnergyAmount, Price};
use types::order::{CloseReason, Order, Side};
use types::trade::Trade;

use crate::book::{BookDepth, OrderBook};
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, SelfTradePolicy};
use crate::events::payloads_for_batch;
use crate::feed::EventFeed;
use crate::ledger::{BatchKind, LedgerBatch, LedgerMutation, LedgerStore, RecoveredLedger};
use crate::matching::{crossing, MatchExecutor};
use crate::settlement::{SettlementBook, SettlementError, StagedSettlement};

/// A validated order submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub owner: OwnerId,
    pub amount: EnergyAmount,
    pub price: Price,
    pub side: Side,
}

impl NewOrder {
    pub fn new(owner: OwnerId, amount: EnergyAmount, price: Price, side: Side) -> Self {
        Self {
            owner,
            amount,
            price,
            side,
        }
    }

    /// Validate raw request fields
    pub fn try_new(owner: &str, amount: i128, price: i128, side: Side) -> Result<Self, OrderError> {
        let owner = OwnerId::try_new(owner)
            .ok_or_else(|| OrderError::InvalidOwner("owner must not be empty".into()))?;
        Ok(Self {
            owner,
            amount: EnergyAmount::try_from_i128(amount)?,
            price: Price::try_from_i128(price)?,
            side,
        })
    }
}

/// Outcome of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub order_id: OrderId,
    /// Trades in execution order
    pub trade_ids: Vec<TradeId>,
    pub remaining: EnergyAmount,
    pub active: bool,
}

/// Resting order leaving the book after a commit
struct Closed {
    order_id: OrderId,
    side: Side,
    price: Price,
}

pub struct MatchingEngine {
    store: LedgerStore,
    book: OrderBook,
    settlement: SettlementBook,
    feed: EventFeed,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl MatchingEngine {
    /// In-memory engine on the wall clock; `config.journal` is ignored
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Empty in-memory engine on `clock`
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: LedgerStore::new(),
            book: OrderBook::new(),
            settlement: SettlementBook::new(),
            feed: EventFeed::with_retention(config.feed_retention),
            clock,
            config,
        }
    }

    /// Engine over an existing store
    ///
    /// Fails when the store holds totals the settlement view cannot
    /// represent.
    pub fn from_store(
        store: LedgerStore,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let book = OrderBook::rebuild(&store);
        let settlement = SettlementBook::rebuild(&store)?;
        Ok(Self {
            store,
            book,
            settlement,
            feed: EventFeed::with_retention(config.feed_retention),
            clock,
            config,
        })
    }

    /// Open according to `config`, recovering the journal if one is set
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        let settings = match &config.journal {
            Some(settings) => settings.clone(),
            None => return Ok(Self::with_clock(config, clock)),
        };

        let recovered = LedgerStore::recover(settings.to_journal_config())?;
        Self::from_recovered(recovered, config, clock)
    }

    /// Rebuild the journal in `config.journal` without touching its files
    ///
    /// A torn tail is skipped rather than truncated, and nothing this
    /// engine commits is written back.
    pub fn open_read_only(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        let recovered = match &config.journal {
            Some(settings) => LedgerStore::load(&settings.dir)?,
            None => return Ok(Self::with_clock(config, clock)),
        };
        Self::from_recovered(recovered, config, clock)
    }

    fn from_recovered(
        recovered: RecoveredLedger,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let engine = Self::from_store(recovered.store, config, clock)?;

        // Regenerate the feed so sequence numbers survive restarts
        for batch in &recovered.batches {
            engine.feed.publish(batch.timestamp, payloads_for_batch(batch));
        }

        info!(
            log = %engine.store.log_description(),
            batches = recovered.batches.len(),
            active_orders = engine.store.count_active_orders(),
            feed_sequence = engine.feed.last_sequence(),
            torn_tail = recovered.report.torn_tail.is_some(),
            "matching engine recovered"
        );
        Ok(engine)
    }

    /// Submit an order stamped with the engine clock
    pub fn submit_order(&mut self, order: NewOrder) -> Result<SubmitReceipt, EngineError> {
        let now = self.clock.now_nanos();
        self.submit_order_at(order, now)
    }

    /// Submit an order with an explicit timestamp
    ///
    /// The timestamp is raised to the latest order timestamp if it would
    /// otherwise go backwards.
    pub fn submit_order_at(
        &mut self,
        order: NewOrder,
        timestamp: i64,
    ) -> Result<SubmitReceipt, EngineError> {
        let timestamp = timestamp.max(self.store.last_timestamp());
        let order_id = self.store.next_order_id();
        let mut incoming = Order::new(
            order_id,
            order.owner,
            order.side,
            order.price,
            order.amount,
            timestamp,
        );

        let mut batch = LedgerBatch::new(BatchKind::Submit, timestamp);
        batch.push(LedgerMutation::OrderCreated(incoming.clone()));

        let (trade_ids, closed) = self.plan_matches(&mut incoming, &mut batch)?;

        if !trade_ids.is_empty() {
            batch.push(LedgerMutation::OrderUpdated {
                order_id,
                remaining: incoming.energy_amount,
                active: incoming.active,
                reason: CloseReason::Filled,
            });
        }

        let settled = self.stage_settlement(&batch)?;
        self.store.commit(&batch)?;

        for c in &closed {
            self.book.remove(c.order_id, c.side, c.price);
        }
        if incoming.active {
            self.book.insert(&incoming);
        }
        self.publish(&batch, settled);

        info!(
            order_id = %order_id,
            owner = %incoming.owner,
            side = %incoming.side,
            price = incoming.price.units(),
            amount = incoming.original_amount.kwh(),
            trades = trade_ids.len(),
            remaining = incoming.energy_amount.kwh(),
            "order submitted"
        );

        Ok(SubmitReceipt {
            order_id,
            trade_ids,
            remaining: incoming.energy_amount,
            active: incoming.active,
        })
    }

    /// Walk the opposite side in priority order and record every match
    ///
    /// Reads committed state only; nothing is applied until the batch
    /// commits.
    fn plan_matches(
        &self,
        incoming: &mut Order,
        batch: &mut LedgerBatch,
    ) -> Result<(Vec<TradeId>, Vec<Closed>), EngineError> {
        let mut executor = MatchExecutor::new(self.store.next_trade_id());
        let mut trade_ids = Vec::new();
        let mut closed = Vec::new();

        for (resting_price, resting_id) in self.book.iter_priority(incoming.side.opposite()) {
            if !incoming.active {
                break;
            }
            if !crossing::incoming_can_match(incoming.side, incoming.price, resting_price) {
                break;
            }

            let mut maker = self
                .store
                .get_order(resting_id)
                .ok()
                .filter(|o| o.active)
                .cloned()
                .ok_or_else(|| {
                    StoreError::Inconsistent(format!(
                        "book references order {} which is not resting",
                        resting_id
                    ))
                })?;

            if maker.owner == incoming.owner
                && self.config.self_trade_policy == SelfTradePolicy::CancelResting
            {
                debug!(order_id = %resting_id, owner = %maker.owner, "self-trade prevented");
                batch.push(LedgerMutation::OrderUpdated {
                    order_id: resting_id,
                    remaining: maker.energy_amount,
                    active: false,
                    reason: CloseReason::SelfTradePrevented,
                });
                closed.push(Closed {
                    order_id: resting_id,
                    side: maker.side,
                    price: maker.price,
                });
                continue;
            }

            let amount = MatchExecutor::fill_amount(incoming, &maker);
            let trade = executor.execute(incoming, &maker, amount, incoming.timestamp);
            maker.apply_fill(amount)?;
            incoming.apply_fill(amount)?;

            debug!(
                trade_id = %trade.trade_id,
                maker = %resting_id,
                taker = %incoming.order_id,
                amount = amount.kwh(),
                price = trade.price.units(),
                "match"
            );

            batch.push(LedgerMutation::OrderUpdated {
                order_id: resting_id,
                remaining: maker.energy_amount,
                active: maker.active,
                reason: CloseReason::Filled,
            });
            if !maker.active {
                closed.push(Closed {
                    order_id: resting_id,
                    side: maker.side,
                    price: maker.price,
                });
            }
            trade_ids.push(trade.trade_id);
            batch.push(LedgerMutation::TradeRecorded(trade));
        }

        Ok((trade_ids, closed))
    }

    /// Owner cancellation; the remaining amount is frozen, not zeroed
    pub fn cancel_order(
        &mut self,
        order_id: OrderId,
        requester: &OwnerId,
    ) -> Result<Order, EngineError> {
        let order = self.store.get_order(order_id)?;
        if &order.owner != requester {
            warn!(order_id = %order_id, requester = %requester, "cancel rejected: not the owner");
            return Err(OrderError::Unauthorized {
                order_id,
                requester: requester.clone(),
            }
            .into());
        }
        if !order.active {
            return Err(OrderError::AlreadyInactive { order_id }.into());
        }
        let (side, price, remaining) = (order.side, order.price, order.energy_amount);

        let timestamp = self.clock.now_nanos().max(self.store.last_timestamp());
        let mut batch = LedgerBatch::new(BatchKind::Cancel, timestamp);
        batch.push(LedgerMutation::OrderUpdated {
            order_id,
            remaining,
            active: false,
            reason: CloseReason::Cancelled,
        });
        let settled = self.stage_settlement(&batch)?;
        self.store.commit(&batch)?;

        self.book.remove(order_id, side, price);
        self.publish(&batch, settled);

        info!(order_id = %order_id, remaining = remaining.kwh(), "order cancelled");
        Ok(self.store.get_order(order_id)?.clone())
    }

    /// Settlement totals a batch would produce, computed before it commits
    ///
    /// A batch that would push any participant total past its integer
    /// width is refused as an invalid order.
    fn stage_settlement(&self, batch: &LedgerBatch) -> Result<StagedSettlement, EngineError> {
        self.settlement
            .stage(batch, &self.store)
            .map_err(|e| match e {
                StoreError::Overflow(total) => {
                    warn!(kind = batch.kind.as_str(), total = %total, "batch refused: settlement overflow");
                    OrderError::InvalidAmount(format!("settlement total would overflow: {}", total))
                        .into()
                }
                other => EngineError::from(other),
            })
    }

    /// Install a committed batch into settlement and the feed
    fn publish(&mut self, batch: &LedgerBatch, settled: StagedSettlement) {
        self.settlement.install(settled);
        self.feed.publish(batch.timestamp, payloads_for_batch(batch));
    }

    /// Check the incremental settlement view against a full rebuild
    ///
    /// On divergence the view is replaced by the rebuild and the divergence
    /// is still reported.
    pub fn reconcile(&mut self) -> Result<(), SettlementError> {
        match self.settlement.verify(&self.store) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "settlement diverged, replacing with rebuild");
                match SettlementBook::rebuild(&self.store) {
                    Ok(rebuilt) => self.settlement = rebuilt,
                    Err(err) => error!(error = %err, "settlement rebuild failed, keeping current view"),
                }
                Err(e)
            }
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn get_order(&self, order_id: OrderId) -> Result<&Order, OrderError> {
        self.store.get_order(order_id)
    }

    pub fn get_trade(&self, trade_id: TradeId) -> Result<&Trade, TradeError> {
        self.store.get_trade(trade_id)
    }

    pub fn count_active_orders(&self) -> usize {
        self.store.count_active_orders()
    }

    pub fn account(&self, owner: &OwnerId) -> Option<&ParticipantAccount> {
        self.settlement.account(owner)
    }

    /// Depth snapshot at the configured number of levels
    pub fn depth(&self) -> BookDepth {
        self.book.depth(self.config.depth_limit, &self.store)
    }

    pub fn state_hash(&self) -> Result<String, StoreError> {
        self.store.state_hash()
    }

    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.store.sync()
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn settlement(&self) -> &SettlementBook {
        &self.settlement
    }

    pub fn feed(&self) -> &EventFeed {
        &self.feed
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
