//! Ledger Store
//!
//! Exclusive owner of every order and trade record. Orders are mutable only
//! through validated transitions; trades are append-only. All changes go
//! through [`LedgerStore::commit`], which stages the whole batch against a
//! scratch copy of the touched orders, journals it, and only then installs
//! it. Any failure before installation leaves the store exactly as it was.

use persistence::{JournalApplier, JournalConfig, JournalEntry, RecoveryError, ReplayReport};
use sha2::{Digest, Sha256};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info, warn};
use types::errors::{EngineError, OrderError, StoreError, TradeError};
use types::ids::{OrderId, OwnerId, TradeId};
use types::numeric::{EnergyAmount, Price};
use types::order::{CloseReason, Order, Side};
use types::trade::Trade;

use super::log::{decode_batch, JournalLog, LedgerLog, NullLog};
use super::mutation::{BatchKind, LedgerBatch, LedgerMutation};

pub struct LedgerStore {
    orders: BTreeMap<OrderId, Order>,
    trades: BTreeMap<TradeId, Trade>,
    next_order_id: OrderId,
    next_trade_id: TradeId,
    active_orders: usize,
    /// Latest order timestamp; order timestamps never go backwards
    last_timestamp: i64,
    commits: u64,
    log: Box<dyn LedgerLog>,
}

/// A validated batch, ready to install
struct Staged {
    /// Final state of every order the batch touches
    orders: BTreeMap<OrderId, Order>,
    trades: Vec<Trade>,
    next_order_id: OrderId,
    next_trade_id: TradeId,
    last_timestamp: i64,
}

impl Staged {
    fn order<'a>(&'a self, store: &'a LedgerStore, order_id: OrderId) -> Option<&'a Order> {
        self.orders.get(&order_id).or_else(|| store.orders.get(&order_id))
    }
}

/// Result of rebuilding a store from its journal
pub struct RecoveredLedger {
    pub store: LedgerStore,
    /// Every replayed batch, in commit order
    pub batches: Vec<LedgerBatch>,
    pub report: ReplayReport,
}

impl LedgerStore {
    /// Empty in-memory store
    pub fn new() -> Self {
        Self::with_log(Box::new(NullLog))
    }

    pub fn with_log(log: Box<dyn LedgerLog>) -> Self {
        Self {
            orders: BTreeMap::new(),
            trades: BTreeMap::new(),
            next_order_id: OrderId::FIRST,
            next_trade_id: TradeId::FIRST,
            active_orders: 0,
            last_timestamp: i64::MIN,
            commits: 0,
            log,
        }
    }

    /// Rebuild the store from the journal in `config.dir`, then keep
    /// appending to that journal.
    pub fn recover(config: JournalConfig) -> Result<RecoveredLedger, EngineError> {
        let mut recovered = Self::replay_journal(&config.dir, persistence::replay)?;
        let next_sequence = recovered.report.next_sequence();
        recovered.store.log = Box::new(JournalLog::open(config, next_sequence)?);
        Ok(recovered)
    }

    /// Rebuild an in-memory copy of the journal in `dir`
    ///
    /// The journal files are left exactly as found, torn tail included, and
    /// later commits on the returned store are not persisted.
    pub fn load(dir: &Path) -> Result<RecoveredLedger, EngineError> {
        Self::replay_journal(dir, persistence::replay_read_only)
    }

    fn replay_journal(
        dir: &Path,
        replay: fn(&Path, &mut dyn JournalApplier) -> Result<ReplayReport, RecoveryError>,
    ) -> Result<RecoveredLedger, EngineError> {
        let mut store = LedgerStore::new();
        let mut replayer = Replayer {
            store: &mut store,
            batches: Vec::new(),
        };

        let report = replay(dir, &mut replayer).map_err(|e| {
            error!(error = %e, "ledger recovery failed");
            StoreError::Read(e.to_string())
        })?;
        let batches = replayer.batches;

        info!(
            orders = store.orders.len(),
            trades = store.trades.len(),
            active = store.active_orders,
            commits = store.commits,
            "ledger recovered"
        );
        Ok(RecoveredLedger {
            store,
            batches,
            report,
        })
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn get_order(&self, order_id: OrderId) -> Result<&Order, OrderError> {
        self.orders
            .get(&order_id)
            .ok_or(OrderError::NotFound { order_id })
    }

    pub fn get_trade(&self, trade_id: TradeId) -> Result<&Trade, TradeError> {
        self.trades
            .get(&trade_id)
            .ok_or(TradeError::NotFound { trade_id })
    }

    pub fn count_active_orders(&self) -> usize {
        self.active_orders
    }

    /// All orders in identifier order
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn active_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| o.active)
    }

    /// All trades in identifier order
    pub fn trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.values()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    pub fn next_order_id(&self) -> OrderId {
        self.next_order_id
    }

    pub fn next_trade_id(&self) -> TradeId {
        self.next_trade_id
    }

    /// Timestamp of the most recent order, `i64::MIN` when empty
    pub fn last_timestamp(&self) -> i64 {
        self.last_timestamp
    }

    /// Number of batches committed (or replayed) so far
    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    pub fn log_description(&self) -> String {
        self.log.describe()
    }

    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.log.sync()
    }

    /// SHA-256 over every order and trade, in identifier order
    pub fn state_hash(&self) -> Result<String, StoreError> {
        let mut hasher = Sha256::new();
        for order in self.orders.values() {
            let bytes = bincode::serialize(order).map_err(|e| StoreError::Inconsistent(e.to_string()))?;
            hasher.update(&bytes);
        }
        hasher.update(b"trades");
        for trade in self.trades.values() {
            let bytes = bincode::serialize(trade).map_err(|e| StoreError::Inconsistent(e.to_string()))?;
            hasher.update(&bytes);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    // ── Commit ──────────────────────────────────────────────────────

    /// Validate, journal and apply a batch as one unit.
    ///
    /// Returns the commit number of the batch.
    pub fn commit(&mut self, batch: &LedgerBatch) -> Result<u64, EngineError> {
        let staged = self.stage(batch).map_err(|e| {
            warn!(kind = batch.kind.as_str(), error = %e, "ledger batch rejected");
            e
        })?;

        self.log.append(batch).map_err(|e| {
            error!(kind = batch.kind.as_str(), error = %e, "ledger batch not persisted");
            EngineError::from(e)
        })?;

        self.install(staged);
        debug!(
            commit = self.commits,
            kind = batch.kind.as_str(),
            mutations = batch.len(),
            "ledger batch committed"
        );
        Ok(self.commits)
    }

    fn stage(&self, batch: &LedgerBatch) -> Result<Staged, EngineError> {
        if batch.is_empty() {
            return Err(StoreError::Inconsistent("empty batch".into()).into());
        }

        let mut staged = Staged {
            orders: BTreeMap::new(),
            trades: Vec::new(),
            next_order_id: self.next_order_id,
            next_trade_id: self.next_trade_id,
            last_timestamp: self.last_timestamp,
        };
        // Trade volume per order within this batch
        let mut traded: BTreeMap<OrderId, EnergyAmount> = BTreeMap::new();

        for mutation in &batch.mutations {
            match mutation {
                LedgerMutation::OrderCreated(order) => {
                    Self::validate_new_order(order, &staged)?;
                    staged.last_timestamp = order.timestamp;
                    staged.next_order_id = order.order_id.next();
                    staged.orders.insert(order.order_id, order.clone());
                }
                LedgerMutation::OrderUpdated {
                    order_id,
                    remaining,
                    active,
                    reason,
                } => {
                    let order = match staged.orders.entry(*order_id) {
                        Entry::Occupied(e) => e.into_mut(),
                        Entry::Vacant(e) => {
                            let current = self
                                .orders
                                .get(order_id)
                                .ok_or(OrderError::NotFound { order_id: *order_id })?;
                            e.insert(current.clone())
                        }
                    };
                    order.transition(*remaining, *active, *reason)?;
                }
                LedgerMutation::TradeRecorded(trade) => {
                    self.validate_trade(trade, &staged)?;
                    for order_id in [trade.buy_order_id, trade.sell_order_id] {
                        let total = traded.entry(order_id).or_default();
                        *total = total.checked_add(trade.energy_amount).ok_or_else(|| {
                            StoreError::Overflow(format!("traded volume of order {}", order_id))
                        })?;
                    }
                    staged.next_trade_id = trade.trade_id.next();
                    staged.trades.push(trade.clone());
                }
            }
        }

        self.check_fills(&staged, &traded)?;
        Ok(staged)
    }

    /// Every fill booked by the batch is backed by its trades, and every
    /// trade is booked as a fill on both legs
    fn check_fills(
        &self,
        staged: &Staged,
        traded: &BTreeMap<OrderId, EnergyAmount>,
    ) -> Result<(), OrderError> {
        for (order_id, order) in &staged.orders {
            let before = self
                .orders
                .get(order_id)
                .map_or(EnergyAmount::ZERO, |o| o.filled_amount);
            let filled = order
                .filled_amount
                .checked_sub(before)
                .unwrap_or(EnergyAmount::ZERO);
            let backed = traded.get(order_id).copied().unwrap_or(EnergyAmount::ZERO);
            if filled != backed {
                return Err(OrderError::InvalidState {
                    order_id: *order_id,
                    reason: format!("fill of {} does not match traded {}", filled, backed),
                });
            }
        }
        if let Some(order_id) = traded.keys().find(|id| !staged.orders.contains_key(id)) {
            return Err(OrderError::InvalidState {
                order_id: *order_id,
                reason: "traded without a fill".into(),
            });
        }
        Ok(())
    }

    fn validate_new_order(order: &Order, staged: &Staged) -> Result<(), OrderError> {
        let invalid = |reason: String| OrderError::InvalidState {
            order_id: order.order_id,
            reason,
        };

        if order.order_id != staged.next_order_id {
            return Err(invalid(format!(
                "expected order id {}",
                staged.next_order_id
            )));
        }
        if order.energy_amount.is_zero() {
            return Err(OrderError::InvalidAmount("energy amount must be positive".into()));
        }
        if order.price.units() == 0 {
            return Err(OrderError::InvalidPrice("price must be positive".into()));
        }
        if !order.active || order.has_fills() || !order.check_invariant() {
            return Err(invalid("new orders must be active and unfilled".into()));
        }
        if order.timestamp < staged.last_timestamp {
            return Err(invalid(format!(
                "timestamp {} precedes {}",
                order.timestamp, staged.last_timestamp
            )));
        }
        Ok(())
    }

    fn validate_trade(&self, trade: &Trade, staged: &Staged) -> Result<(), EngineError> {
        if trade.trade_id != staged.next_trade_id {
            return Err(StoreError::Inconsistent(format!(
                "trade id {} out of sequence, expected {}",
                trade.trade_id, staged.next_trade_id
            ))
            .into());
        }
        if trade.energy_amount.is_zero() || !trade.completed || trade.cancelled {
            return Err(StoreError::Inconsistent(format!(
                "trade {} must be complete with a positive amount",
                trade.trade_id
            ))
            .into());
        }

        let buy = self.trade_leg(staged, trade, Side::BUY)?;
        let sell = self.trade_leg(staged, trade, Side::SELL)?;

        if trade.price < sell.price || trade.price > buy.price {
            return Err(OrderError::InvalidState {
                order_id: buy.order_id,
                reason: format!(
                    "trade price {} outside [{}, {}]",
                    trade.price, sell.price, buy.price
                ),
            }
            .into());
        }
        Ok(())
    }

    fn trade_leg<'a>(
        &'a self,
        staged: &'a Staged,
        trade: &Trade,
        side: Side,
    ) -> Result<&'a Order, OrderError> {
        let (order_id, owner) = match side {
            Side::BUY => (trade.buy_order_id, &trade.buyer),
            Side::SELL => (trade.sell_order_id, &trade.seller),
        };
        let order = staged
            .order(self, order_id)
            .ok_or(OrderError::NotFound { order_id })?;
        if order.side != side || &order.owner != owner {
            return Err(OrderError::InvalidState {
                order_id,
                reason: format!("not the {} leg of trade {}", side, trade.trade_id),
            });
        }
        Ok(order)
    }

    fn install(&mut self, staged: Staged) {
        for (order_id, order) in staged.orders {
            let was_active = self.orders.get(&order_id).map_or(false, |o| o.active);
            match (was_active, order.active) {
                (false, true) => self.active_orders += 1,
                (true, false) => self.active_orders -= 1,
                _ => {}
            }
            self.orders.insert(order_id, order);
        }
        for trade in staged.trades {
            self.trades.insert(trade.trade_id, trade);
        }
        self.next_order_id = staged.next_order_id;
        self.next_trade_id = staged.next_trade_id;
        self.last_timestamp = staged.last_timestamp;
        self.commits += 1;
    }

    // ── Single-operation mutators ───────────────────────────────────

    /// Insert a new active order, returning its identifier
    pub fn create_order(
        &mut self,
        owner: OwnerId,
        amount: EnergyAmount,
        price: Price,
        side: Side,
        timestamp: i64,
    ) -> Result<OrderId, EngineError> {
        let order_id = self.next_order_id;
        let order = Order::new(order_id, owner, side, price, amount, timestamp);

        let mut batch = LedgerBatch::new(BatchKind::Direct, timestamp);
        batch.push(LedgerMutation::OrderCreated(order));
        self.commit(&batch)?;
        Ok(order_id)
    }

    /// Move an active order to a new remaining amount / active flag
    ///
    /// A lower remaining amount counts as a fill and is rejected unless
    /// trades in the same commit account for it, so on its own this can
    /// only close an order. The engine writes the same transition as part
    /// of its submission and cancellation batches.
    #[cfg(test)]
    pub(crate) fn set_order_state(
        &mut self,
        order_id: OrderId,
        new_remaining: EnergyAmount,
        new_active: bool,
    ) -> Result<(), EngineError> {
        let mut batch = LedgerBatch::new(BatchKind::Direct, self.last_timestamp);
        batch.push(LedgerMutation::OrderUpdated {
            order_id,
            remaining: new_remaining,
            active: new_active,
            reason: CloseReason::Cancelled,
        });
        self.commit(&batch)?;
        Ok(())
    }

    /// Execute a trade between two active orders
    ///
    /// Both legs are filled by `amount` in the same commit as the trade.
    /// The amount may not exceed either remaining amount and the price must
    /// lie between the sell and buy limits. The older of the two orders is
    /// taken as the maker.
    pub fn record_trade(
        &mut self,
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        amount: EnergyAmount,
        price: Price,
        timestamp: i64,
    ) -> Result<TradeId, EngineError> {
        let buy = self.get_order(buy_order_id)?;
        let sell = self.get_order(sell_order_id)?;
        let mut updates = Vec::with_capacity(2);
        for order in [buy, sell] {
            if !order.active {
                return Err(OrderError::InvalidState {
                    order_id: order.order_id,
                    reason: "order is inactive".into(),
                }
                .into());
            }
            let remaining = order.energy_amount.checked_sub(amount).ok_or_else(|| {
                OrderError::InvalidState {
                    order_id: order.order_id,
                    reason: format!("trade of {} exceeds remaining {}", amount, order.energy_amount),
                }
            })?;
            updates.push(LedgerMutation::OrderUpdated {
                order_id: order.order_id,
                remaining,
                active: !remaining.is_zero(),
                reason: CloseReason::Filled,
            });
        }

        let maker_side = if buy.order_id < sell.order_id {
            Side::BUY
        } else {
            Side::SELL
        };
        let trade_id = self.next_trade_id;
        let trade = Trade::new(
            trade_id,
            buy_order_id,
            sell_order_id,
            buy.owner.clone(),
            sell.owner.clone(),
            amount,
            price,
            timestamp,
            maker_side,
        );

        let mut batch = LedgerBatch::new(BatchKind::Direct, timestamp);
        for update in updates {
            batch.push(update);
        }
        batch.push(LedgerMutation::TradeRecorded(trade));
        self.commit(&batch)?;
        Ok(trade_id)
    }
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

// ── Replay ──────────────────────────────────────────────────────────

struct Replayer<'a> {
    store: &'a mut LedgerStore,
    batches: Vec<LedgerBatch>,
}

impl JournalApplier for Replayer<'_> {
    fn apply(&mut self, entry: &JournalEntry) -> Result<(), String> {
        let batch = decode_batch(&entry.payload).map_err(|e| e.to_string())?;
        let staged = self.store.stage(&batch).map_err(|e| e.to_string())?;
        self.store.install(staged);
        self.batches.push(batch);
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
