//! Settlement accounting
//!
//! Per-participant commitments and traded totals. Each ledger batch is
//! staged against the view before the ledger commits it, so a batch whose
//! totals would not fit is refused while nothing has been written yet.
//! `rebuild` recomputes the same view from a full ledger scan and is the
//! reference `verify` checks against.

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;
use types::account::ParticipantAccount;
use types::errors::StoreError;
use types::ids::{OrderId, OwnerId};
use types::order::{CloseReason, Order, Side};

use crate::ledger::{LedgerBatch, LedgerMutation, LedgerStore};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("settlement view diverged from ledger for owner {owner}")]
    Diverged { owner: OwnerId },

    #[error("settlement cannot be derived from ledger: {0}")]
    Ledger(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementBook {
    accounts: BTreeMap<OwnerId, ParticipantAccount>,
}

/// Updated accounts for the owners one batch touches
#[derive(Debug, Default)]
pub struct StagedSettlement {
    accounts: BTreeMap<OwnerId, ParticipantAccount>,
}

impl SettlementBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full scan of the ledger
    pub fn rebuild(store: &LedgerStore) -> Result<Self, StoreError> {
        let mut book = Self::new();
        for order in store.orders() {
            let account = book.accounts.entry(order.owner.clone()).or_default();
            if order.active {
                account.commit(order.side, order.energy_amount, order.price)?;
            }
        }
        for trade in store.trades() {
            let value = trade.notional();
            book.accounts
                .entry(trade.buyer.clone())
                .or_default()
                .record_trade(Side::BUY, trade.energy_amount, value)?;
            book.accounts
                .entry(trade.seller.clone())
                .or_default()
                .record_trade(Side::SELL, trade.energy_amount, value)?;
        }
        Ok(book)
    }

    /// Compute the accounts `batch` leaves behind without changing the view
    ///
    /// `store` must not contain the batch yet: orders created by the batch
    /// are read from the batch itself. Fills that exhaust an order are
    /// settled through their trades; any other deactivation releases the
    /// frozen remaining amount.
    pub fn stage(
        &self,
        batch: &LedgerBatch,
        store: &LedgerStore,
    ) -> Result<StagedSettlement, StoreError> {
        let mut created: BTreeMap<OrderId, &Order> = BTreeMap::new();
        let mut staged = StagedSettlement::default();

        for mutation in &batch.mutations {
            match mutation {
                LedgerMutation::OrderCreated(order) => {
                    created.insert(order.order_id, order);
                    self.staged_account(&mut staged, &order.owner).commit(
                        order.side,
                        order.original_amount,
                        order.price,
                    )?;
                }
                LedgerMutation::TradeRecorded(trade) => {
                    let buy = lookup(&created, store, trade.buy_order_id)?;
                    let sell = lookup(&created, store, trade.sell_order_id)?;
                    let value = trade.notional();

                    let buyer = self.staged_account(&mut staged, &trade.buyer);
                    buyer.release(Side::BUY, trade.energy_amount, buy.price)?;
                    buyer.record_trade(Side::BUY, trade.energy_amount, value)?;

                    let seller = self.staged_account(&mut staged, &trade.seller);
                    seller.release(Side::SELL, trade.energy_amount, sell.price)?;
                    seller.record_trade(Side::SELL, trade.energy_amount, value)?;

                    debug!(
                        trade_id = %trade.trade_id,
                        buyer = %trade.buyer,
                        seller = %trade.seller,
                        "trade settled"
                    );
                }
                LedgerMutation::OrderUpdated {
                    order_id,
                    remaining,
                    active: false,
                    reason,
                } if *reason != CloseReason::Filled => {
                    let order = lookup(&created, store, *order_id)?;
                    self.staged_account(&mut staged, &order.owner)
                        .release(order.side, *remaining, order.price)?;
                }
                LedgerMutation::OrderUpdated { .. } => {}
            }
        }
        Ok(staged)
    }

    /// Replace the touched accounts with their staged state
    pub fn install(&mut self, staged: StagedSettlement) {
        self.accounts.extend(staged.accounts);
    }

    /// Stage and install in one step
    pub fn apply(&mut self, batch: &LedgerBatch, store: &LedgerStore) -> Result<(), StoreError> {
        let staged = self.stage(batch, store)?;
        self.install(staged);
        Ok(())
    }

    /// Compare against a fresh rebuild
    pub fn verify(&self, store: &LedgerStore) -> Result<(), SettlementError> {
        let expected = Self::rebuild(store)?;

        let owners = self.accounts.keys().chain(expected.accounts.keys());
        for owner in owners {
            if self.accounts.get(owner) != expected.accounts.get(owner) {
                return Err(SettlementError::Diverged {
                    owner: owner.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn account(&self, owner: &OwnerId) -> Option<&ParticipantAccount> {
        self.accounts.get(owner)
    }

    /// Accounts in owner order
    pub fn accounts(&self) -> impl Iterator<Item = (&OwnerId, &ParticipantAccount)> {
        self.accounts.iter()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn staged_account<'a>(
        &self,
        staged: &'a mut StagedSettlement,
        owner: &OwnerId,
    ) -> &'a mut ParticipantAccount {
        staged
            .accounts
            .entry(owner.clone())
            .or_insert_with(|| self.accounts.get(owner).cloned().unwrap_or_default())
    }
}

fn lookup<'a>(
    created: &BTreeMap<OrderId, &'a Order>,
    store: &'a LedgerStore,
    order_id: OrderId,
) -> Result<&'a Order, StoreError> {
    match created.get(&order_id) {
        Some(order) => Ok(*order),
        None => store
            .get_order(order_id)
            .map_err(|e| StoreError::Inconsistent(e.to_string())),
    }
}
