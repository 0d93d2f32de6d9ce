//! Per-participant settlement view
//!
//! Tracks what a participant has committed on the book (active orders) and
//! what they have actually exchanged (trades). The view is derived: it can
//! always be recomputed from orders and trades.

use crate::errors::StoreError;
use crate::numeric::{EnergyAmount, Notional, Price};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Settlement totals for one participant
///
/// Invariant: committed amounts and reserved/expected notionals only cover
/// the remaining amount of the participant's *active* orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantAccount {
    /// Remaining kWh across active buy orders
    pub committed_demand: EnergyAmount,
    /// Remaining kWh across active sell orders
    pub committed_supply: EnergyAmount,
    /// Remaining buy amount valued at each order's limit price
    pub reserved_cost: Notional,
    /// Remaining sell amount valued at each order's limit price
    pub expected_proceeds: Notional,

    pub bought_volume: EnergyAmount,
    pub bought_notional: Notional,
    pub sold_volume: EnergyAmount,
    pub sold_notional: Notional,
    pub trade_count: u64,
}

impl ParticipantAccount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a newly resting amount at its limit price
    ///
    /// Leaves the account untouched when either total would overflow.
    pub fn commit(
        &mut self,
        side: Side,
        amount: EnergyAmount,
        limit: Price,
    ) -> Result<(), StoreError> {
        let value = amount.notional_at(limit);
        let (committed, notional) = match side {
            Side::BUY => (&mut self.committed_demand, &mut self.reserved_cost),
            Side::SELL => (&mut self.committed_supply, &mut self.expected_proceeds),
        };

        let new_committed = committed
            .checked_add(amount)
            .ok_or_else(|| overflow("committed amount", side))?;
        let new_notional = notional
            .checked_add(value)
            .ok_or_else(|| overflow("committed notional", side))?;

        *committed = new_committed;
        *notional = new_notional;
        Ok(())
    }

    /// Release part of a commitment (fill or cancellation)
    pub fn release(
        &mut self,
        side: Side,
        amount: EnergyAmount,
        limit: Price,
    ) -> Result<(), StoreError> {
        let value = amount.notional_at(limit);
        let (committed, notional) = match side {
            Side::BUY => (&mut self.committed_demand, &mut self.reserved_cost),
            Side::SELL => (&mut self.committed_supply, &mut self.expected_proceeds),
        };

        let new_committed = committed.checked_sub(amount).ok_or_else(|| {
            StoreError::Inconsistent(format!(
                "release of {} exceeds committed {} on {} side",
                amount, committed, side
            ))
        })?;
        let new_notional = notional.checked_sub(value).ok_or_else(|| {
            StoreError::Inconsistent(format!(
                "release of {} exceeds committed notional {} on {} side",
                value, notional, side
            ))
        })?;

        *committed = new_committed;
        *notional = new_notional;
        Ok(())
    }

    /// Record one side of an executed trade
    pub fn record_trade(
        &mut self,
        side: Side,
        amount: EnergyAmount,
        value: Notional,
    ) -> Result<(), StoreError> {
        let (volume, notional) = match side {
            Side::BUY => (&mut self.bought_volume, &mut self.bought_notional),
            Side::SELL => (&mut self.sold_volume, &mut self.sold_notional),
        };

        let new_volume = volume
            .checked_add(amount)
            .ok_or_else(|| overflow("traded volume", side))?;
        let new_notional = notional
            .checked_add(value)
            .ok_or_else(|| overflow("traded notional", side))?;
        let new_count = self
            .trade_count
            .checked_add(1)
            .ok_or_else(|| overflow("trade count", side))?;

        *volume = new_volume;
        *notional = new_notional;
        self.trade_count = new_count;
        Ok(())
    }

    /// Volume-weighted average purchase price, None before the first purchase
    pub fn average_buy_price(&self) -> Option<Decimal> {
        average_price(self.bought_notional, self.bought_volume)
    }

    /// Volume-weighted average sale price, None before the first sale
    pub fn average_sell_price(&self) -> Option<Decimal> {
        average_price(self.sold_notional, self.sold_volume)
    }

    /// Net energy received (bought minus sold), in kWh
    pub fn net_energy(&self) -> i128 {
        self.bought_volume.kwh() as i128 - self.sold_volume.kwh() as i128
    }

    pub fn has_open_commitments(&self) -> bool {
        !self.committed_demand.is_zero() || !self.committed_supply.is_zero()
    }
}

fn overflow(total: &str, side: Side) -> StoreError {
    StoreError::Overflow(format!("{} on {} side", total, side))
}

fn average_price(notional: Notional, volume: EnergyAmount) -> Option<Decimal> {
    if volume.is_zero() {
        return None;
    }
    let notional = i128::try_from(notional.value()).ok()?;
    let notional = Decimal::try_from_i128_with_scale(notional, 0).ok()?;
    notional.checked_div(Decimal::from(volume.kwh()))
}
