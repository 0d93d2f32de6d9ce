//! Order lifecycle types
//!
//! An order is created active with its full amount remaining. From then on
//! the remaining amount only decreases (fills), and once the order turns
//! inactive it is terminal: no fill, no reactivation, no amount change.

use crate::errors::OrderError;
use crate::ids::{OrderId, OwnerId};
use crate::numeric::{EnergyAmount, Notional, Price};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order side (buyer or seller of energy)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    BUY,
    /// Sell order (ask)
    SELL,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }

    /// Map the contract's `isBuyOrder` flag
    pub fn from_is_buy(is_buy_order: bool) -> Self {
        if is_buy_order {
            Side::BUY
        } else {
            Side::SELL
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Side::BUY)
    }
}

impl FromStr for Side {
    type Err = OrderError;

    /// Accepts `buy`/`sell` and the transport's `buyer`/`seller` user types
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "buyer" | "bid" => Ok(Side::BUY),
            "sell" | "seller" | "ask" => Ok(Side::SELL),
            other => Err(OrderError::InvalidSide(other.to_string())),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::BUY => f.write_str("BUY"),
            Side::SELL => f.write_str("SELL"),
        }
    }
}

/// Why an order stopped being active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    /// Remaining amount reached zero through fills
    Filled,
    /// Cancelled by its owner
    Cancelled,
    /// Cancelled by the engine's anti-self-trade policy
    SelfTradePrevented,
}

/// Complete order record as held by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub owner: OwnerId,
    pub side: Side,
    pub price: Price,
    /// Amount at creation
    pub original_amount: EnergyAmount,
    pub filled_amount: EnergyAmount,
    /// Remaining amount; frozen (not zeroed) on cancellation
    pub energy_amount: EnergyAmount,
    pub timestamp: i64, // Unix nanos
    pub active: bool,
    pub close_reason: Option<CloseReason>,
    pub version: u64,
}

impl Order {
    /// Create a new active order with its full amount remaining
    pub fn new(
        order_id: OrderId,
        owner: OwnerId,
        side: Side,
        price: Price,
        amount: EnergyAmount,
        timestamp: i64,
    ) -> Self {
        Self {
            order_id,
            owner,
            side,
            price,
            original_amount: amount,
            filled_amount: EnergyAmount::ZERO,
            energy_amount: amount,
            timestamp,
            active: true,
            close_reason: None,
            version: 0,
        }
    }

    /// Check quantity and lifecycle invariants
    pub fn check_invariant(&self) -> bool {
        let conserved =
            self.filled_amount.checked_add(self.energy_amount) == Some(self.original_amount);
        let live = if self.active {
            !self.energy_amount.is_zero() && self.close_reason.is_none()
        } else {
            self.close_reason.is_some()
        };
        conserved && live
    }

    pub fn is_filled(&self) -> bool {
        self.energy_amount.is_zero()
    }

    pub fn has_fills(&self) -> bool {
        !self.filled_amount.is_zero()
    }

    /// Value of the remaining amount at this order's limit price
    pub fn remaining_notional(&self) -> Notional {
        self.energy_amount.notional_at(self.price)
    }

    /// Check that moving to (`remaining`, `active`) is a legal transition
    pub fn validate_transition(
        &self,
        remaining: EnergyAmount,
        active: bool,
    ) -> Result<(), OrderError> {
        if !self.active {
            return Err(self.invalid_state("order is inactive"));
        }
        if remaining > self.energy_amount {
            return Err(self.invalid_state(&format!(
                "remaining amount cannot grow from {} to {}",
                self.energy_amount, remaining
            )));
        }
        if remaining.is_zero() && active {
            return Err(self.invalid_state("an order with nothing remaining cannot stay active"));
        }
        if active && remaining == self.energy_amount {
            return Err(self.invalid_state("transition changes nothing"));
        }
        Ok(())
    }

    /// Move to a new remaining amount / active flag
    ///
    /// The difference between the current and new remaining amount is booked
    /// as filled. `reason` is recorded when the order turns inactive.
    pub fn transition(
        &mut self,
        remaining: EnergyAmount,
        active: bool,
        reason: CloseReason,
    ) -> Result<(), OrderError> {
        self.validate_transition(remaining, active)?;

        let filled_now = self
            .energy_amount
            .checked_sub(remaining)
            .ok_or_else(|| self.invalid_state("fill exceeds remaining amount"))?;

        self.filled_amount = self
            .filled_amount
            .checked_add(filled_now)
            .ok_or_else(|| self.invalid_state("filled amount overflow"))?;
        self.energy_amount = remaining;
        if !active {
            self.active = false;
            self.close_reason = Some(reason);
        }
        self.version += 1;

        debug_assert!(self.check_invariant(), "Invariant violated after transition");
        Ok(())
    }

    /// Book a fill against this order
    pub fn apply_fill(&mut self, fill: EnergyAmount) -> Result<(), OrderError> {
        if fill.is_zero() {
            return Err(self.invalid_state("fill amount must be positive"));
        }
        let remaining = self
            .energy_amount
            .checked_sub(fill)
            .ok_or_else(|| self.invalid_state("fill would exceed order amount"))?;
        self.transition(remaining, !remaining.is_zero(), CloseReason::Filled)
    }

    /// Cancel the order, freezing its remaining amount
    pub fn deactivate(&mut self, reason: CloseReason) -> Result<(), OrderError> {
        if !self.active {
            return Err(OrderError::AlreadyInactive { order_id: self.order_id });
        }
        self.transition(self.energy_amount, false, reason)
    }

    fn invalid_state(&self, reason: &str) -> OrderError {
        OrderError::InvalidState {
            order_id: self.order_id,
            reason: reason.to_string(),
        }
    }
}
