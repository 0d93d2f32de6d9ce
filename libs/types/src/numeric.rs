//! Integer units for energy and prices
//!
//! Energy is counted in whole kWh and prices in the smallest currency unit per
//! kWh (wei for the on-chain deployment). Both are strictly positive on every
//! live order; a zero remaining amount only ever appears on a terminal order,
//! which is why `EnergyAmount` allows zero while `try_new` rejects it.

use crate::errors::OrderError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quantity of energy in kWh
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnergyAmount(u64);

impl EnergyAmount {
    pub const ZERO: EnergyAmount = EnergyAmount(0);

    /// Validated constructor for submitted amounts (must be positive)
    pub fn try_new(kwh: u64) -> Result<Self, OrderError> {
        if kwh == 0 {
            return Err(OrderError::InvalidAmount("energy amount must be positive".into()));
        }
        Ok(Self(kwh))
    }

    /// Validated constructor for signed transport input
    pub fn try_from_i128(kwh: i128) -> Result<Self, OrderError> {
        if kwh <= 0 {
            return Err(OrderError::InvalidAmount(format!(
                "energy amount must be positive, got {}",
                kwh
            )));
        }
        let kwh = u64::try_from(kwh)
            .map_err(|_| OrderError::InvalidAmount(format!("energy amount {} out of range", kwh)))?;
        Ok(Self(kwh))
    }

    /// Unchecked constructor, used for remaining amounts that may reach zero
    pub const fn from_u64(kwh: u64) -> Self {
        Self(kwh)
    }

    pub const fn kwh(&self) -> u64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// Add, returning None on overflow
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Subtract, returning None on underflow
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Notional value of this amount at a given unit price
    pub fn notional_at(self, price: Price) -> Notional {
        Notional(self.0 as u128 * price.0 as u128)
    }
}

impl fmt::Display for EnergyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kWh", self.0)
    }
}

/// Limit or execution price per kWh, in the smallest currency unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(u64);

impl Price {
    pub fn try_new(units: u64) -> Result<Self, OrderError> {
        if units == 0 {
            return Err(OrderError::InvalidPrice("price must be positive".into()));
        }
        Ok(Self(units))
    }

    pub fn try_from_i128(units: i128) -> Result<Self, OrderError> {
        if units <= 0 {
            return Err(OrderError::InvalidPrice(format!(
                "price must be positive, got {}",
                units
            )));
        }
        let units = u64::try_from(units)
            .map_err(|_| OrderError::InvalidPrice(format!("price {} out of range", units)))?;
        Ok(Self(units))
    }

    /// Unchecked constructor for known-good values (tests, replay)
    pub const fn from_u64(units: u64) -> Self {
        Self(units)
    }

    pub const fn units(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value of energy at a price (amount × price)
///
/// A single product always fits; sums of products are only checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Notional(u128);

impl Notional {
    pub const ZERO: Notional = Notional(0);

    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u128 {
        self.0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }
}

impl fmt::Display for Notional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_amount_rejected() {
        assert!(matches!(
            EnergyAmount::try_new(0),
            Err(OrderError::InvalidAmount(_))
        ));
        assert_eq!(EnergyAmount::try_new(10).unwrap().kwh(), 10);
    }

    #[test]
    fn test_negative_inputs_rejected() {
        assert!(matches!(
            EnergyAmount::try_from_i128(-5),
            Err(OrderError::InvalidAmount(_))
        ));
        assert!(matches!(Price::try_from_i128(0), Err(OrderError::InvalidPrice(_))));
        assert!(matches!(Price::try_from_i128(-1), Err(OrderError::InvalidPrice(_))));
        assert_eq!(Price::try_from_i128(90).unwrap(), Price::from_u64(90));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let too_big = u64::MAX as i128 + 1;
        assert!(EnergyAmount::try_from_i128(too_big).is_err());
        assert!(Price::try_from_i128(too_big).is_err());
    }

    #[test]
    fn test_notional_does_not_overflow() {
        let amount = EnergyAmount::from_u64(u64::MAX);
        let notional = amount.notional_at(Price::from_u64(u64::MAX));
        assert_eq!(notional.value(), u64::MAX as u128 * u64::MAX as u128);
    }

    #[test]
    fn test_checked_sub() {
        let ten = EnergyAmount::from_u64(10);
        let four = EnergyAmount::from_u64(4);
        assert_eq!(ten.checked_sub(four), Some(EnergyAmount::from_u64(6)));
        assert_eq!(four.checked_sub(ten), None);
    }

    #[test]
    fn test_checked_add_reports_overflow() {
        let half = EnergyAmount::from_u64(u64::MAX / 2 + 1);
        assert_eq!(half.checked_add(half), None);
        assert_eq!(
            EnergyAmount::from_u64(2).checked_add(EnergyAmount::from_u64(3)),
            Some(EnergyAmount::from_u64(5))
        );

        let big = Notional::from_u128(u128::MAX - 1);
        assert_eq!(big.checked_add(Notional::from_u128(2)), None);
        assert_eq!(
            big.checked_add(Notional::from_u128(1)),
            Some(Notional::from_u128(u128::MAX))
        );
    }
}
