//! Crossing detection
//!
//! A buy at `Pb` and a sell at `Ps` are compatible iff `Pb >= Ps`.

use types::numeric::Price;
use types::order::Side;

/// Check if a bid and an ask can trade
pub fn can_match(bid_price: Price, ask_price: Price) -> bool {
    bid_price >= ask_price
}

/// Check if an incoming order crosses a resting order of the opposite side
pub fn incoming_can_match(incoming_side: Side, incoming_price: Price, resting_price: Price) -> bool {
    match incoming_side {
        Side::BUY => can_match(incoming_price, resting_price),
        Side::SELL => can_match(resting_price, incoming_price),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_match() {
        assert!(can_match(Price::from_u64(100), Price::from_u64(90)));
        assert!(can_match(Price::from_u64(90), Price::from_u64(90)));
        assert!(!can_match(Price::from_u64(89), Price::from_u64(90)));
    }

    #[test]
    fn test_incoming_buy() {
        assert!(incoming_can_match(Side::BUY, Price::from_u64(100), Price::from_u64(95)));
        assert!(!incoming_can_match(Side::BUY, Price::from_u64(94), Price::from_u64(95)));
    }

    #[test]
    fn test_incoming_sell() {
        assert!(incoming_can_match(Side::SELL, Price::from_u64(95), Price::from_u64(100)));
        assert!(incoming_can_match(Side::SELL, Price::from_u64(100), Price::from_u64(100)));
        assert!(!incoming_can_match(Side::SELL, Price::from_u64(101), Price::from_u64(100)));
    }
}
