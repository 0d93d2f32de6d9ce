//! Trade construction
//!
//! Turns a (taker, maker, amount) match into a trade record at the maker's
//! price, handing out trade ids from the ledger's next free id.

use types::ids::TradeId;
use types::numeric::EnergyAmount;
use types::order::{Order, Side};
use types::trade::Trade;

pub struct MatchExecutor {
    next_trade_id: TradeId,
}

impl MatchExecutor {
    /// Start handing out ids at `next_trade_id`
    pub fn new(next_trade_id: TradeId) -> Self {
        Self { next_trade_id }
    }

    fn take_trade_id(&mut self) -> TradeId {
        let id = self.next_trade_id;
        self.next_trade_id = id.next();
        id
    }

    /// Amount a match between two orders can fill
    pub fn fill_amount(taker: &Order, maker: &Order) -> EnergyAmount {
        taker.energy_amount.min(maker.energy_amount)
    }

    /// Build the trade for `taker` consuming `amount` of resting `maker`
    ///
    /// The execution price is always the maker's limit price.
    pub fn execute(
        &mut self,
        taker: &Order,
        maker: &Order,
        amount: EnergyAmount,
        timestamp: i64,
    ) -> Trade {
        let (buy, sell) = match taker.side {
            Side::BUY => (taker, maker),
            Side::SELL => (maker, taker),
        };

        Trade::new(
            self.take_trade_id(),
            buy.order_id,
            sell.order_id,
            buy.owner.clone(),
            sell.owner.clone(),
            amount,
            maker.price,
            timestamp,
            maker.side,
        )
    }

    pub fn next_trade_id(&self) -> TradeId {
        self.next_trade_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{OrderId, OwnerId};
    use types::numeric::Price;

    fn order(id: u64, owner: &str, side: Side, price: u64, amount: u64) -> Order {
        Order::new(
            OrderId::new(id),
            OwnerId::new(owner),
            side,
            Price::from_u64(price),
            EnergyAmount::from_u64(amount),
            id as i64,
        )
    }

    #[test]
    fn test_buy_taker_pays_ask_price() {
        let maker = order(1, "alice", Side::SELL, 90, 10);
        let taker = order(2, "bob", Side::BUY, 100, 10);
        let mut executor = MatchExecutor::new(TradeId::FIRST);

        let trade = executor.execute(&taker, &maker, EnergyAmount::from_u64(10), 5);
        assert_eq!(trade.price, Price::from_u64(90));
        assert_eq!(trade.buy_order_id, OrderId::new(2));
        assert_eq!(trade.sell_order_id, OrderId::new(1));
        assert_eq!(trade.buyer, OwnerId::new("bob"));
        assert_eq!(trade.maker_side, Side::SELL);
    }

    #[test]
    fn test_sell_taker_receives_bid_price() {
        let maker = order(1, "alice", Side::BUY, 110, 4);
        let taker = order(2, "bob", Side::SELL, 100, 10);
        let mut executor = MatchExecutor::new(TradeId::FIRST);

        let amount = MatchExecutor::fill_amount(&taker, &maker);
        assert_eq!(amount, EnergyAmount::from_u64(4));

        let trade = executor.execute(&taker, &maker, amount, 5);
        assert_eq!(trade.price, Price::from_u64(110));
        assert_eq!(trade.seller, OwnerId::new("bob"));
        assert_eq!(trade.maker_side, Side::BUY);
    }

    #[test]
    fn test_trade_ids_sequential() {
        let maker = order(1, "alice", Side::SELL, 90, 10);
        let taker = order(2, "bob", Side::BUY, 100, 10);
        let mut executor = MatchExecutor::new(TradeId::new(41));

        let t1 = executor.execute(&taker, &maker, EnergyAmount::from_u64(1), 5);
        let t2 = executor.execute(&taker, &maker, EnergyAmount::from_u64(1), 5);
        assert_eq!(t1.trade_id, TradeId::new(41));
        assert_eq!(t2.trade_id, TradeId::new(42));
        assert_eq!(executor.next_trade_id(), TradeId::new(43));
    }
}
