//! Atomicity and recovery tests
//!
//! A failing log must leave every view of the ledger untouched, and a
//! journal-backed market must come back from disk with the same ledger,
//! settlement and feed it had before the restart.

use matching_engine::ledger::{LedgerBatch, LedgerLog};
use matching_engine::{
    EnergyMarket, EngineConfig, FeedError, JournalSettings, LedgerStore, ManualClock, MatchingEngine,
    NewOrder,
};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use types::errors::{ErrorKind, StoreError};
use types::ids::{OrderId, OwnerId};
use types::numeric::Price;
use types::order::Side;

const T0: i64 = 1_708_123_456_789_000_000;

/// Accepts batches until switched to failing
struct SwitchLog {
    failing: Arc<AtomicBool>,
}

impl LedgerLog for SwitchLog {
    fn append(&mut self, _batch: &LedgerBatch) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Write("device unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn describe(&self) -> String {
        "switch".to_string()
    }
}

fn order(owner: &str, side: Side, amount: i128, price: i128) -> NewOrder {
    NewOrder::try_new(owner, amount, price, side).unwrap()
}

fn journal_config(dir: &TempDir) -> EngineConfig {
    EngineConfig::default().with_journal(JournalSettings::new(dir.path()))
}

fn open(dir: &TempDir) -> EnergyMarket {
    EnergyMarket::open_with_clock(journal_config(dir), Arc::new(ManualClock::new(T0))).unwrap()
}

#[test]
fn failed_commit_leaves_no_trace() {
    let failing = Arc::new(AtomicBool::new(false));
    let store = LedgerStore::with_log(Box::new(SwitchLog {
        failing: failing.clone(),
    }));
    let mut engine =
        MatchingEngine::from_store(store, EngineConfig::default(), Arc::new(ManualClock::new(T0)))
            .unwrap();

    engine.submit_order(order("alice", Side::SELL, 5, 90)).unwrap();
    engine.submit_order(order("carol", Side::SELL, 5, 95)).unwrap();

    let hash = engine.state_hash().unwrap();
    let depth = engine.depth();
    let feed_sequence = engine.feed().last_sequence();
    let alice = engine.account(&OwnerId::new("alice")).cloned();

    failing.store(true, Ordering::SeqCst);
    let err = engine
        .submit_order(order("bob", Side::BUY, 8, 100))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreFailure);

    assert_eq!(engine.state_hash().unwrap(), hash);
    assert_eq!(engine.depth(), depth);
    assert_eq!(engine.count_active_orders(), 2);
    assert_eq!(engine.feed().last_sequence(), feed_sequence);
    assert_eq!(engine.account(&OwnerId::new("alice")).cloned(), alice);
    assert!(engine.account(&OwnerId::new("bob")).is_none());
    assert_eq!(engine.store().trade_count(), 0);

    // Identifiers of the failed submission are reused once the log recovers
    failing.store(false, Ordering::SeqCst);
    let receipt = engine.submit_order(order("bob", Side::BUY, 8, 100)).unwrap();
    assert_eq!(receipt.order_id, OrderId::new(3));
    assert_eq!(receipt.trade_ids.len(), 2);
    assert!(engine.settlement().verify(engine.store()).is_ok());
}

#[test]
fn failed_cancel_keeps_order_resting() {
    let failing = Arc::new(AtomicBool::new(false));
    let store = LedgerStore::with_log(Box::new(SwitchLog {
        failing: failing.clone(),
    }));
    let mut engine =
        MatchingEngine::from_store(store, EngineConfig::default(), Arc::new(ManualClock::new(T0)))
            .unwrap();
    let receipt = engine.submit_order(order("alice", Side::BUY, 5, 90)).unwrap();

    failing.store(true, Ordering::SeqCst);
    let err = engine
        .cancel_order(receipt.order_id, &OwnerId::new("alice"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreFailure);
    assert!(engine.get_order(receipt.order_id).unwrap().active);
    assert_eq!(engine.book().best_bid(), Some(Price::from_u64(90)));
}

#[test]
fn journal_restores_ledger_and_feed() {
    let dir = TempDir::new().unwrap();
    let alice = OwnerId::new("alice");

    let (hash, accounts, history) = {
        let market = open(&dir);
        let resting = market.submit(order("alice", Side::SELL, 10, 90)).unwrap();
        market.submit(order("carol", Side::SELL, 5, 95)).unwrap();
        market.submit(order("bob", Side::BUY, 12, 100)).unwrap();
        market.submit(order("dave", Side::BUY, 4, 80)).unwrap();
        market.cancel_order(resting.order_id, &alice).unwrap_err();
        market.sync().unwrap();

        let history = market.read(|engine| engine.feed().history());
        (market.state_hash().unwrap(), market.accounts(), history)
    };

    let market = open(&dir);
    assert_eq!(market.state_hash().unwrap(), hash);
    assert_eq!(market.accounts(), accounts);
    assert_eq!(market.get_active_orders_count(), 2);
    assert!(market.reconcile().is_ok());

    let replayed = market.subscribe_from(1).unwrap().drain();
    assert_eq!(replayed, history);

    // New submissions continue the identifier sequences
    let receipt = market.submit(order("erin", Side::SELL, 4, 80)).unwrap();
    assert_eq!(receipt.order_id, OrderId::new(5));
    let trade = market.get_trade(receipt.trade_ids[0]).unwrap();
    assert_eq!(trade.trade_id.value(), 3);
    assert_eq!(trade.price, Price::from_u64(80));
}

#[test]
fn torn_tail_is_dropped_on_recovery() {
    let dir = TempDir::new().unwrap();

    let hash = {
        let market = open(&dir);
        market.submit(order("alice", Side::SELL, 10, 90)).unwrap();
        market.submit(order("bob", Side::BUY, 3, 95)).unwrap();
        market.state_hash().unwrap()
    };

    // Simulate a crash in the middle of writing the next entry
    let files = persistence::list_journal_files(dir.path()).unwrap();
    let last = files.last().unwrap();
    let mut file = OpenOptions::new().append(true).open(last).unwrap();
    file.write_all(&[0x40, 0, 0, 0, 7, 7, 7]).unwrap();
    drop(file);

    let market = open(&dir);
    assert_eq!(market.state_hash().unwrap(), hash);

    market.submit(order("carol", Side::BUY, 2, 95)).unwrap();
    let hash = market.state_hash().unwrap();
    drop(market);

    // The truncated tail does not poison later recoveries
    let market = open(&dir);
    assert_eq!(market.state_hash().unwrap(), hash);
    assert_eq!(market.get_active_orders_count(), 1);
}

#[test]
fn read_only_open_leaves_torn_tail_on_disk() {
    let dir = TempDir::new().unwrap();

    let hash = {
        let market = open(&dir);
        market.submit(order("alice", Side::SELL, 10, 90)).unwrap();
        market.submit(order("bob", Side::BUY, 3, 95)).unwrap();
        market.state_hash().unwrap()
    };

    let files = persistence::list_journal_files(dir.path()).unwrap();
    let last = files.last().unwrap().clone();
    let mut file = OpenOptions::new().append(true).open(&last).unwrap();
    file.write_all(&[0x40, 0, 0, 0, 7, 7, 7]).unwrap();
    drop(file);
    let torn_len = std::fs::metadata(&last).unwrap().len();

    let inspected = EnergyMarket::open_read_only(journal_config(&dir)).unwrap();
    assert_eq!(inspected.state_hash().unwrap(), hash);
    assert_eq!(inspected.get_active_orders_count(), 1);
    drop(inspected);
    assert_eq!(std::fs::metadata(&last).unwrap().len(), torn_len);
    assert_eq!(persistence::list_journal_files(dir.path()).unwrap(), files);

    // A regular open still repairs the tail
    let market = open(&dir);
    assert_eq!(market.state_hash().unwrap(), hash);
    assert_eq!(std::fs::metadata(&last).unwrap().len(), torn_len - 7);
}

#[test]
fn read_only_commits_do_not_reach_the_journal() {
    let dir = TempDir::new().unwrap();
    let hash = {
        let market = open(&dir);
        market.submit(order("alice", Side::SELL, 10, 90)).unwrap();
        market.state_hash().unwrap()
    };

    let inspected = EnergyMarket::open_read_only(journal_config(&dir)).unwrap();
    inspected.submit(order("bob", Side::BUY, 4, 95)).unwrap();
    drop(inspected);

    let market = open(&dir);
    assert_eq!(market.state_hash().unwrap(), hash);
    assert_eq!(market.get_active_orders_count(), 1);
}

#[test]
fn feed_retention_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = journal_config(&dir).with_feed_retention(2);

    {
        let market =
            EnergyMarket::open_with_clock(config.clone(), Arc::new(ManualClock::new(T0))).unwrap();
        for price in [90, 91, 92, 93] {
            market.submit(order("alice", Side::SELL, 1, price)).unwrap();
        }
    }

    let market = EnergyMarket::open_with_clock(config, Arc::new(ManualClock::new(T0))).unwrap();
    let last = market.read(|engine| engine.feed().last_sequence());
    assert_eq!(last, 4);
    assert!(matches!(
        market.subscribe_from(1),
        Err(FeedError::Evicted { requested: 1, oldest: 3 })
    ));
    let replayed: Vec<u64> = market
        .subscribe_from(3)
        .unwrap()
        .drain()
        .iter()
        .map(|e| e.sequence)
        .collect();
    assert_eq!(replayed, vec![3, 4]);
}

#[test]
fn journal_rotation_preserves_history() {
    let dir = TempDir::new().unwrap();
    let mut settings = JournalSettings::new(dir.path());
    settings.max_file_bytes = 256;
    let config = EngineConfig::default().with_journal(settings);

    let hash = {
        let market =
            EnergyMarket::open_with_clock(config.clone(), Arc::new(ManualClock::new(T0))).unwrap();
        for i in 0..20 {
            let side = if i % 2 == 0 { Side::SELL } else { Side::BUY };
            market.submit(order("p", side, 3, 100 + (i % 3))).unwrap();
        }
        market.state_hash().unwrap()
    };

    assert!(persistence::list_journal_files(dir.path()).unwrap().len() > 1);

    let market = EnergyMarket::open_with_clock(config, Arc::new(ManualClock::new(T0))).unwrap();
    assert_eq!(market.state_hash().unwrap(), hash);
}
