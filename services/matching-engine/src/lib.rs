//! Energy Matching Service
//!
//! Order matching and settlement core of a peer-to-peer energy market:
//! a continuous double auction with price-time priority, executed at the
//! resting order's price.
//!
//! **Key Invariants:**
//! - Every submission commits as one atomic ledger batch
//! - Deterministic matching (same inputs → same ledger)
//! - Conservation of energy between matched orders
//! - No crossed book after a matching pass
//! - Inactive orders are terminal

pub mod book;
pub mod clock;
pub mod config;
pub mod engine;
pub mod events;
pub mod feed;
pub mod ledger;
pub mod market;
pub mod matching;
pub mod settlement;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig, JournalSettings, SelfTradePolicy};
pub use engine::{MatchingEngine, NewOrder, SubmitReceipt};
pub use events::{FeedEvent, FeedPayload};
pub use feed::{EventFeed, FeedError, FeedSubscription};
pub use ledger::LedgerStore;
pub use market::EnergyMarket;
pub use settlement::{SettlementBook, SettlementError};
