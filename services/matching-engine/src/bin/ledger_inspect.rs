//! Rebuild a journal-backed market and print its state as JSON
//!
//! The journal is opened read-only: a torn tail is reported in the log and
//! left on disk for the next regular start to repair.

use anyhow::{bail, Context, Result};
use matching_engine::book::BookDepth;
use matching_engine::{EnergyMarket, EngineConfig};
use rust_decimal::Decimal;
use serde::Serialize;
use types::account::ParticipantAccount;
use types::ids::OwnerId;

#[derive(Serialize)]
struct AccountReport {
    owner: OwnerId,
    #[serde(flatten)]
    account: ParticipantAccount,
    average_buy_price: Option<Decimal>,
    average_sell_price: Option<Decimal>,
}

#[derive(Serialize)]
struct LedgerReport {
    journal: String,
    state_hash: String,
    orders: usize,
    trades: usize,
    active_orders: usize,
    feed_sequence: u64,
    settlement_consistent: bool,
    depth: BookDepth,
    accounts: Vec<AccountReport>,
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the report
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = EngineConfig::from_env().context("invalid configuration")?;
    let journal = match &config.journal {
        Some(settings) => settings.dir.display().to_string(),
        None => bail!("LEDGER_JOURNAL_DIR must point at a ledger journal"),
    };

    let market = EnergyMarket::open_read_only(config).context("failed to rebuild ledger")?;
    let settlement_consistent = market.reconcile().is_ok();

    let (orders, trades, feed_sequence) = market.read(|engine| {
        (
            engine.store().order_count(),
            engine.store().trade_count(),
            engine.feed().last_sequence(),
        )
    });

    let accounts = market
        .accounts()
        .into_iter()
        .map(|(owner, account)| AccountReport {
            average_buy_price: account.average_buy_price(),
            average_sell_price: account.average_sell_price(),
            owner,
            account,
        })
        .collect();

    let report = LedgerReport {
        journal,
        state_hash: market.state_hash()?,
        orders,
        trades,
        active_orders: market.get_active_orders_count(),
        feed_sequence,
        settlement_consistent,
        depth: market.depth(),
        accounts,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
