use std::path::PathBuf;

use clap::Parser;
use itertools::Itertools;
use tracing_subscriber::prelude::*;

use utxo_ledger::chain::{SignedTransaction, StaticChainBackend};
use utxo_ledger::config::WalletConfig;
use utxo_ledger::UtxoEngine;

#[derive(Parser, Debug)]
#[clap(version)]
pub struct Cli {
    /// path to config file
    #[clap(long, value_parser)]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let result = _main().await;
    result.unwrap();
}

async fn _main() -> anyhow::Result<()> {
    // Start logging setup block
    let fmt_layer = tracing_subscriber::fmt::layer().with_test_writer();

    tracing_subscriber::registry().with(fmt_layer).init();

    let Cli { config_path } = Cli::parse();

    tracing::info!("Config file {:?}", config_path);
    let config = WalletConfig::load(&config_path)?;

    let backend = StaticChainBackend::new(
        config.chain.name(),
        config.sharding(),
        config.self_address.clone(),
    );
    let fixtures = backend.load_fixtures(&config.fixtures_path)?;
    tracing::info!(
        "{} fixture outputs loaded from {:?}",
        fixtures,
        config.fixtures_path
    );

    let engine = UtxoEngine::new(backend, config.selection);
    let addresses = config.sync_addresses();
    let stats = engine.sync(&addresses).await?;
    if !stats.is_complete() {
        tracing::warn!("{} addresses could not be fetched", stats.failed_fetches.len());
    }
    tracing::info!("balance after sync: {}", engine.balance()?);

    if let Some(payment) = config.payment.as_ref() {
        let plan = engine.select(payment.amount, &payment.recipient)?;
        engine.validate(&plan)?;
        tracing::info!(
            "plan {} spends {}",
            plan.id,
            plan.input_ids().iter().join(", ")
        );

        // there is no signer here, the spent identifiers stand in for the signed body
        let signed = SignedTransaction::new(plan.input_ids().iter().join(",").into_bytes());
        let transaction_id = engine.broadcast(plan.id, &signed).await?;
        tracing::info!("plan {} broadcast as {}", plan.id, transaction_id);
    }

    for address in addresses.iter() {
        tracing::info!("{}: {}", address, engine.balance_of(address)?);
    }
    tracing::info!(
        "total balance: {}, pending plans: {}",
        engine.balance()?,
        engine.pending_plans()?.len()
    );

    if let Some(snapshot_path) = config.snapshot_path {
        let written = engine.dump_snapshot(snapshot_path.clone())?;
        tracing::info!("{} outputs written to {:?}", written, snapshot_path);
    }
    if let Some(stats_path) = config.stats_path {
        stats.dump_stats(stats_path)?;
    }

    Ok(())
}
