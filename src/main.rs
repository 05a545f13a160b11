//! Anchor Observer CLI
//!
//! Entry point for the observer binary. Provides subcommands for:
//! - `run` - Start the observer (historical catch-up, then live)
//! - `backfill` - Walk an explicit block range once and exit
//! - `version` - Show version information

use std::sync::Arc;
use std::time::Duration;

use alloy::providers::ProviderBuilder;
use clap::{Parser, Subcommand};
use eyre::WrapErr;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use anchor_observer::cas::IpfsCasClient;
use anchor_observer::chain::{EvmChainClient, Paginator, PaginatorConfig};
use anchor_observer::config::{Settings, SyncPreset};
use anchor_observer::observer::{HistoricalSync, Observer, ObserverConfig};
use anchor_observer::ports::{
    CasClient, ChainClient, OperationStore, TransactionStore, UnresolvableTransactionStore,
};
use anchor_observer::processor::CoreProcessor;
use anchor_observer::store::{
    InMemoryOperationStore, InMemoryTransactionStore, InMemoryUnresolvableStore,
};
use anchor_observer::types::{BlockHeight, SyncState};
use anchor_observer::versions::{ProtocolVersion, VersionHandle, VersionRegistry};
use anchor_observer::{VERSION, telemetry};

/// Anchor Observer
#[derive(Parser, Debug)]
#[command(name = "anchor-observer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Environment name (selects config/{environment}.toml)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Apply a bundled tuning preset over the loaded configuration
    #[arg(long, value_enum)]
    preset: Option<SyncPreset>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the observer
    Run,

    /// Walk a block range once and exit
    Backfill {
        /// Starting block number
        #[arg(long)]
        from: u64,

        /// Ending block number
        #[arg(long)]
        to: u64,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        println!("anchor-observer {VERSION}");
        return Ok(());
    }

    let mut settings =
        Settings::load(&cli.environment).wrap_err("failed to load configuration")?;
    if let Some(preset) = cli.preset {
        preset.apply(&mut settings);
    }
    settings
        .validate()
        .map_err(|errors| eyre::eyre!("invalid configuration: {}", errors.join("; ")))?;

    let _log_guard = telemetry::init_tracing(&settings.logging);
    telemetry::init_metrics(&settings.metrics)?;

    info!(version = VERSION, environment = %cli.environment, "starting anchor observer");

    let wiring = wire(&settings).await?;

    match cli.command {
        Commands::Run => run(wiring).await,
        Commands::Backfill { from, to } => backfill(wiring, from, to).await,
        Commands::Version => unreachable!("handled above"),
    }
}

/// Everything the subcommands need, assembled once.
struct Wiring {
    observer: Observer,
    chain: Arc<dyn ChainClient>,
    pagination: PaginatorConfig,
    transaction_store: Arc<dyn TransactionStore>,
    unresolvable_store: Arc<dyn UnresolvableTransactionStore>,
    versions: Arc<VersionRegistry>,
    deployment_block: BlockHeight,
    rate_limit_delay: Duration,
    batch_size: u64,
}

async fn wire(settings: &Settings) -> eyre::Result<Wiring> {
    let anchor_address = settings.anchor_address().map_err(|e| eyre::eyre!(e))?;
    let rpc_url = settings.rpc.url.parse().wrap_err("invalid rpc.url")?;

    let provider = Arc::new(ProviderBuilder::new().connect_http(rpc_url));

    let pagination = PaginatorConfig {
        default_batch_size: settings.observer.pagination.default_batch_size,
        max_batch_size: settings.observer.pagination.max_batch_size,
        max_retries: settings.observer.max_retries,
        retry_delay: settings.observer.retry_delay(),
    };

    let evm_client = EvmChainClient::bootstrap(
        provider,
        anchor_address,
        settings.contract.deployment_block,
        pagination.max_batch_size,
        pagination.default_batch_size,
        settings.rpc.request_timeout(),
    )
    .await
    .wrap_err("failed to bootstrap chain client")?;

    let deployment_block = evm_client.deployment_block();
    info!(%deployment_block, %anchor_address, "chain client ready");

    let chain: Arc<dyn ChainClient> = Arc::new(evm_client);
    let transaction_store: Arc<dyn TransactionStore> = Arc::new(InMemoryTransactionStore::new());
    let operation_store: Arc<dyn OperationStore> = Arc::new(InMemoryOperationStore::new());
    let unresolvable_store: Arc<dyn UnresolvableTransactionStore> =
        Arc::new(InMemoryUnresolvableStore::new());

    let cas: Arc<dyn CasClient> = Arc::new(
        IpfsCasClient::new(&settings.cas.gateway_url, settings.cas.max_file_size_bytes)
            .wrap_err("failed to build CAS client")?,
    );

    let versions = Arc::new(
        VersionRegistry::new(vec![VersionHandle {
            version: ProtocolVersion {
                name: "1.0".into(),
                start_time: deployment_block,
                max_records_per_block: settings.observer.max_records_per_block,
            },
            processor: Arc::new(CoreProcessor::new(
                cas,
                Arc::clone(&operation_store),
                settings.cas.read_timeout(),
            )),
        }])
        .wrap_err("failed to build version registry")?,
    );

    let observer = Observer::new(
        Arc::clone(&chain),
        Arc::clone(&transaction_store),
        operation_store,
        Arc::clone(&unresolvable_store),
        Arc::clone(&versions),
        ObserverConfig::from_settings(settings, deployment_block),
    );

    Ok(Wiring {
        observer,
        chain,
        pagination,
        transaction_store,
        unresolvable_store,
        versions,
        deployment_block,
        rate_limit_delay: settings.observer.rate_limit_delay(),
        batch_size: settings.observer.batch_size,
    })
}

async fn run(wiring: Wiring) -> eyre::Result<()> {
    let shutdown = wiring.observer.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, stopping observer");
            shutdown.cancel();
        }
    });

    wiring.observer.start().await?;
    info!("observer stopped");
    Ok(())
}

async fn backfill(wiring: Wiring, from: u64, to: u64) -> eyre::Result<()> {
    eyre::ensure!(from <= to, "--from must not exceed --to");

    let from = from.max(wiring.deployment_block.value());
    info!(from, to, "starting one-shot backfill");

    let state = Arc::new(RwLock::new(SyncState::historical(
        wiring.deployment_block,
        BlockHeight::new(from),
        BlockHeight::new(to),
    )));

    let historical = HistoricalSync::new(
        Paginator::new(wiring.chain, wiring.pagination),
        wiring.transaction_store,
        wiring.unresolvable_store,
        wiring.versions,
        wiring.batch_size,
        wiring.rate_limit_delay,
        CancellationToken::new(),
    );
    historical.run(&state).await?;

    info!(
        synced = %state.read().last_synced_block,
        "backfill complete"
    );
    Ok(())
}
