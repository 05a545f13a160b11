//! The observer core: two-phase sync against a moving chain tip.
//!
//! [`Observer`] owns the sync lifecycle. On `start` it derives its resume
//! point from the persisted transaction log, runs historical catch-up if the
//! gap warrants it, then hands over to the live loop — which polls forever,
//! tolerating rate limits, timeouts, partial failures, and reorgs. `stop`
//! sets a cooperative flag; both loops exit between batches and in-flight
//! work is allowed to finish.
//!
//! There is no global state: construct an observer, start it, stop it.

mod historical;
mod live;
mod monitor;
mod reorg;
mod sync_state;
mod throughput;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

pub use historical::HistoricalSync;
pub use live::{LiveLoop, LiveLoopConfig};
pub use monitor::ProgressMonitor;
pub use reorg::ReorgHandler;
pub use sync_state::SyncPlanner;
pub use throughput::ThroughputLimiter;

use crate::chain::{Paginator, PaginatorConfig};
use crate::config::Settings;
use crate::error::Result;
use crate::ports::{
    ChainClient, EventSink, OperationStore, TracingEventSink, TransactionStore,
    UnresolvableTransactionStore,
};
use crate::types::{BlockHeight, SyncPhase, SyncState};
use crate::versions::VersionRegistry;

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Observer tuning, assembled from [`Settings`] or built directly in tests.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Block the anchor contract was deployed at.
    pub deployment_block: BlockHeight,
    /// Blocks per historical batch.
    pub batch_size: u64,
    /// Sleep between historical batches.
    pub rate_limit_delay: Duration,
    /// Range pagination and retry tuning.
    pub pagination: PaginatorConfig,
    /// Live loop tuning.
    pub live: LiveLoopConfig,
    /// Progress-monitor interval; `None` disables the monitor.
    pub monitor_interval: Option<Duration>,
}

impl ObserverConfig {
    /// Build observer tuning from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &Settings, deployment_block: BlockHeight) -> Self {
        let observer = &settings.observer;
        Self {
            deployment_block,
            batch_size: observer.batch_size,
            rate_limit_delay: observer.rate_limit_delay(),
            pagination: PaginatorConfig {
                default_batch_size: observer.pagination.default_batch_size,
                max_batch_size: observer.pagination.max_batch_size,
                max_retries: observer.max_retries,
                retry_delay: observer.retry_delay(),
            },
            live: LiveLoopConfig {
                max_concurrent_downloads: observer.max_concurrent_downloads,
                observing_interval: observer.observing_interval(),
                ..LiveLoopConfig::default()
            },
            monitor_interval: observer.monitor_interval(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OBSERVER
// ═══════════════════════════════════════════════════════════════════════════════

/// The anchor observer.
pub struct Observer {
    chain: Arc<dyn ChainClient>,
    transaction_store: Arc<dyn TransactionStore>,
    operation_store: Arc<dyn OperationStore>,
    unresolvable_store: Arc<dyn UnresolvableTransactionStore>,
    versions: Arc<VersionRegistry>,
    events: Arc<dyn EventSink>,
    config: ObserverConfig,
    state: Arc<RwLock<SyncState>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("config", &self.config)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

impl Observer {
    /// Create an observer with the default tracing event sink.
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        transaction_store: Arc<dyn TransactionStore>,
        operation_store: Arc<dyn OperationStore>,
        unresolvable_store: Arc<dyn UnresolvableTransactionStore>,
        versions: Arc<VersionRegistry>,
        config: ObserverConfig,
    ) -> Self {
        let initial = SyncState::historical(
            config.deployment_block,
            config.deployment_block,
            config.deployment_block,
        );
        Self {
            chain,
            transaction_store,
            operation_store,
            unresolvable_store,
            versions,
            events: Arc::new(TracingEventSink),
            config,
            state: Arc::new(RwLock::new(initial)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Replace the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Request a cooperative stop. Loops exit between batches; in-flight
    /// work finishes within its own timeouts.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// The stop flag, for wiring external signals (ctrl-c).
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Snapshot of the current sync state.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        *self.state.read()
    }

    /// Run the observer: plan, catch up historically if needed, then poll
    /// live until stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if startup planning fails or the historical walk
    /// hits a fatal error. The live loop absorbs its own failures.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let planned = SyncPlanner::new(
            Arc::clone(&self.chain),
            Arc::clone(&self.transaction_store),
            self.config.deployment_block,
            self.config.batch_size,
        )
        .plan()
        .await?;

        *self.state.write() = planned;
        info!(?planned, "observer starting");

        // Monitor lives on a child token so it dies with this call.
        let monitor_token = self.shutdown.child_token();
        let monitor_handle = self.config.monitor_interval.map(|interval| {
            let monitor = ProgressMonitor::new(
                Arc::clone(&self.state),
                interval,
                monitor_token.clone(),
            );
            tokio::spawn(async move { monitor.run().await })
        });

        let result = self.run_phases(planned).await;

        monitor_token.cancel();
        if let Some(handle) = monitor_handle {
            let _ = handle.await;
        }

        result
    }

    async fn run_phases(&self, planned: SyncState) -> Result<()> {
        if planned.phase == SyncPhase::Historical {
            let historical = HistoricalSync::new(
                Paginator::new(Arc::clone(&self.chain), self.config.pagination),
                Arc::clone(&self.transaction_store),
                Arc::clone(&self.unresolvable_store),
                Arc::clone(&self.versions),
                self.config.batch_size,
                self.config.rate_limit_delay,
                self.shutdown.clone(),
            );
            historical.run(&self.state).await?;

            if self.shutdown.is_cancelled() {
                return Ok(());
            }

            // One-way transition within this run.
            {
                let mut s = self.state.write();
                s.phase = SyncPhase::Live;
                s.is_complete = true;
            }
            info!("transitioned to live observation");
        }

        self.live_loop().run().await
    }

    /// Assemble the live loop over this observer's collaborators.
    ///
    /// Exposed so tests and one-shot tooling can drive single iterations.
    #[must_use]
    pub fn live_loop(&self) -> LiveLoop {
        LiveLoop::new(
            Arc::clone(&self.chain),
            Arc::clone(&self.transaction_store),
            Arc::clone(&self.unresolvable_store),
            Arc::clone(&self.versions),
            ThroughputLimiter::new(Arc::clone(&self.versions)),
            ReorgHandler::new(
                Arc::clone(&self.chain),
                Arc::clone(&self.transaction_store),
                Arc::clone(&self.operation_store),
                Arc::clone(&self.unresolvable_store),
                Arc::clone(&self.events),
            ),
            Arc::clone(&self.events),
            self.config.live.clone(),
            self.shutdown.clone(),
        )
    }
}
