//! Read-only progress monitor.
//!
//! Runs on an independent fixed-interval timer, reads the shared sync state,
//! and reports progress through logs and gauges. It never mutates anything.

use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use parking_lot::RwLock;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::types::{SyncPhase, SyncState};

/// Periodic sync-progress reporter.
#[derive(Debug)]
pub struct ProgressMonitor {
    state: Arc<RwLock<SyncState>>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl ProgressMonitor {
    /// Create a monitor over the shared sync state.
    #[must_use]
    pub const fn new(
        state: Arc<RwLock<SyncState>>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state,
            interval,
            shutdown,
        }
    }

    /// Report until the stop flag is set.
    pub async fn run(&self) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return,
                () = sleep(self.interval) => {}
            }

            let snapshot = *self.state.read();
            self.report(&snapshot);
        }
    }

    fn report(&self, state: &SyncState) {
        #[allow(clippy::cast_precision_loss)]
        {
            gauge!("observer_last_synced_block").set(state.last_synced_block.value() as f64);
            gauge!("observer_target_block").set(state.target_block.value() as f64);
        }
        gauge!("observer_sync_progress_percent").set(state.progress_percent());

        match state.phase {
            SyncPhase::Historical => info!(
                synced = %state.last_synced_block,
                target = %state.target_block,
                progress = format!("{:.1}%", state.progress_percent()),
                "historical sync progress"
            ),
            SyncPhase::Live => info!(
                synced = %state.last_synced_block,
                "observing live"
            ),
        }
    }
}
