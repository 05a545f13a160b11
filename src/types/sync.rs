//! Sync-state tracking for the observer.
//!
//! `SyncState` is process-local and never persisted: on restart the resume
//! point is re-derived from the transaction store (cursor recovery).

use serde::Serialize;

use super::primitives::BlockHeight;

// ═══════════════════════════════════════════════════════════════════════════════
// SYNC PHASE
// ═══════════════════════════════════════════════════════════════════════════════

/// Which of the two mutually exclusive loops is driving the observer.
///
/// Historical → Live is one-way within a process lifetime; a forced resync
/// requires a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    /// Batched catch-up across `[deployment_block, target_block]`.
    Historical,
    /// Cursor-driven incremental polling at the chain tip.
    Live,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYNC STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Mutable, process-local sync progress.
///
/// Invariant while `phase == Historical`:
/// `contract_deployment_block <= last_synced_block <= target_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncState {
    /// Current phase.
    pub phase: SyncPhase,
    /// Highest block whose anchors have been walked.
    pub last_synced_block: BlockHeight,
    /// Chain tip captured at startup (historical target).
    pub target_block: BlockHeight,
    /// Block the anchor contract was deployed at.
    pub contract_deployment_block: BlockHeight,
    /// True once historical catch-up has reached `target_block`.
    pub is_complete: bool,
}

impl SyncState {
    /// A fresh historical state starting at the deployment block.
    #[must_use]
    pub const fn historical(
        contract_deployment_block: BlockHeight,
        last_synced_block: BlockHeight,
        target_block: BlockHeight,
    ) -> Self {
        Self {
            phase: SyncPhase::Historical,
            last_synced_block,
            target_block,
            contract_deployment_block,
            is_complete: false,
        }
    }

    /// A live state: catch-up is already within one live iteration.
    #[must_use]
    pub const fn live(
        contract_deployment_block: BlockHeight,
        target_block: BlockHeight,
    ) -> Self {
        Self {
            phase: SyncPhase::Live,
            last_synced_block: target_block,
            target_block,
            contract_deployment_block,
            is_complete: true,
        }
    }

    /// Whether the historical-phase block ordering invariant holds.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        match self.phase {
            SyncPhase::Historical => {
                self.contract_deployment_block <= self.last_synced_block
                    && self.last_synced_block <= self.target_block
            }
            SyncPhase::Live => true,
        }
    }

    /// Catch-up progress in the range `[0.0, 100.0]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percent(&self) -> f64 {
        let span = self
            .target_block
            .value()
            .saturating_sub(self.contract_deployment_block.value());
        if span == 0 {
            return 100.0;
        }
        let done = self
            .last_synced_block
            .value()
            .saturating_sub(self.contract_deployment_block.value());
        (done as f64 / span as f64) * 100.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn historical_state_is_consistent() {
        let state = SyncState::historical(
            BlockHeight::new(10),
            BlockHeight::new(50),
            BlockHeight::new(100),
        );
        assert!(state.is_consistent());
        assert!(!state.is_complete);
    }

    #[test]
    fn historical_state_detects_inversion() {
        let state = SyncState::historical(
            BlockHeight::new(10),
            BlockHeight::new(200),
            BlockHeight::new(100),
        );
        assert!(!state.is_consistent());
    }

    #[test]
    fn live_state_is_complete() {
        let state = SyncState::live(BlockHeight::ZERO, BlockHeight::new(100));
        assert!(state.is_complete);
        assert_eq!(state.last_synced_block, state.target_block);
        assert!(state.is_consistent());
    }

    #[test]
    fn progress_reports_midpoint() {
        let state = SyncState::historical(
            BlockHeight::ZERO,
            BlockHeight::new(500),
            BlockHeight::new(1000),
        );
        let progress = state.progress_percent();
        assert!((progress - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn progress_handles_zero_span() {
        let state = SyncState::live(BlockHeight::new(5), BlockHeight::new(5));
        assert!((state.progress_percent() - 100.0).abs() < f64::EPSILON);
    }
}
