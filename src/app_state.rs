// =============================================================================
// Central Application State — TenderBid Workflow Engine
// =============================================================================
//
// The single source of truth for the workflow session. The decision record
// store, the current stage, the transition audit trail, and the soft
// warnings all live here, shared across API handlers via `Arc<AppState>`.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - AtomicBool in-flight guards, one per remote-calling operation.
//   - parking_lot::RwLock for all mutable shared collections.
// =============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::audit::StageEnvelope;
use crate::decision_record::{DecisionRecord, DecisionStore};
use crate::runtime_config::RuntimeConfig;
use crate::types::WorkflowStage;

/// Maximum number of recent warnings to retain.
const MAX_RECENT_WARNINGS: usize = 50;
/// Maximum number of recent stage envelopes to retain.
const MAX_RECENT_TRANSITIONS: usize = 100;

// =============================================================================
// Warning Record
// =============================================================================

/// A recorded soft failure (e.g. history persistence after a successful
/// finalize). Warnings never alter workflow state.
#[derive(Debug, Clone, Serialize)]
pub struct WarningRecord {
    /// Human-readable warning message.
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

// =============================================================================
// In-flight guard
// =============================================================================

/// Boolean guard around one remote-calling operation. A second trigger
/// while the flag is held is a no-op for the caller, not a queue entry and
/// not an error. Released on drop so every exit path clears it.
pub struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    /// Try to take the guard; `None` means the operation is already
    /// outstanding.
    pub fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// AppState
// =============================================================================

/// Central application state shared across API handlers via
/// `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter, incremented on every
    /// meaningful state mutation. The dashboard polls it to detect
    /// changes.
    pub state_version: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: RwLock<RuntimeConfig>,

    // ── Decision record & stage ─────────────────────────────────────────
    pub store: DecisionStore,
    pub stage: RwLock<WorkflowStage>,

    // ── In-flight guards (one per remote-calling operation) ─────────────
    pub ingest_in_flight: AtomicBool,
    pub recommend_in_flight: AtomicBool,
    pub finalize_in_flight: AtomicBool,
    pub proposal_in_flight: AtomicBool,

    // ── Audit trail ─────────────────────────────────────────────────────
    pub recent_transitions: RwLock<Vec<StageEnvelope>>,

    // ── Soft warnings ───────────────────────────────────────────────────
    pub recent_warnings: RwLock<Vec<WarningRecord>>,

    // ── Timing ──────────────────────────────────────────────────────────
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Construct a new `AppState` from the given runtime configuration.
    /// The returned value is typically wrapped in `Arc` immediately.
    pub fn new(config: RuntimeConfig) -> Self {
        let store = DecisionStore::new(config.default_profit_threshold_pct);

        Self {
            state_version: AtomicU64::new(1),
            runtime_config: RwLock::new(config),
            store,
            stage: RwLock::new(WorkflowStage::Empty),
            ingest_in_flight: AtomicBool::new(false),
            recommend_in_flight: AtomicBool::new(false),
            finalize_in_flight: AtomicBool::new(false),
            proposal_in_flight: AtomicBool::new(false),
            recent_transitions: RwLock::new(Vec::new()),
            recent_warnings: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    /// Atomically increment the state version.
    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    /// Read the current state version without modifying it.
    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Stage access ────────────────────────────────────────────────────

    pub fn current_stage(&self) -> WorkflowStage {
        *self.stage.read()
    }

    pub fn set_stage(&self, stage: WorkflowStage) {
        *self.stage.write() = stage;
        self.increment_version();
    }

    // ── Audit trail ─────────────────────────────────────────────────────

    /// Record a stage envelope. The ring buffer is capped at
    /// [`MAX_RECENT_TRANSITIONS`]; oldest entries are evicted first.
    pub fn push_transition(&self, envelope: StageEnvelope) {
        let mut transitions = self.recent_transitions.write();
        transitions.push(envelope);
        while transitions.len() > MAX_RECENT_TRANSITIONS {
            transitions.remove(0);
        }

        self.increment_version();
    }

    // ── Soft warnings ───────────────────────────────────────────────────

    /// Record a soft warning. Capped at [`MAX_RECENT_WARNINGS`].
    pub fn push_warning(&self, message: String) {
        let record = WarningRecord {
            message,
            at: Utc::now().to_rfc3339(),
        };

        let mut warnings = self.recent_warnings.write();
        warnings.push(record);
        while warnings.len() > MAX_RECENT_WARNINGS {
            warnings.remove(0);
        }

        self.increment_version();
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Build a complete, serialisable snapshot of the workflow session.
    /// This is the payload for `GET /api/v1/state`.
    pub fn build_snapshot(&self) -> StateSnapshot {
        let config = self.runtime_config.read();

        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            stage: self.current_stage(),
            record: self.store.snapshot(),
            recent_transitions: self.recent_transitions.read().clone(),
            recent_warnings: self.recent_warnings.read().clone(),
            backend_base_url: config.backend_base_url.clone(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

// =============================================================================
// Serialisable snapshot
// =============================================================================

/// Full session snapshot sent to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub stage: WorkflowStage,
    pub record: DecisionRecord,
    pub recent_transitions: Vec<StageEnvelope>,
    pub recent_warnings: Vec<WarningRecord>,
    pub backend_base_url: String,
    pub uptime_seconds: u64,
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_empty() {
        let state = AppState::new(RuntimeConfig::default());
        assert_eq!(state.current_stage(), WorkflowStage::Empty);
        assert_eq!(state.current_state_version(), 1);
        let snap = state.build_snapshot();
        assert!(snap.record.tender_match.is_none());
        assert!(snap.recent_transitions.is_empty());
    }

    #[test]
    fn in_flight_guard_blocks_second_acquire_until_drop() {
        let flag = AtomicBool::new(false);
        let guard = InFlightGuard::acquire(&flag).expect("first acquire");
        assert!(InFlightGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(InFlightGuard::acquire(&flag).is_some());
    }

    #[test]
    fn warning_ring_is_capped() {
        let state = AppState::new(RuntimeConfig::default());
        for i in 0..60 {
            state.push_warning(format!("warn {i}"));
        }
        let warnings = state.recent_warnings.read();
        assert_eq!(warnings.len(), MAX_RECENT_WARNINGS);
        assert_eq!(warnings[0].message, "warn 10");
    }

    #[test]
    fn stage_changes_bump_the_version() {
        let state = AppState::new(RuntimeConfig::default());
        let v = state.current_state_version();
        state.set_stage(WorkflowStage::Matched);
        assert!(state.current_state_version() > v);
        assert_eq!(state.current_stage(), WorkflowStage::Matched);
    }
}
