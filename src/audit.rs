// =============================================================================
// Stage Envelope — auditable record of every workflow transition attempt
// =============================================================================
//
// Every operator-triggered operation produces an envelope, whether it
// advanced the state machine, failed, or was skipped by an in-flight
// guard. The ring buffer on AppState keeps the recent history for the
// dashboard.
// =============================================================================

use serde::Serialize;

use crate::types::WorkflowStage;

/// Auditable record of one attempted stage transition.
#[derive(Debug, Clone, Serialize)]
pub struct StageEnvelope {
    /// Unique identifier for this attempt (UUID v4).
    pub id: String,

    /// Operation that triggered the attempt ("ingest", "recommend",
    /// "confirm", "finalize", "quick_proposal").
    pub operation: &'static str,

    /// Stage before the attempt.
    pub from_stage: WorkflowStage,

    /// Stage after the attempt (same as `from_stage` on failure/skip).
    pub to_stage: WorkflowStage,

    /// "OK", "FAILED", or "SKIPPED".
    pub outcome: &'static str,

    /// Human-readable detail (error message, warning, or context).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// ISO 8601 timestamp of when this attempt completed.
    pub created_at: String,
}

impl StageEnvelope {
    fn new(
        operation: &'static str,
        from_stage: WorkflowStage,
        to_stage: WorkflowStage,
        outcome: &'static str,
        detail: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation,
            from_stage,
            to_stage,
            outcome,
            detail,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// A transition that advanced (or legitimately kept) the stage.
    pub fn ok(operation: &'static str, from: WorkflowStage, to: WorkflowStage) -> Self {
        Self::new(operation, from, to, "OK", None)
    }

    /// Same as [`ok`](Self::ok) but with a detail message (e.g. a soft
    /// history warning attached to a successful finalize).
    pub fn ok_with_detail(
        operation: &'static str,
        from: WorkflowStage,
        to: WorkflowStage,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(operation, from, to, "OK", Some(detail.into()))
    }

    /// A failed attempt; the stage is unchanged.
    pub fn failed(
        operation: &'static str,
        stage: WorkflowStage,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(operation, stage, stage, "FAILED", Some(reason.into()))
    }

    /// An attempt ignored by the in-flight guard.
    pub fn skipped(operation: &'static str, stage: WorkflowStage) -> Self {
        Self::new(
            operation,
            stage,
            stage,
            "SKIPPED",
            Some("operation already in flight".to_string()),
        )
    }

    /// A completed call whose result was discarded because the session was
    /// superseded while it was outstanding.
    pub fn superseded(operation: &'static str, stage: WorkflowStage) -> Self {
        Self::new(
            operation,
            stage,
            stage,
            "SKIPPED",
            Some("result discarded; session superseded during call".to_string()),
        )
    }
}
