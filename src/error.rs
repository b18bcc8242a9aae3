// =============================================================================
// Workflow error taxonomy
// =============================================================================
//
// Hard failures only. History persistence failure is deliberately absent:
// it is a logged warning that must never block or roll back a successful
// Finalize. Upstream service messages are carried verbatim for display.
// =============================================================================

use thiserror::Error;

/// Errors surfaced to the operator by the workflow coordinator. Every hard
/// failure leaves the workflow stage and decision record unchanged.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The matching service could not produce a tender match.
    #[error("tender ingestion failed: {0}")]
    Ingestion(String),

    /// Bid review was requested without a chosen product in the match.
    #[error("no chosen product in the current tender match")]
    NoChosenProduct,

    /// The recommendation service call failed.
    #[error("bid recommendation failed: {0}")]
    Recommendation(String),

    /// The recommendation service returned an empty suggestion set.
    #[error("recommendation returned no bid suggestions")]
    NoCandidates,

    /// A required company field is empty or whitespace-only.
    #[error("company profile incomplete: missing '{0}'")]
    IncompleteCompanyProfile(&'static str),

    /// Finalize was requested without an ingested tender (or without a
    /// chosen product).
    #[error("no tender data available; ingest a tender first")]
    MissingTenderData,

    /// The document-generation service call failed.
    #[error("document generation failed: {0}")]
    DocumentGeneration(String),

    /// Confirmation referenced a suggestion that does not exist.
    #[error("suggestion index {0} is out of range")]
    InvalidSuggestionIndex(usize),

    /// The requested operation is not valid in the current stage.
    #[error("operation '{operation}' is not allowed in stage {stage}")]
    InvalidStage {
        operation: &'static str,
        stage: crate::types::WorkflowStage,
    },
}
