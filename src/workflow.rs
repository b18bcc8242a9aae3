// =============================================================================
// Workflow Coordinator — the cross-stage state machine
// =============================================================================
//
// Sequences Ingest → Match Review → Bid Review → Company Capture →
// Finalize → Record. Every stage both consumes and augments the shared
// decision record; hard failures surface the originating message and
// leave stage and record unchanged.
//
// Finalize is a two-step policy: document generation is the hard gate
// (its success is necessary and sufficient for user-visible success),
// the history write afterwards is best-effort and its failure is
// captured as a warning without altering the success result.
//
// Remote-calling operations are wrapped in per-operation in-flight
// guards: a second trigger while a call is outstanding is reported as
// `AlreadyRunning` and performs nothing. There is no cancellation; an
// outstanding call always runs to completion, but its result is only
// committed under the session generation it was requested for — a new
// ingest bumps the generation and the late result is discarded.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::app_state::{AppState, InFlightGuard};
use crate::audit::StageEnvelope;
use crate::error::WorkflowError;
use crate::services::{
    DocumentService, FinalizeRequest, HistoryService, MatchingService, ProposalDraft,
    RecommendationService,
};
use crate::types::{
    BidRecommendationSet, BidSuggestion, CompanyProfile, ProductRef, ProposalOutcome,
    ProposalRecord, TenderMatch, WorkflowStage,
};

// -----------------------------------------------------------------------------
// Result types
// -----------------------------------------------------------------------------

/// Outcome of a guarded trigger. `AlreadyRunning` means the same
/// operation was outstanding and this trigger was a deliberate no-op.
/// `Superseded` means the call completed but a new tender was ingested
/// while it was outstanding, so its result was discarded.
#[derive(Debug)]
pub enum Triggered<T> {
    Completed(T),
    AlreadyRunning,
    Superseded,
}

/// A generated document ready for download.
#[derive(Debug)]
pub struct GeneratedDocument {
    /// Millisecond-timestamped file name, unique within a session.
    pub file_name: String,
    pub document: Vec<u8>,
}

/// Result of a successful Finalize, including the outcome of the
/// best-effort history step.
#[derive(Debug)]
pub struct FinalizedProposal {
    pub file_name: String,
    pub document: Vec<u8>,
    /// History record id when the soft step succeeded.
    pub history_id: Option<i64>,
    /// Warning message when the soft step failed. Never fatal.
    pub history_warning: Option<String>,
}

// -----------------------------------------------------------------------------
// Engine
// -----------------------------------------------------------------------------

/// The workflow engine ties the decision record store and the external
/// service facade together and enforces stage preconditions.
pub struct WorkflowEngine {
    pub state: Arc<AppState>,
    matching: Arc<dyn MatchingService>,
    recommender: Arc<dyn RecommendationService>,
    documents: Arc<dyn DocumentService>,
    history: Arc<dyn HistoryService>,
}

impl WorkflowEngine {
    pub fn new(
        state: Arc<AppState>,
        matching: Arc<dyn MatchingService>,
        recommender: Arc<dyn RecommendationService>,
        documents: Arc<dyn DocumentService>,
        history: Arc<dyn HistoryService>,
    ) -> Self {
        Self {
            state,
            matching,
            recommender,
            documents,
            history,
        }
    }

    // -------------------------------------------------------------------------
    // Ingest
    // -------------------------------------------------------------------------

    /// Ingest a tender document. Allowed from any stage: a successful
    /// ingest supersedes the whole session. Failure keeps the prior stage
    /// and record.
    pub async fn ingest(
        &self,
        file_name: &str,
        pdf: Vec<u8>,
    ) -> Result<Triggered<TenderMatch>, WorkflowError> {
        let from = self.state.current_stage();

        let Some(_guard) = InFlightGuard::acquire(&self.state.ingest_in_flight) else {
            self.state.push_transition(StageEnvelope::skipped("ingest", from));
            return Ok(Triggered::AlreadyRunning);
        };

        match self.matching.ingest_tender(file_name, pdf).await {
            Ok(tender) => {
                self.state.store.replace_tender(tender.clone());
                self.state.set_stage(WorkflowStage::Matched);
                self.state.push_transition(StageEnvelope::ok(
                    "ingest",
                    from,
                    WorkflowStage::Matched,
                ));
                info!(
                    quantity_litres = tender.quantity_litres,
                    matches = tender.top_matches.len(),
                    "tender ingested, session superseded"
                );
                Ok(Triggered::Completed(tender))
            }
            Err(e) => {
                let msg = e.to_string();
                self.state
                    .push_transition(StageEnvelope::failed("ingest", from, &msg));
                Err(WorkflowError::Ingestion(msg))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Bid review
    // -------------------------------------------------------------------------

    /// Request bid suggestions for the chosen product. The stage shows
    /// `Recommending` while the call is outstanding; failure returns to
    /// `Matched` and is retryable without limit (the call does not mutate
    /// server state).
    pub async fn request_recommendation(
        &self,
    ) -> Result<Triggered<BidRecommendationSet>, WorkflowError> {
        let from = self.state.current_stage();
        let record = self.state.store.snapshot();

        let Some(tender) = record.tender_match else {
            self.state.push_transition(StageEnvelope::failed(
                "recommend",
                from,
                "no tender ingested",
            ));
            return Err(WorkflowError::MissingTenderData);
        };
        let Some(chosen) = tender.chosen else {
            self.state.push_transition(StageEnvelope::failed(
                "recommend",
                from,
                "no chosen product",
            ));
            return Err(WorkflowError::NoChosenProduct);
        };

        let Some(_guard) = InFlightGuard::acquire(&self.state.recommend_in_flight) else {
            self.state
                .push_transition(StageEnvelope::skipped("recommend", from));
            return Ok(Triggered::AlreadyRunning);
        };

        // Results are only committed under the session they were requested
        // for; a re-ingest while the call is outstanding discards them.
        let session = record.session;

        self.state.set_stage(WorkflowStage::Recommending);

        let result = self
            .recommender
            .recommend(
                &chosen.product.name,
                tender.quantity_litres,
                chosen.pricing.total_cost,
            )
            .await;

        if self.state.store.current_session() != session {
            // our Recommending marker may still be up if the superseding
            // ingest finished before we set it
            if self.state.current_stage() == WorkflowStage::Recommending {
                self.state.set_stage(WorkflowStage::Matched);
            }
            self.state
                .push_transition(StageEnvelope::superseded("recommend", from));
            warn!("recommendation discarded: session superseded during call");
            return Ok(Triggered::Superseded);
        }

        match result {
            Ok(set) if set.suggestions.is_empty() => {
                self.state.set_stage(WorkflowStage::Matched);
                self.state.push_transition(StageEnvelope::failed(
                    "recommend",
                    from,
                    "recommendation returned no suggestions",
                ));
                Err(WorkflowError::NoCandidates)
            }
            Ok(set) => {
                // set_recommendation re-runs the selector atomically with
                // the stored set, and re-checks the session under the
                // write lock.
                if !self.state.store.set_recommendation(set.clone(), session) {
                    if self.state.current_stage() == WorkflowStage::Recommending {
                        self.state.set_stage(WorkflowStage::Matched);
                    }
                    self.state
                        .push_transition(StageEnvelope::superseded("recommend", from));
                    warn!("recommendation discarded: session superseded during call");
                    return Ok(Triggered::Superseded);
                }
                self.state.set_stage(WorkflowStage::Recommended);
                self.state.push_transition(StageEnvelope::ok(
                    "recommend",
                    from,
                    WorkflowStage::Recommended,
                ));
                info!(suggestions = set.suggestions.len(), "bid review ready");
                Ok(Triggered::Completed(set))
            }
            Err(e) => {
                let msg = e.to_string();
                self.state.set_stage(WorkflowStage::Matched);
                self.state
                    .push_transition(StageEnvelope::failed("recommend", from, &msg));
                Err(WorkflowError::Recommendation(msg))
            }
        }
    }

    /// Adjust the minimum acceptable profit margin. The store re-derives
    /// the chosen suggestion unless the operator has pinned one.
    pub fn set_profit_threshold(&self, threshold_pct: f64) {
        self.state.store.set_profit_threshold(threshold_pct);
        self.state.increment_version();
        info!(threshold_pct, "profit threshold updated");
    }

    /// Confirm the suggestion at `index` as the authoritative bid and
    /// advance to company capture.
    pub fn confirm_suggestion(&self, index: usize) -> Result<BidSuggestion, WorkflowError> {
        let stage = self.state.current_stage();
        if stage != WorkflowStage::Recommended {
            return Err(WorkflowError::InvalidStage {
                operation: "confirm",
                stage,
            });
        }

        let Some(chosen) = self.state.store.confirm_suggestion(index) else {
            self.state.push_transition(StageEnvelope::failed(
                "confirm",
                stage,
                format!("suggestion index {index} out of range"),
            ));
            return Err(WorkflowError::InvalidSuggestionIndex(index));
        };

        self.state.set_stage(WorkflowStage::AwaitingCompany);
        self.state.push_transition(StageEnvelope::ok(
            "confirm",
            stage,
            WorkflowStage::AwaitingCompany,
        ));
        info!(
            discount_pct = chosen.discount_pct,
            expected_win_prob = chosen.expected_win_prob,
            "suggestion confirmed by operator"
        );
        Ok(chosen)
    }

    // -------------------------------------------------------------------------
    // Finalize + record
    // -------------------------------------------------------------------------

    /// Generate the final company-branded document, then best-effort
    /// persist a proposal summary to history.
    ///
    /// Hard gates: all five company fields non-empty, and a tender match
    /// with a chosen product. Refusal leaves the decision record
    /// unmodified. The history step's failure is reported as a warning on
    /// the returned value and never blocks delivery of the document.
    pub async fn finalize(
        &self,
        company: CompanyProfile,
        tender_name: Option<String>,
    ) -> Result<Triggered<FinalizedProposal>, WorkflowError> {
        let from = self.state.current_stage();

        if let Some(field) = company.first_missing_field() {
            self.state.push_transition(StageEnvelope::failed(
                "finalize",
                from,
                format!("company field missing: {field}"),
            ));
            return Err(WorkflowError::IncompleteCompanyProfile(field));
        }

        let record = self.state.store.snapshot();
        let (tender, chosen) = match record.tender_match.as_ref() {
            Some(t) => match t.chosen.clone() {
                Some(c) => (t.clone(), c),
                None => {
                    self.state.push_transition(StageEnvelope::failed(
                        "finalize",
                        from,
                        "tender match has no chosen product",
                    ));
                    return Err(WorkflowError::MissingTenderData);
                }
            },
            None => {
                self.state.push_transition(StageEnvelope::failed(
                    "finalize",
                    from,
                    "no tender ingested",
                ));
                return Err(WorkflowError::MissingTenderData);
            }
        };

        let Some(_guard) = InFlightGuard::acquire(&self.state.finalize_in_flight) else {
            self.state
                .push_transition(StageEnvelope::skipped("finalize", from));
            return Ok(Triggered::AlreadyRunning);
        };

        let tender_name = tender_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Auto tender - {}", Utc::now().format("%Y-%m-%d %H:%M")));

        let request = FinalizeRequest {
            tender_summary: tender.extracted_text.clone(),
            chosen_product: chosen.product.clone(),
            pricing: chosen.pricing.clone(),
            suggestions: record
                .recommendation_set
                .as_ref()
                .map(|s| s.suggestions.clone())
                .unwrap_or_default(),
            min_profit_pct: record.profit_threshold_pct,
            company,
            tender_name: tender_name.clone(),
        };

        let session = record.session;

        let document = match self.documents.finalize_proposal(&request).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let msg = e.to_string();
                self.state
                    .push_transition(StageEnvelope::failed("finalize", from, &msg));
                return Err(WorkflowError::DocumentGeneration(msg));
            }
        };

        // A tender ingested while the document was being generated
        // supersedes the session; the document belongs to the old one and
        // is discarded, and no history record is written.
        if self.state.store.current_session() != session {
            self.state
                .push_transition(StageEnvelope::superseded("finalize", from));
            warn!("finalized document discarded: session superseded during call");
            return Ok(Triggered::Superseded);
        }

        self.state.set_stage(WorkflowStage::Finalized);
        let file_name = format!("final_tender_{}.pdf", Utc::now().timestamp_millis());

        // Soft step: history persistence. Failure is a warning, never a
        // rollback of the Finalized state.
        let draft = ProposalDraft {
            tender_name,
            chosen_product_name: chosen.product.name.clone(),
            chosen_product_type: chosen.product.product_type.clone(),
            pricing: chosen.pricing.clone(),
            quantity: chosen.pricing.quantity_litres,
            match_score: chosen.score,
            outcome: ProposalOutcome::Pending,
        };

        let (history_id, history_warning) = match self.history.record_proposal(&draft).await {
            Ok(id) => {
                self.state.set_stage(WorkflowStage::Recorded);
                self.state.push_transition(StageEnvelope::ok(
                    "finalize",
                    from,
                    WorkflowStage::Recorded,
                ));
                info!(history_id = id, "proposal finalized and recorded");
                (Some(id), None)
            }
            Err(e) => {
                let msg = format!("history persistence failed: {e}");
                warn!(error = %e, "proposal finalized but history save failed");
                self.state.push_warning(msg.clone());
                self.state.push_transition(StageEnvelope::ok_with_detail(
                    "finalize",
                    from,
                    WorkflowStage::Finalized,
                    &msg,
                ));
                (None, Some(msg))
            }
        };

        Ok(Triggered::Completed(FinalizedProposal {
            file_name,
            document,
            history_id,
            history_warning,
        }))
    }

    // -------------------------------------------------------------------------
    // Quick proposal
    // -------------------------------------------------------------------------

    /// Generate an unbranded proposal document straight from the current
    /// tender match, without touching the state machine.
    pub async fn quick_proposal(&self) -> Result<Triggered<GeneratedDocument>, WorkflowError> {
        let stage = self.state.current_stage();
        let record = self.state.store.snapshot();

        let Some(tender) = record.tender_match else {
            return Err(WorkflowError::MissingTenderData);
        };
        if tender.chosen.is_none() {
            return Err(WorkflowError::NoChosenProduct);
        }

        let Some(_guard) = InFlightGuard::acquire(&self.state.proposal_in_flight) else {
            self.state
                .push_transition(StageEnvelope::skipped("quick_proposal", stage));
            return Ok(Triggered::AlreadyRunning);
        };

        match self.documents.quick_proposal(&tender).await {
            Ok(bytes) => Ok(Triggered::Completed(GeneratedDocument {
                file_name: format!("proposal_{}.pdf", Utc::now().timestamp_millis()),
                document: bytes,
            })),
            Err(e) => {
                let msg = e.to_string();
                self.state
                    .push_transition(StageEnvelope::failed("quick_proposal", stage, &msg));
                Err(WorkflowError::DocumentGeneration(msg))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Facade passthroughs (no state machine interaction)
    // -------------------------------------------------------------------------

    pub async fn upload_catalog(&self, file_name: &str, csv: Vec<u8>) -> anyhow::Result<usize> {
        self.matching.upload_catalog(file_name, csv).await
    }

    pub async fn list_catalog(&self) -> anyhow::Result<Vec<ProductRef>> {
        self.matching.list_catalog().await
    }

    pub async fn list_history(&self) -> anyhow::Result<Vec<ProposalRecord>> {
        self.history.list_proposals().await
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("stage", &self.state.current_stage())
            .finish()
    }
}
