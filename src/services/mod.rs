// =============================================================================
// External Service Facade — typed contracts to the backend collaborators
// =============================================================================
//
// The matching, recommendation, document-generation, and history services
// are external; the engine only knows these request/response shapes. Each
// operation is a single exchange with no partial-result semantics. The
// traits exist so the workflow coordinator can be exercised against
// in-process stubs.
// =============================================================================

pub mod client;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::types::{
    BidRecommendationSet, CompanyProfile, PricingQuote, ProductRef, ProposalOutcome,
    ProposalRecord, TenderMatch,
};

/// Payload for the final, company-branded document generation call.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeRequest {
    pub tender_summary: String,
    pub chosen_product: ProductRef,
    pub pricing: PricingQuote,
    pub suggestions: Vec<crate::types::BidSuggestion>,
    pub min_profit_pct: f64,
    pub company: CompanyProfile,
    pub tender_name: String,
}

/// Proposal summary submitted to the history service after a successful
/// Finalize. The service assigns the id and timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalDraft {
    pub tender_name: String,
    pub chosen_product_name: String,
    pub chosen_product_type: String,
    pub pricing: PricingQuote,
    pub quantity: f64,
    pub match_score: f64,
    pub outcome: ProposalOutcome,
}

/// Tender ingestion and product catalog operations.
#[async_trait]
pub trait MatchingService: Send + Sync + 'static {
    /// Extract, score, and price a tender document against the catalog.
    async fn ingest_tender(&self, file_name: &str, pdf: Vec<u8>) -> Result<TenderMatch>;

    /// Replace the product catalog from a CSV upload; returns the count.
    async fn upload_catalog(&self, file_name: &str, csv: Vec<u8>) -> Result<usize>;

    /// List the currently loaded catalog.
    async fn list_catalog(&self) -> Result<Vec<ProductRef>>;
}

/// Discount/pricing scenario generation.
#[async_trait]
pub trait RecommendationService: Send + Sync + 'static {
    async fn recommend(
        &self,
        product_name: &str,
        quantity: f64,
        baseline_total: f64,
    ) -> Result<BidRecommendationSet>;
}

/// Proposal document generation. Responses are the raw document bytes.
#[async_trait]
pub trait DocumentService: Send + Sync + 'static {
    /// Full company-branded final document.
    async fn finalize_proposal(&self, request: &FinalizeRequest) -> Result<Vec<u8>>;

    /// Quick unbranded proposal straight from a tender match.
    async fn quick_proposal(&self, tender: &TenderMatch) -> Result<Vec<u8>>;
}

/// Proposal history persistence and readback.
#[async_trait]
pub trait HistoryService: Send + Sync + 'static {
    /// Persist a proposal summary; returns the assigned record id.
    async fn record_proposal(&self, draft: &ProposalDraft) -> Result<i64>;

    /// All persisted proposals, newest first.
    async fn list_proposals(&self) -> Result<Vec<ProposalRecord>>;
}
