// =============================================================================
// Backend HTTP client — reqwest implementation of the service facade
// =============================================================================
//
// The original deployment exposes all four collaborator services from one
// backend host, so a single client with one base URL implements every
// trait. Non-2xx responses are turned into errors carrying the status and
// the body's `detail` message when present, verbatim, for operator
// display.
//
// No request timeout is configured: no operation has a caller-specified
// timeout, and an in-flight call always runs to completion or failure.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::services::{
    DocumentService, FinalizeRequest, HistoryService, MatchingService, ProposalDraft,
    RecommendationService,
};
use crate::types::{BidRecommendationSet, ProductRef, ProposalRecord, TenderMatch};

/// HTTP client for the tender backend services.
#[derive(Clone)]
pub struct HttpBackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackendClient {
    /// Create a new client against `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .build()
            .expect("failed to build reqwest client");

        debug!(base_url = %base_url, "HttpBackendClient initialised");

        Self { base_url, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check the response status; on failure extract the backend's
    /// `detail` message (FastAPI error shape) or fall back to the body.
    async fn ensure_success(resp: reqwest::Response, operation: &str) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
            .unwrap_or(body);

        anyhow::bail!("{operation} returned {status}: {detail}")
    }
}

// -----------------------------------------------------------------------------
// Response envelopes
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
struct UploadResponse {
    count: usize,
}

#[derive(Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    products: Vec<ProductRef>,
}

#[derive(Deserialize)]
struct RecommendResponse {
    recommendation: BidRecommendationSet,
}

#[derive(Deserialize)]
struct SaveResponse {
    id: i64,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    proposals: Vec<ProposalRecord>,
}

// -----------------------------------------------------------------------------
// MatchingService
// -----------------------------------------------------------------------------

#[async_trait]
impl MatchingService for HttpBackendClient {
    #[instrument(skip(self, pdf), name = "backend::ingest_tender")]
    async fn ingest_tender(&self, file_name: &str, pdf: Vec<u8>) -> Result<TenderMatch> {
        let part = reqwest::multipart::Part::bytes(pdf)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .context("invalid mime type for tender upload")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(self.url("/process_tender_pdf"))
            .multipart(form)
            .send()
            .await
            .context("POST /process_tender_pdf request failed")?;
        let resp = Self::ensure_success(resp, "POST /process_tender_pdf").await?;

        let tender: TenderMatch = resp
            .json()
            .await
            .context("failed to parse tender match response")?;

        debug!(
            quantity_litres = tender.quantity_litres,
            matches = tender.top_matches.len(),
            "tender ingested"
        );
        Ok(tender)
    }

    #[instrument(skip(self, csv), name = "backend::upload_catalog")]
    async fn upload_catalog(&self, file_name: &str, csv: Vec<u8>) -> Result<usize> {
        let part = reqwest::multipart::Part::bytes(csv)
            .file_name(file_name.to_string())
            .mime_str("text/csv")
            .context("invalid mime type for catalog upload")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(self.url("/upload_products"))
            .multipart(form)
            .send()
            .await
            .context("POST /upload_products request failed")?;
        let resp = Self::ensure_success(resp, "POST /upload_products").await?;

        let body: UploadResponse = resp
            .json()
            .await
            .context("failed to parse catalog upload response")?;
        Ok(body.count)
    }

    #[instrument(skip(self), name = "backend::list_catalog")]
    async fn list_catalog(&self) -> Result<Vec<ProductRef>> {
        let resp = self
            .client
            .get(self.url("/list_products"))
            .send()
            .await
            .context("GET /list_products request failed")?;
        let resp = Self::ensure_success(resp, "GET /list_products").await?;

        let body: CatalogResponse = resp
            .json()
            .await
            .context("failed to parse catalog response")?;
        Ok(body.products)
    }
}

// -----------------------------------------------------------------------------
// RecommendationService
// -----------------------------------------------------------------------------

#[async_trait]
impl RecommendationService for HttpBackendClient {
    #[instrument(skip(self), name = "backend::recommend")]
    async fn recommend(
        &self,
        product_name: &str,
        quantity: f64,
        baseline_total: f64,
    ) -> Result<BidRecommendationSet> {
        let payload = serde_json::json!({
            "product_name": product_name,
            "quantity": quantity,
            "baseline_total": baseline_total,
        });

        let resp = self
            .client
            .post(self.url("/recommend_bid"))
            .json(&payload)
            .send()
            .await
            .context("POST /recommend_bid request failed")?;
        let resp = Self::ensure_success(resp, "POST /recommend_bid").await?;

        let body: RecommendResponse = resp
            .json()
            .await
            .context("failed to parse recommendation response")?;

        debug!(
            suggestions = body.recommendation.suggestions.len(),
            "recommendation received"
        );
        Ok(body.recommendation)
    }
}

// -----------------------------------------------------------------------------
// DocumentService
// -----------------------------------------------------------------------------

#[async_trait]
impl DocumentService for HttpBackendClient {
    #[instrument(skip(self, request), name = "backend::finalize_proposal")]
    async fn finalize_proposal(&self, request: &FinalizeRequest) -> Result<Vec<u8>> {
        let resp = self
            .client
            .post(self.url("/generate_final_pdf"))
            .json(request)
            .send()
            .await
            .context("POST /generate_final_pdf request failed")?;
        let resp = Self::ensure_success(resp, "POST /generate_final_pdf").await?;

        let bytes = resp
            .bytes()
            .await
            .context("failed to read final document body")?;
        debug!(size = bytes.len(), "final document generated");
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self, tender), name = "backend::quick_proposal")]
    async fn quick_proposal(&self, tender: &TenderMatch) -> Result<Vec<u8>> {
        let resp = self
            .client
            .post(self.url("/generate_proposal_pdf"))
            .json(tender)
            .send()
            .await
            .context("POST /generate_proposal_pdf request failed")?;
        let resp = Self::ensure_success(resp, "POST /generate_proposal_pdf").await?;

        let bytes = resp
            .bytes()
            .await
            .context("failed to read proposal document body")?;
        Ok(bytes.to_vec())
    }
}

// -----------------------------------------------------------------------------
// HistoryService
// -----------------------------------------------------------------------------

#[async_trait]
impl HistoryService for HttpBackendClient {
    #[instrument(skip(self, draft), name = "backend::record_proposal")]
    async fn record_proposal(&self, draft: &ProposalDraft) -> Result<i64> {
        let resp = self
            .client
            .post(self.url("/save_proposal"))
            .json(draft)
            .send()
            .await
            .context("POST /save_proposal request failed")?;
        let resp = Self::ensure_success(resp, "POST /save_proposal").await?;

        let body: SaveResponse = resp
            .json()
            .await
            .context("failed to parse save response")?;
        Ok(body.id)
    }

    #[instrument(skip(self), name = "backend::list_proposals")]
    async fn list_proposals(&self) -> Result<Vec<ProposalRecord>> {
        let resp = self
            .client
            .get(self.url("/list_proposals"))
            .send()
            .await
            .context("GET /list_proposals request failed")?;
        let resp = Self::ensure_success(resp, "GET /list_proposals").await?;

        let body: HistoryResponse = resp
            .json()
            .await
            .context("failed to parse history response")?;
        Ok(body.proposals)
    }
}

impl std::fmt::Debug for HttpBackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackendClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let c = HttpBackendClient::new("http://127.0.0.1:8000/");
        assert_eq!(c.url("/recommend_bid"), "http://127.0.0.1:8000/recommend_bid");
    }

    #[test]
    fn recommend_response_ignores_extra_fields() {
        // the backend nests current/historical data next to the suggestions
        let json = r#"{
            "recommendation": {
                "current": { "per_litre": 101.5, "total": 812000.0, "expected_win_prob": 0.55 },
                "historical_win_rate": 0.4,
                "suggestions": [
                    { "discount_pct": 0.0, "per_litre": 101.5, "total": 812000.0,
                      "expected_win_prob": 0.55, "profit_margin_pct": 4.2 }
                ]
            }
        }"#;
        let body: RecommendResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.recommendation.suggestions.len(), 1);
        assert_eq!(body.recommendation.suggestions[0].profit_margin_pct, 4.2);
    }

    #[test]
    fn history_response_defaults_to_empty() {
        let body: HistoryResponse = serde_json::from_str("{}").unwrap();
        assert!(body.proposals.is_empty());
    }

    fn response(status: u16, body: &'static str) -> reqwest::Response {
        axum::http::Response::builder()
            .status(status)
            .body(body)
            .unwrap()
            .into()
    }

    #[tokio::test]
    async fn success_status_passes_through() {
        let resp = response(200, "{}");
        assert!(HttpBackendClient::ensure_success(resp, "GET /list_products")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn upstream_detail_is_surfaced_verbatim() {
        let resp = response(
            409,
            r#"{"detail":"No tender data available. Process a tender first."}"#,
        );
        let err = HttpBackendClient::ensure_success(resp, "POST /generate_final_pdf")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("POST /generate_final_pdf"));
        assert!(msg.contains("409"));
        assert!(msg.contains("No tender data available. Process a tender first."));
    }

    #[tokio::test]
    async fn non_json_error_body_falls_back_to_the_raw_text() {
        let resp = response(500, "Internal Server Error");
        let err = HttpBackendClient::ensure_success(resp, "GET /list_products")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Internal Server Error"));
    }
}
