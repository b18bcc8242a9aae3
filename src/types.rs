// =============================================================================
// Shared types used across the TenderBid workflow engine
// =============================================================================
//
// Wire field names are snake_case and match the backend contract exactly
// (`extracted_text`, `quantity_litres`, `profit_margin_pct`, ...), so these
// structs deserialise service responses directly.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Allowed drift between `total_cost` and `per_litre * quantity_litres`,
/// expressed per litre. Upstream pricing rounds to 2 decimal places.
const PRICE_TOLERANCE_PER_LITRE: f64 = 0.01;

/// A catalog product as returned by the matching service. Identity is
/// `name` (with `product_type` as disambiguator); immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub product_type: String,
    #[serde(default)]
    pub finish: String,
    #[serde(default)]
    pub pack: String,
    #[serde(default)]
    pub coverage: String,
    #[serde(default)]
    pub price_per_litre: f64,
}

/// Costed pricing for a product at a tender's quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingQuote {
    pub per_litre: f64,
    pub quantity_litres: f64,
    pub total_cost: f64,
}

impl PricingQuote {
    /// Whether `total_cost` agrees with `per_litre * quantity_litres`
    /// within rounding tolerance.
    pub fn is_consistent(&self) -> bool {
        let expected = self.per_litre * self.quantity_litres;
        (self.total_cost - expected).abs()
            <= PRICE_TOLERANCE_PER_LITRE * self.quantity_litres.max(1.0)
    }
}

/// A catalog product scored against the tender, with derived pricing and
/// human-readable unmet requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub product: ProductRef,
    /// 0–1, higher = better fit.
    pub score: f64,
    pub pricing: PricingQuote,
    #[serde(default)]
    pub gaps: Vec<String>,
}

/// Result of ingesting a tender document through the matching service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenderMatch {
    pub extracted_text: String,
    pub quantity_litres: f64,
    #[serde(default)]
    pub top_matches: Vec<MatchCandidate>,
    pub chosen: Option<MatchCandidate>,
}

/// A priced discount scenario from the recommendation service. The core
/// treats these as opaque candidates for the selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidSuggestion {
    pub discount_pct: f64,
    pub per_litre: f64,
    pub total: f64,
    pub profit_margin_pct: f64,
    /// 0–1 estimated probability of winning the tender.
    pub expected_win_prob: f64,
}

/// Ordered candidate set. Ordering is not significant to selection but is
/// preserved for display (and for the stable tie-break).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BidRecommendationSet {
    #[serde(default)]
    pub suggestions: Vec<BidSuggestion>,
}

/// Operator-supplied company details. All five fields are required
/// non-empty before a final proposal can be generated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    pub address: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
}

impl CompanyProfile {
    /// Return the name of the first missing (empty or whitespace-only)
    /// field, or `None` when the profile is complete.
    pub fn first_missing_field(&self) -> Option<&'static str> {
        let fields: [(&'static str, &str); 5] = [
            ("name", &self.name),
            ("address", &self.address),
            ("contact_person", &self.contact_person),
            ("email", &self.email),
            ("phone", &self.phone),
        ];
        fields
            .iter()
            .find(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| *k)
    }
}

/// Outcome of a submitted proposal. Mutated by a collaborator outside this
/// engine; the engine only ever writes `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalOutcome {
    Pending,
    Won,
    Lost,
}

impl Default for ProposalOutcome {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for ProposalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Won => write!(f, "won"),
            Self::Lost => write!(f, "lost"),
        }
    }
}

/// A proposal summary as persisted by the history service. Immutable after
/// creation except `outcome`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRecord {
    pub id: i64,
    #[serde(default)]
    pub tender_name: String,
    #[serde(default)]
    pub chosen_product_name: String,
    #[serde(default)]
    pub chosen_product_type: String,
    pub pricing: PricingQuote,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub match_score: f64,
    #[serde(default)]
    pub outcome: ProposalOutcome,
    #[serde(default)]
    pub timestamp: String,
}

/// Stage of the cross-stage proposal workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStage {
    /// No tender ingested yet (or the session was superseded).
    Empty,
    /// A tender match is stored; bid review may be requested.
    Matched,
    /// A recommendation call is outstanding.
    Recommending,
    /// Candidate suggestions are stored and a selection has been derived.
    Recommended,
    /// A suggestion is confirmed; company details are required.
    AwaitingCompany,
    /// The final document was generated.
    Finalized,
    /// The proposal summary was persisted to history.
    Recorded,
}

impl Default for WorkflowStage {
    fn default() -> Self {
        Self::Empty
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Matched => write!(f, "Matched"),
            Self::Recommending => write!(f, "Recommending"),
            Self::Recommended => write!(f, "Recommended"),
            Self::AwaitingCompany => write!(f, "AwaitingCompany"),
            Self::Finalized => write!(f, "Finalized"),
            Self::Recorded => write!(f, "Recorded"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_consistency_within_tolerance() {
        let q = PricingQuote {
            per_litre: 101.53,
            quantity_litres: 8000.0,
            total_cost: 812_240.0,
        };
        assert!(q.is_consistent());
    }

    #[test]
    fn pricing_consistency_rejects_drift() {
        let q = PricingQuote {
            per_litre: 100.0,
            quantity_litres: 8000.0,
            total_cost: 812_240.0,
        };
        assert!(!q.is_consistent());
    }

    #[test]
    fn company_profile_reports_first_missing_field() {
        let mut c = CompanyProfile {
            name: "Acme Coatings".into(),
            address: "12 Industrial Estate".into(),
            contact_person: "   ".into(),
            email: "bids@acme.example".into(),
            phone: "".into(),
        };
        assert_eq!(c.first_missing_field(), Some("contact_person"));
        c.contact_person = "R. Iyer".into();
        assert_eq!(c.first_missing_field(), Some("phone"));
        c.phone = "+91 80 0000 0000".into();
        assert_eq!(c.first_missing_field(), None);
    }

    #[test]
    fn product_ref_uses_wire_name_for_type() {
        let json =
            r#"{ "name": "UltraCoat Matte", "type": "interior emulsion", "price_per_litre": 82.5 }"#;
        let p: ProductRef = serde_json::from_str(json).unwrap();
        assert_eq!(p.product_type, "interior emulsion");
        let back = serde_json::to_value(&p).unwrap();
        assert_eq!(back["type"], "interior emulsion");
    }

    #[test]
    fn proposal_outcome_is_lowercase_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&ProposalOutcome::Won).unwrap(),
            "\"won\""
        );
        let o: ProposalOutcome = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(o, ProposalOutcome::Pending);
    }
}
