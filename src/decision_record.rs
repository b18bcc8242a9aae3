// =============================================================================
// Decision Record Store — session-scoped aggregate behind one lock
// =============================================================================
//
// One explicit aggregate instead of independently-keyed session slots: the
// tender match, the latest recommendation set, and the chosen suggestion
// live in a single record so that a field update is atomic with respect to
// the whole record. Every mutating method takes the write lock exactly
// once; a chosen suggestion derived from a stale recommendation set is
// never observable.
//
// Re-selection is an explicit recomputation step invoked here after any
// mutation of the recommendation set or the profit threshold, not an
// observer graph. An operator confirmation pins the chosen suggestion
// until the candidate set changes again.
// =============================================================================

use parking_lot::RwLock;
use serde::Serialize;

use crate::selector::select_bid;
use crate::types::{BidRecommendationSet, BidSuggestion, TenderMatch};

/// Default minimum acceptable profit margin percentage.
pub const DEFAULT_PROFIT_THRESHOLD_PCT: f64 = 3.0;

/// The session-scoped decision aggregate carried across workflow stages.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    /// Session generation, bumped whenever the record is superseded or
    /// cleared. Results of remote calls started under an older generation
    /// must not be written into this record.
    pub session: u64,
    pub tender_match: Option<TenderMatch>,
    pub recommendation_set: Option<BidRecommendationSet>,
    pub chosen_suggestion: Option<BidSuggestion>,
    /// True once the operator has explicitly confirmed a suggestion;
    /// automatic re-selection is suppressed until the candidate set
    /// changes again.
    pub suggestion_confirmed: bool,
    pub profit_threshold_pct: f64,
}

impl DecisionRecord {
    fn empty(session: u64, profit_threshold_pct: f64) -> Self {
        Self {
            session,
            tender_match: None,
            recommendation_set: None,
            chosen_suggestion: None,
            suggestion_confirmed: false,
            profit_threshold_pct,
        }
    }

    /// Re-derive `chosen_suggestion` from the current set and threshold.
    /// A missing or empty set clears the selection.
    fn reselect(&mut self) {
        self.chosen_suggestion = self
            .recommendation_set
            .as_ref()
            .and_then(|set| select_bid(&set.suggestions, self.profit_threshold_pct).ok())
            .cloned();
    }
}

/// Shared store owning the single active [`DecisionRecord`].
#[derive(Debug)]
pub struct DecisionStore {
    inner: RwLock<DecisionRecord>,
}

impl DecisionStore {
    pub fn new(default_threshold_pct: f64) -> Self {
        Self {
            inner: RwLock::new(DecisionRecord::empty(0, default_threshold_pct)),
        }
    }

    /// Cloned view of the whole record.
    pub fn snapshot(&self) -> DecisionRecord {
        self.inner.read().clone()
    }

    /// Current session generation. Capture before a remote call; a result
    /// arriving under a different generation belongs to a superseded
    /// session and must be discarded.
    pub fn current_session(&self) -> u64 {
        self.inner.read().session
    }

    /// Supersede the session with a freshly ingested tender. Candidate and
    /// selection state is discarded and the generation is bumped; the
    /// profit threshold is an operator preference and survives.
    pub fn replace_tender(&self, tender: TenderMatch) {
        let mut rec = self.inner.write();
        let threshold = rec.profit_threshold_pct;
        *rec = DecisionRecord::empty(rec.session + 1, threshold);
        rec.tender_match = Some(tender);
    }

    /// Store a recommendation set obtained under `session` and re-derive
    /// the selection. The candidate set changed, so any confirmation pin
    /// is cleared. Returns `false` (record untouched) when the session was
    /// superseded while the set was being computed.
    pub fn set_recommendation(&self, set: BidRecommendationSet, session: u64) -> bool {
        let mut rec = self.inner.write();
        if rec.session != session {
            return false;
        }
        rec.recommendation_set = Some(set);
        rec.suggestion_confirmed = false;
        rec.reselect();
        true
    }

    /// Update the profit threshold. Re-selection runs unless the operator
    /// has pinned a confirmed suggestion.
    pub fn set_profit_threshold(&self, threshold_pct: f64) {
        let mut rec = self.inner.write();
        rec.profit_threshold_pct = threshold_pct;
        if !rec.suggestion_confirmed {
            rec.reselect();
        }
    }

    /// Pin the suggestion at `index` as the authoritative choice. Returns
    /// the pinned suggestion, or `None` when there is no recommendation
    /// set or the index is out of bounds (the record is left untouched).
    pub fn confirm_suggestion(&self, index: usize) -> Option<BidSuggestion> {
        let mut rec = self.inner.write();
        let chosen = rec
            .recommendation_set
            .as_ref()
            .and_then(|set| set.suggestions.get(index))
            .cloned()?;
        rec.chosen_suggestion = Some(chosen.clone());
        rec.suggestion_confirmed = true;
        Some(chosen)
    }

    /// Reset the record to empty, keeping the current threshold. Bumps the
    /// generation so in-flight results against the old session are
    /// discarded.
    pub fn clear(&self) {
        let mut rec = self.inner.write();
        let threshold = rec.profit_threshold_pct;
        *rec = DecisionRecord::empty(rec.session + 1, threshold);
    }
}

impl Default for DecisionStore {
    fn default() -> Self {
        Self::new(DEFAULT_PROFIT_THRESHOLD_PCT)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchCandidate, PricingQuote, ProductRef};

    fn suggestion(discount: f64, margin: f64, win: f64) -> BidSuggestion {
        BidSuggestion {
            discount_pct: discount,
            per_litre: 100.0,
            total: 100_000.0,
            profit_margin_pct: margin,
            expected_win_prob: win,
        }
    }

    fn rec_set() -> BidRecommendationSet {
        BidRecommendationSet {
            suggestions: vec![
                suggestion(0.0, 2.0, 0.4),
                suggestion(5.0, 4.0, 0.3),
                suggestion(10.0, 5.0, 0.6),
            ],
        }
    }

    fn tender() -> TenderMatch {
        let product = ProductRef {
            name: "UltraCoat Matte".into(),
            product_type: "interior emulsion".into(),
            finish: "matte".into(),
            pack: "20L".into(),
            coverage: "120".into(),
            price_per_litre: 82.5,
        };
        let pricing = PricingQuote {
            per_litre: 101.5,
            quantity_litres: 8000.0,
            total_cost: 812_000.0,
        };
        TenderMatch {
            extracted_text: "Supply of 8000 litres interior emulsion".into(),
            quantity_litres: 8000.0,
            top_matches: vec![],
            chosen: Some(MatchCandidate {
                product,
                score: 0.85,
                pricing,
                gaps: vec![],
            }),
        }
    }

    #[test]
    fn starts_empty_with_default_threshold() {
        let store = DecisionStore::default();
        let rec = store.snapshot();
        assert!(rec.tender_match.is_none());
        assert!(rec.recommendation_set.is_none());
        assert!(rec.chosen_suggestion.is_none());
        assert!(!rec.suggestion_confirmed);
        assert_eq!(rec.profit_threshold_pct, 3.0);
    }

    #[test]
    fn set_recommendation_derives_a_selection() {
        let store = DecisionStore::default();
        store.set_recommendation(rec_set(), store.current_session());
        let rec = store.snapshot();
        let chosen = rec.chosen_suggestion.unwrap();
        assert_eq!(chosen.profit_margin_pct, 5.0);
        assert_eq!(chosen.expected_win_prob, 0.6);
    }

    #[test]
    fn threshold_change_reselects() {
        let store = DecisionStore::default();
        store.set_recommendation(
            BidRecommendationSet {
                suggestions: vec![suggestion(0.0, 2.0, 0.9), suggestion(5.0, 6.0, 0.4)],
            },
            store.current_session(),
        );
        // at 3% only the margin-6 candidate qualifies
        assert_eq!(
            store.snapshot().chosen_suggestion.unwrap().profit_margin_pct,
            6.0
        );
        // dropping the threshold lets the higher win prob through
        store.set_profit_threshold(0.0);
        assert_eq!(
            store.snapshot().chosen_suggestion.unwrap().profit_margin_pct,
            2.0
        );
    }

    #[test]
    fn confirmation_pins_against_threshold_changes() {
        let store = DecisionStore::default();
        store.set_recommendation(rec_set(), store.current_session());
        let pinned = store.confirm_suggestion(1).unwrap();
        assert_eq!(pinned.discount_pct, 5.0);

        store.set_profit_threshold(0.0);
        let rec = store.snapshot();
        assert!(rec.suggestion_confirmed);
        assert_eq!(rec.chosen_suggestion.unwrap().discount_pct, 5.0);
    }

    #[test]
    fn new_candidate_set_clears_the_pin() {
        let store = DecisionStore::default();
        store.set_recommendation(rec_set(), store.current_session());
        store.confirm_suggestion(0).unwrap();

        store.set_recommendation(rec_set(), store.current_session());
        let rec = store.snapshot();
        assert!(!rec.suggestion_confirmed);
        // automatic selection is back in force
        assert_eq!(rec.chosen_suggestion.unwrap().expected_win_prob, 0.6);
    }

    #[test]
    fn confirm_out_of_range_changes_nothing() {
        let store = DecisionStore::default();
        store.set_recommendation(rec_set(), store.current_session());
        let before = store.snapshot();
        assert!(store.confirm_suggestion(7).is_none());
        let after = store.snapshot();
        assert!(!after.suggestion_confirmed);
        assert_eq!(
            before.chosen_suggestion.unwrap(),
            after.chosen_suggestion.unwrap()
        );
    }

    #[test]
    fn confirm_without_recommendation_fails() {
        let store = DecisionStore::default();
        assert!(store.confirm_suggestion(0).is_none());
    }

    #[test]
    fn replace_tender_discards_candidates_but_keeps_threshold() {
        let store = DecisionStore::default();
        store.set_profit_threshold(7.5);
        store.set_recommendation(rec_set(), store.current_session());
        store.confirm_suggestion(2).unwrap();

        store.replace_tender(tender());
        let rec = store.snapshot();
        assert!(rec.tender_match.is_some());
        assert!(rec.recommendation_set.is_none());
        assert!(rec.chosen_suggestion.is_none());
        assert!(!rec.suggestion_confirmed);
        assert_eq!(rec.profit_threshold_pct, 7.5);
    }

    #[test]
    fn recommendation_for_a_superseded_session_is_rejected() {
        let store = DecisionStore::default();
        store.replace_tender(tender());
        let stale = store.current_session();

        // a new tender arrives while the recommendation is being computed
        store.replace_tender(tender());
        assert!(!store.set_recommendation(rec_set(), stale));
        let rec = store.snapshot();
        assert!(rec.recommendation_set.is_none());
        assert!(rec.chosen_suggestion.is_none());

        // a result for the live session is accepted
        assert!(store.set_recommendation(rec_set(), store.current_session()));
        assert!(store.snapshot().recommendation_set.is_some());
    }

    #[test]
    fn supersession_bumps_the_session_generation() {
        let store = DecisionStore::default();
        let s0 = store.current_session();
        store.replace_tender(tender());
        let s1 = store.current_session();
        assert!(s1 > s0);
        store.clear();
        assert!(store.current_session() > s1);
    }

    #[test]
    fn clear_resets_everything_but_the_threshold() {
        let store = DecisionStore::default();
        store.set_profit_threshold(6.0);
        store.replace_tender(tender());
        store.set_recommendation(rec_set(), store.current_session());

        store.clear();
        let rec = store.snapshot();
        assert!(rec.tender_match.is_none());
        assert!(rec.recommendation_set.is_none());
        assert!(rec.chosen_suggestion.is_none());
        assert_eq!(rec.profit_threshold_pct, 6.0);
    }

    #[test]
    fn empty_recommendation_clears_the_selection() {
        let store = DecisionStore::default();
        store.set_recommendation(rec_set(), store.current_session());
        assert!(store.snapshot().chosen_suggestion.is_some());
        store.set_recommendation(BidRecommendationSet::default(), store.current_session());
        assert!(store.snapshot().chosen_suggestion.is_none());
    }
}
