// =============================================================================
// Bid Selector — deterministic choice among candidate pricing scenarios
// =============================================================================
//
// Pure function. Candidates whose profit margin meets the operator's
// threshold form the eligible pool; if none qualify the pool degrades to
// the full candidate set (a sub-threshold bid is still presented rather
// than failing the stage). Within the pool the highest expected win
// probability wins, with ties resolved to the earliest candidate in the
// input's original order.
//
// The store re-invokes this after every mutation of the recommendation set
// or the profit threshold, so determinism and the stable tie-break are
// load-bearing, not cosmetic.
// =============================================================================

use thiserror::Error;

use crate::types::BidSuggestion;

/// Selector precondition violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    /// `select_bid` requires at least one candidate.
    #[error("cannot select a bid from an empty candidate set")]
    EmptyCandidateSet,
}

/// Choose the bid to present from `suggestions` given a minimum acceptable
/// profit margin percentage.
///
/// Threshold ≤ 0 qualifies every candidate; a threshold above all margins
/// triggers the fallback over the full set. A singleton input always
/// returns that candidate.
pub fn select_bid(
    suggestions: &[BidSuggestion],
    threshold_pct: f64,
) -> Result<&BidSuggestion, SelectionError> {
    if suggestions.is_empty() {
        return Err(SelectionError::EmptyCandidateSet);
    }

    let qualified: Vec<&BidSuggestion> = suggestions
        .iter()
        .filter(|s| s.profit_margin_pct >= threshold_pct)
        .collect();

    let pool: Vec<&BidSuggestion> = if qualified.is_empty() {
        suggestions.iter().collect()
    } else {
        qualified
    };

    // First-wins maximum: only a strictly greater win probability replaces
    // the current best, so exact ties keep original relative order.
    let mut best = pool[0];
    for &s in &pool[1..] {
        if s.expected_win_prob > best.expected_win_prob {
            best = s;
        }
    }
    Ok(best)
}
