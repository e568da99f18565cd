//! Parlay selection: rank predictions by confidence and bundle the top picks.

use serde::Serialize;

use super::ensemble::EnsembleResult;

/// Combined confidence above which a parlay is recommended.
const RECOMMEND_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Serialize)]
pub struct ParlaySelection {
    pub selections: Vec<EnsembleResult>,
    pub num_picks: usize,
    pub combined_confidence: f64,
    /// `1 / combined_confidence`; absent when the combined confidence is zero
    pub estimated_odds: Option<f64>,
    pub recommended: bool,
    /// Accepted and echoed; selection does not currently depend on it.
    pub target_odds: Option<f64>,
    /// Contests requested but not predicted, with the reason
    pub skipped: Vec<(i64, String)>,
}

/// Pick the `max_selections` most confident results (stable on ties).
pub fn optimize(
    mut results: Vec<EnsembleResult>,
    max_selections: usize,
    target_odds: Option<f64>,
) -> ParlaySelection {
    // sort_by is stable: equal confidences keep their input order
    results.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(max_selections);

    let combined_confidence = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|r| r.confidence).product()
    };
    let estimated_odds = if combined_confidence > 0.0 {
        Some(1.0 / combined_confidence)
    } else {
        None
    };

    ParlaySelection {
        num_picks: results.len(),
        selections: results,
        combined_confidence,
        estimated_odds,
        recommended: combined_confidence > RECOMMEND_THRESHOLD,
        target_odds,
        skipped: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::ensemble::{EnsemblePredictor, FailurePolicy};
    use crate::predictor::classifier::ClassifierRegistry;
    use crate::predictor::features::tests::make_contest;
    use crate::predictor::features::MatchupContext;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn result(id: i64, confidence: f64) -> EnsembleResult {
        let predictor = EnsemblePredictor::new(Arc::new(ClassifierRegistry::empty()), FailurePolicy::KeepWeights);
        let mut r = predictor.predict(&make_contest(id), &MatchupContext::default(), vec![]);
        r.confidence = confidence;
        r
    }

    fn ids(p: &ParlaySelection) -> Vec<i64> {
        p.selections.iter().map(|r| r.contest_id).collect()
    }

    #[test]
    fn selects_top_three_by_confidence() {
        let input = vec![
            result(1, 0.6),
            result(2, 0.9),
            result(3, 0.5),
            result(4, 0.7),
            result(5, 0.8),
        ];
        let p = optimize(input, 3, None);
        assert_eq!(ids(&p), vec![2, 5, 4]);
        assert_eq!(p.num_picks, 3);
        assert_relative_eq!(p.combined_confidence, 0.504, epsilon = 1e-9);
        assert_relative_eq!(p.estimated_odds.unwrap(), 1.0 / 0.504, epsilon = 1e-9);
        assert!(!p.recommended);
    }

    #[test]
    fn ties_keep_input_order() {
        let p = optimize(vec![result(1, 0.7), result(2, 0.8), result(3, 0.7), result(4, 0.7)], 3, None);
        assert_eq!(ids(&p), vec![2, 1, 3]);
    }

    #[test]
    fn recommended_above_threshold() {
        let p = optimize(vec![result(1, 0.9), result(2, 0.8)], 5, None);
        assert_relative_eq!(p.combined_confidence, 0.72, epsilon = 1e-9);
        assert!(p.recommended);
        assert_eq!(p.num_picks, 2);
    }

    #[test]
    fn zero_confidence_has_no_odds() {
        let p = optimize(vec![result(1, 0.9), result(2, 0.0)], 2, None);
        assert_relative_eq!(p.combined_confidence, 0.0, epsilon = 1e-12);
        assert!(p.estimated_odds.is_none());
        assert!(!p.recommended);
    }

    #[test]
    fn empty_selection() {
        let p = optimize(vec![], 3, Some(6.0));
        assert_eq!(p.num_picks, 0);
        assert!(p.estimated_odds.is_none());
        assert!(!p.recommended);
        let p = optimize(vec![result(1, 0.9)], 0, None);
        assert_eq!(p.num_picks, 0);
        assert_relative_eq!(p.combined_confidence, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn target_odds_does_not_change_selection() {
        let input = || vec![result(1, 0.55), result(2, 0.65), result(3, 0.75)];
        let with = optimize(input(), 2, Some(2.5));
        let without = optimize(input(), 2, None);
        assert_eq!(ids(&with), ids(&without));
        assert_eq!(with.target_odds, Some(2.5));
    }
}
