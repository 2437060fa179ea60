//! Aggregator: Combines per-lender outcomes into the final result.
//!
//! Policy is fixed:
//! 1. Verdicts are partitioned by their derived `matched` flag
//! 2. Each partition is ranked by confidence, highest first, ties broken by
//!    lender name then id
//! 3. Failures are carried through untouched, ordered by lender id
//!
//! The same inputs in any order produce the same result apart from the
//! timestamp.

use std::cmp::Ordering;

use chrono::Utc;

use crate::types::{EvaluationResult, FailedLender, LenderVerdict};

/// The Aggregator builds an `EvaluationResult` from lender outcomes.
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    /// Aggregate verdicts and failures into a final evaluation result.
    ///
    /// # Arguments
    ///
    /// * `application_id` - The evaluated application
    /// * `verdicts` - Successful lender verdicts, in any order
    /// * `failures` - Lenders that produced no verdict
    pub fn aggregate(
        &self,
        application_id: &str,
        verdicts: Vec<LenderVerdict>,
        mut failures: Vec<FailedLender>,
    ) -> EvaluationResult {
        let (mut matched, mut unmatched): (Vec<_>, Vec<_>) =
            verdicts.into_iter().partition(|v| v.matched);

        for verdict in unmatched.iter_mut() {
            self.suggest_improvements(verdict);
        }

        matched.sort_by(rank);
        unmatched.sort_by(rank);
        failures.sort_by(|a, b| a.lender_id.cmp(&b.lender_id));

        EvaluationResult {
            application_id: application_id.to_string(),
            total_lenders_evaluated: matched.len() + unmatched.len(),
            matched_lenders: matched,
            unmatched_lenders: unmatched,
            failed_lenders: failures,
            analysis_timestamp: Utc::now(),
        }
    }

    /// Give an unmatched verdict one suggestion per failed required
    /// criterion when the service offered none.
    fn suggest_improvements(&self, verdict: &mut LenderVerdict) {
        if !verdict.improvement_suggestions.is_empty() {
            return;
        }

        verdict.improvement_suggestions = verdict
            .failed_required()
            .map(|e| format!("Improve {}: {}", e.display_name, e.reasoning))
            .collect();
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Confidence descending, then name ascending, then id ascending.
///
/// Scores are compared with signed zeros folded, so 0.0 and -0.0 tie.
fn rank(a: &LenderVerdict, b: &LenderVerdict) -> Ordering {
    (b.confidence_score + 0.0)
        .total_cmp(&(a.confidence_score + 0.0))
        .then_with(|| a.lender_name.cmp(&b.lender_name))
        .then_with(|| a.lender_id.cmp(&b.lender_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lender::CriterionValue;
    use crate::types::{CriterionEvaluation, FailureKind, VerdictSource};
    use proptest::prelude::*;

    fn verdict(id: &str, name: &str, confidence: f64, matched: bool) -> LenderVerdict {
        LenderVerdict {
            lender_id: id.to_string(),
            lender_name: name.to_string(),
            confidence_score: confidence,
            overall_reasoning: String::new(),
            criteria_evaluations: vec![],
            improvement_suggestions: vec![],
            matched,
            source: VerdictSource::Reasoning,
        }
    }

    fn failed_required(display_name: &str, reasoning: &str) -> CriterionEvaluation {
        CriterionEvaluation {
            criteria_key: display_name.to_lowercase(),
            display_name: display_name.to_string(),
            required_value: CriterionValue::Number(650.0),
            actual_value: None,
            met: false,
            is_required: true,
            reasoning: reasoning.to_string(),
        }
    }

    #[test]
    fn test_partition_and_total() {
        let verdicts = vec![
            verdict("a", "A", 0.9, true),
            verdict("b", "B", 0.3, false),
            verdict("c", "C", 0.7, true),
        ];
        let failures = vec![FailedLender::new("d", "D", FailureKind::Timeout, "timed out")];

        let result = Aggregator::new().aggregate("app-1", verdicts, failures);

        assert_eq!(result.matched_lenders.len(), 2);
        assert_eq!(result.unmatched_lenders.len(), 1);
        assert_eq!(result.failed_lenders.len(), 1);
        assert_eq!(result.total_lenders_evaluated, 3);
        assert_eq!(result.application_id, "app-1");
    }

    #[test]
    fn test_ordering_by_confidence_then_name() {
        let verdicts = vec![
            verdict("z", "Zenith", 0.8, true),
            verdict("a", "Apex", 0.8, true),
            verdict("m", "Meridian", 0.95, true),
        ];

        let result = Aggregator::new().aggregate("app", verdicts, vec![]);
        let names: Vec<_> = result.matched_lenders.iter().map(|v| v.lender_name.as_str()).collect();

        assert_eq!(names, vec!["Meridian", "Apex", "Zenith"]);
    }

    #[test]
    fn test_signed_zero_scores_tie_by_name() {
        let verdicts = vec![
            verdict("z", "Zeta", 0.0, false),
            verdict("a", "Alpha", -0.0, false),
        ];

        let result = Aggregator::new().aggregate("app", verdicts, vec![]);
        let names: Vec<_> = result
            .unmatched_lenders
            .iter()
            .map(|v| v.lender_name.as_str())
            .collect();

        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn test_empty_inputs() {
        let result = Aggregator::new().aggregate("app", vec![], vec![]);
        assert!(result.matched_lenders.is_empty());
        assert_eq!(result.total_lenders_evaluated, 0);
    }

    #[test]
    fn test_suggestions_synthesized_for_failed_required() {
        let mut v = verdict("a", "Apex", 0.4, false);
        v.criteria_evaluations = vec![failed_required(
            "Minimum FICO Score",
            "640 is below the minimum of 650",
        )];

        let result = Aggregator::new().aggregate("app", vec![v], vec![]);

        assert_eq!(
            result.unmatched_lenders[0].improvement_suggestions,
            vec!["Improve Minimum FICO Score: 640 is below the minimum of 650".to_string()]
        );
    }

    #[test]
    fn test_existing_suggestions_are_kept() {
        let mut v = verdict("a", "Apex", 0.4, false);
        v.criteria_evaluations = vec![failed_required("Minimum FICO Score", "too low")];
        v.improvement_suggestions = vec!["Add a co-signer".to_string()];

        let result = Aggregator::new().aggregate("app", vec![v], vec![]);

        assert_eq!(
            result.unmatched_lenders[0].improvement_suggestions,
            vec!["Add a co-signer".to_string()]
        );
    }

    #[test]
    fn test_failures_sorted_by_id() {
        let failures = vec![
            FailedLender::new("c", "C", FailureKind::Timeout, ""),
            FailedLender::new("a", "A", FailureKind::TransportError, ""),
        ];
        let result = Aggregator::new().aggregate("app", vec![], failures);
        let ids: Vec<_> = result.failed_lenders.iter().map(|f| f.lender_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    proptest! {
        #[test]
        fn prop_partitions_sorted_and_order_independent(
            entries in proptest::collection::vec((0u8..20, 0.0f64..=1.0, any::<bool>()), 0..12)
        ) {
            let verdicts: Vec<LenderVerdict> = entries
                .iter()
                .enumerate()
                .map(|(i, (name, confidence, matched))| {
                    verdict(&format!("l{}", i), &format!("Lender {}", name), *confidence, *matched)
                })
                .collect();
            let mut reversed = verdicts.clone();
            reversed.reverse();

            let aggregator = Aggregator::new();
            let forward = aggregator.aggregate("app", verdicts, vec![]);
            let backward = aggregator.aggregate("app", reversed, vec![]);

            for partition in [&forward.matched_lenders, &forward.unmatched_lenders] {
                for pair in partition.windows(2) {
                    prop_assert!(pair[0].confidence_score >= pair[1].confidence_score);
                }
            }
            prop_assert_eq!(&forward.matched_lenders, &backward.matched_lenders);
            prop_assert_eq!(&forward.unmatched_lenders, &backward.unmatched_lenders);
            prop_assert_eq!(forward.total_lenders_evaluated, entries.len());
        }
    }
}
