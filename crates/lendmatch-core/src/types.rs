//! Verdict and result types produced by an evaluation run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::FieldValue;
use crate::lender::CriterionValue;

/// Outcome of one criterion for one lender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionEvaluation {
    pub criteria_key: String,
    pub display_name: String,

    /// Expected value, taken from the lender's definition
    pub required_value: CriterionValue,

    /// Application value, `None` when the applicant supplied no data
    pub actual_value: Option<FieldValue>,

    pub met: bool,

    /// Whether the lender marks this criterion as mandatory
    pub is_required: bool,

    pub reasoning: String,
}

/// How a verdict was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// Judged by the reasoning service
    Reasoning,
    /// Short-circuited by the comparator pre-check
    Prefilter,
    /// Produced by the comparator after the reasoning service failed
    Fallback,
}

/// The full evaluation outcome for one lender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LenderVerdict {
    pub lender_id: String,
    pub lender_name: String,

    /// Overall strength of the match (0.0 - 1.0)
    pub confidence_score: f64,

    pub overall_reasoning: String,

    /// One entry per lender criterion, in the lender's order
    pub criteria_evaluations: Vec<CriterionEvaluation>,

    #[serde(default)]
    pub improvement_suggestions: Vec<String>,

    pub matched: bool,

    pub source: VerdictSource,
}

impl LenderVerdict {
    /// Required criteria that were not met.
    pub fn failed_required(&self) -> impl Iterator<Item = &CriterionEvaluation> {
        self.criteria_evaluations
            .iter()
            .filter(|e| e.is_required && !e.met)
    }

    /// Whether every required criterion was met.
    pub fn required_met(&self) -> bool {
        self.failed_required().next().is_none()
    }
}

/// Why a lender produced no verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Lender has no criteria to evaluate
    NoCriteria,
    /// Per-lender timeout or global deadline expired
    Timeout,
    /// Reasoning service unreachable or returned a non-success status
    TransportError,
    /// Response did not match the expected verdict shape
    MalformedResponse,
    /// Response carried no evaluable content
    EmptyResponse,
    /// The evaluation task panicked
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::NoCriteria => "no_criteria",
            FailureKind::Timeout => "timeout",
            FailureKind::TransportError => "transport_error",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::EmptyResponse => "empty_response",
            FailureKind::Internal => "internal",
        };
        write!(f, "{}", label)
    }
}

/// A lender that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedLender {
    pub lender_id: String,
    pub lender_name: String,
    pub error_kind: FailureKind,

    /// Detail for operators deciding whether to retry
    pub message: String,
}

impl FailedLender {
    pub fn new(
        lender_id: impl Into<String>,
        lender_name: impl Into<String>,
        error_kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            lender_id: lender_id.into(),
            lender_name: lender_name.into(),
            error_kind,
            message: message.into(),
        }
    }
}

/// Terminal output of an evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub application_id: String,

    /// Descending confidence, ties by lender name
    pub matched_lenders: Vec<LenderVerdict>,

    /// Descending confidence, ties by lender name
    pub unmatched_lenders: Vec<LenderVerdict>,

    /// `matched_lenders.len() + unmatched_lenders.len()`
    pub total_lenders_evaluated: usize,

    pub failed_lenders: Vec<FailedLender>,

    pub analysis_timestamp: DateTime<Utc>,
}

impl EvaluationResult {
    /// Every lender id present in the result, across all partitions.
    pub fn lender_ids(&self) -> Vec<&str> {
        self.matched_lenders
            .iter()
            .chain(self.unmatched_lenders.iter())
            .map(|v| v.lender_id.as_str())
            .chain(self.failed_lenders.iter().map(|f| f.lender_id.as_str()))
            .collect()
    }

    /// Find the failure entry for a lender, if any.
    pub fn failure_for(&self, lender_id: &str) -> Option<&FailedLender> {
        self.failed_lenders.iter().find(|f| f.lender_id == lender_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluation(key: &str, met: bool, is_required: bool) -> CriterionEvaluation {
        CriterionEvaluation {
            criteria_key: key.to_string(),
            display_name: key.to_string(),
            required_value: CriterionValue::Number(1.0),
            actual_value: None,
            met,
            is_required,
            reasoning: String::new(),
        }
    }

    #[test]
    fn test_failed_required_ignores_optional() {
        let verdict = LenderVerdict {
            lender_id: "l1".to_string(),
            lender_name: "L1".to_string(),
            confidence_score: 0.5,
            overall_reasoning: String::new(),
            criteria_evaluations: vec![
                evaluation("a", false, false),
                evaluation("b", true, true),
                evaluation("c", false, true),
            ],
            improvement_suggestions: vec![],
            matched: false,
            source: VerdictSource::Reasoning,
        };

        let failed: Vec<_> = verdict.failed_required().map(|e| e.criteria_key.as_str()).collect();
        assert_eq!(failed, vec!["c"]);
        assert!(!verdict.required_met());
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::TransportError).unwrap();
        assert_eq!(json, "\"transport_error\"");
        assert_eq!(FailureKind::NoCriteria.to_string(), "no_criteria");
    }
}
