//! Verdict derivation.
//!
//! Turns an [`Assessment`] (the reasoning service's raw answer) into a
//! [`LenderVerdict`] the engine can trust. The service is treated as an
//! oracle that may omit criteria, invent keys or disagree with itself, so
//! everything structural is rebuilt from the lender definition:
//!
//! - evaluations follow the lender's criterion order, one per criterion
//! - expected and actual values come from the lender and the application
//! - criteria the service skipped are judged by the comparator
//! - `matched` is recomputed from confidence and the required criteria

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::application::Application;
use crate::comparator::{assess_criterion, evaluate_criterion};
use crate::lender::Lender;
use crate::types::{CriterionEvaluation, FailureKind, LenderVerdict, VerdictSource};

/// Prefix for reasoning on criteria the service did not evaluate.
pub const UNVERIFIED_REASONING: &str = "unable to verify automatically";

/// Errors that make an assessment unusable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeriveError {
    #[error("response carried no criteria evaluations and no reasoning")]
    Empty,

    #[error("confidence score is not a finite number: {0}")]
    NonFiniteConfidence(f64),
}

impl DeriveError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            DeriveError::Empty => FailureKind::EmptyResponse,
            DeriveError::NonFiniteConfidence(_) => FailureKind::MalformedResponse,
        }
    }
}

/// One criterion as judged by the reasoning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessedCriterion {
    pub criteria_key: String,
    pub met: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub reasoning: String,
}

/// The reasoning service's answer for one lender, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Advisory only; the engine derives its own match decision
    #[serde(default)]
    pub overall_match: Option<bool>,

    pub confidence_score: f64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub overall_reasoning: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub criteria_evaluations: Vec<AssessedCriterion>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub improvement_suggestions: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Assessment {
    /// Judge every criterion with the comparator alone.
    ///
    /// Confidence is the fraction of criteria met. `overall_match` is true
    /// when every required criterion is met.
    pub fn from_comparator(application: &Application, lender: &Lender) -> Self {
        let evaluations: Vec<CriterionEvaluation> = lender
            .criteria
            .iter()
            .map(|c| evaluate_criterion(c, application))
            .collect();

        let confidence_score = met_fraction(&evaluations);
        let failed: Vec<&str> = evaluations
            .iter()
            .filter(|e| e.is_required && !e.met)
            .map(|e| e.display_name.as_str())
            .collect();

        let overall_reasoning = summarize(&evaluations, &failed);

        Self {
            overall_match: Some(failed.is_empty()),
            confidence_score,
            overall_reasoning,
            criteria_evaluations: evaluations
                .into_iter()
                .map(|e| AssessedCriterion {
                    criteria_key: e.criteria_key,
                    met: e.met,
                    reasoning: e.reasoning,
                })
                .collect(),
            improvement_suggestions: vec![],
        }
    }

    fn is_empty(&self) -> bool {
        self.criteria_evaluations.is_empty() && self.overall_reasoning.trim().is_empty()
    }
}

/// Fraction of evaluations met, 0.0 when there are none.
pub(crate) fn met_fraction(evaluations: &[CriterionEvaluation]) -> f64 {
    if evaluations.is_empty() {
        return 0.0;
    }
    let met = evaluations.iter().filter(|e| e.met).count();
    met as f64 / evaluations.len() as f64
}

pub(crate) fn summarize(evaluations: &[CriterionEvaluation], failed_required: &[&str]) -> String {
    let met = evaluations.iter().filter(|e| e.met).count();
    if failed_required.is_empty() {
        format!(
            "{} of {} criteria met; all required criteria satisfied",
            met,
            evaluations.len()
        )
    } else {
        format!(
            "{} of {} criteria met; required criteria not met: {}",
            met,
            evaluations.len(),
            failed_required.join(", ")
        )
    }
}

/// Validate an assessment and derive the lender verdict.
///
/// Finite confidence outside [0, 1] is clamped. Response keys the lender does
/// not define are dropped; for duplicated keys the first occurrence wins.
pub fn derive_verdict(
    application: &Application,
    lender: &Lender,
    assessment: Assessment,
    match_threshold: f64,
    source: VerdictSource,
) -> Result<LenderVerdict, DeriveError> {
    if assessment.is_empty() {
        return Err(DeriveError::Empty);
    }

    let raw_confidence = assessment.confidence_score;
    if !raw_confidence.is_finite() {
        return Err(DeriveError::NonFiniteConfidence(raw_confidence));
    }

    // `+ 0.0` turns -0.0 into 0.0 so ranking ties stay ties.
    let confidence_score = raw_confidence.clamp(0.0, 1.0) + 0.0;
    if confidence_score != raw_confidence {
        tracing::warn!(
            lender_id = %lender.id,
            confidence = raw_confidence,
            "Confidence score outside [0, 1], clamping"
        );
    }

    let unknown = assessment
        .criteria_evaluations
        .iter()
        .filter(|a| !lender.criteria.iter().any(|c| c.key == a.criteria_key.trim()))
        .count();
    if unknown > 0 {
        tracing::debug!(
            lender_id = %lender.id,
            unknown,
            "Dropping evaluations for criteria the lender does not define"
        );
    }

    let criteria_evaluations: Vec<CriterionEvaluation> = lender
        .criteria
        .iter()
        .map(|criterion| {
            let assessed = assessment
                .criteria_evaluations
                .iter()
                .find(|a| a.criteria_key.trim() == criterion.key);

            let (met, reasoning) = match assessed {
                Some(a) if a.reasoning.trim().is_empty() => {
                    (a.met, assess_criterion(criterion, application).reasoning)
                }
                Some(a) => (a.met, a.reasoning.clone()),
                None => {
                    let comparison = assess_criterion(criterion, application);
                    (
                        comparison.met,
                        format!("{}: {}", UNVERIFIED_REASONING, comparison.reasoning),
                    )
                }
            };

            CriterionEvaluation {
                criteria_key: criterion.key.clone(),
                display_name: criterion.display_name.clone(),
                required_value: criterion.expected_value.clone(),
                actual_value: criterion.resolve(application).cloned(),
                met,
                is_required: criterion.is_required,
                reasoning,
            }
        })
        .collect();

    let required_met = criteria_evaluations
        .iter()
        .all(|e| !e.is_required || e.met);
    let matched = confidence_score >= match_threshold && required_met;

    if let Some(advisory) = assessment.overall_match {
        if advisory != matched {
            tracing::debug!(
                lender_id = %lender.id,
                advisory,
                matched,
                "Reasoning service match flag disagrees with derived decision"
            );
        }
    }

    let improvement_suggestions = assessment
        .improvement_suggestions
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    Ok(LenderVerdict {
        lender_id: lender.id.clone(),
        lender_name: lender.name.clone(),
        confidence_score,
        overall_reasoning: assessment.overall_reasoning,
        criteria_evaluations,
        improvement_suggestions,
        matched,
        source,
    })
}
