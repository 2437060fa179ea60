//! Comparator pre-check.
//!
//! A lender whose required criterion fails on well-typed data cannot match,
//! whatever the reasoning service would say. Such lenders are resolved here
//! without a service call.

use crate::application::Application;
use crate::comparator::{assess_criterion, evaluate_criterion};
use crate::lender::Lender;
use crate::types::{CriterionEvaluation, LenderVerdict, VerdictSource};
use crate::verdict::{met_fraction, summarize};

/// Short-circuit a lender that fails a required criterion decisively.
///
/// Returns an unmatched verdict built from comparator evaluations of every
/// criterion, or `None` when the lender needs the reasoning service.
pub fn prefilter(application: &Application, lender: &Lender) -> Option<LenderVerdict> {
    let decisive_failure = lender.required_criteria().any(|criterion| {
        let comparison = assess_criterion(criterion, application);
        comparison.decisive && !comparison.met
    });

    if !decisive_failure {
        return None;
    }

    let criteria_evaluations: Vec<CriterionEvaluation> = lender
        .criteria
        .iter()
        .map(|c| evaluate_criterion(c, application))
        .collect();

    let failed: Vec<&str> = criteria_evaluations
        .iter()
        .filter(|e| e.is_required && !e.met)
        .map(|e| e.display_name.as_str())
        .collect();
    let overall_reasoning = summarize(&criteria_evaluations, &failed);

    Some(LenderVerdict {
        lender_id: lender.id.clone(),
        lender_name: lender.name.clone(),
        confidence_score: met_fraction(&criteria_evaluations),
        overall_reasoning,
        criteria_evaluations,
        improvement_suggestions: vec![],
        matched: false,
        source: VerdictSource::Prefilter,
    })
}
