//! # lendmatch-core
//!
//! Deterministic domain logic for lender eligibility evaluation.
//!
//! This crate answers, for one application and many lenders:
//! - Which criteria does the applicant meet?
//! - Which lenders match, and how strongly?
//! - What would the applicant need to improve?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input always produces same output
//! 2. **No I/O**: Reasoning-service calls live in `lendmatch-runtime`
//! 3. **Complete**: Every lender lands in exactly one result partition
//! 4. **Required criteria dominate**: No lender matches with a failed
//!    required criterion, whatever its confidence
//!
//! ## Example
//!
//! ```rust,ignore
//! use lendmatch_core::{evaluate_deterministic, Application, LenderCatalog};
//!
//! let lenders = LenderCatalog::from_yaml_file("lenders.yaml")?.into_lenders();
//! let application = Application::from_json_str("app-1", &std::fs::read_to_string("app.json")?)?;
//! let result = evaluate_deterministic(&application, &lenders, 0.6)?;
//!
//! for verdict in &result.matched_lenders {
//!     println!("{}: {:.2}", verdict.lender_name, verdict.confidence_score);
//! }
//! ```

pub mod aggregator;
pub mod application;
pub mod comparator;
pub mod lender;
pub mod prefilter;
pub mod types;
pub mod verdict;

// Re-export main types at crate root
pub use aggregator::Aggregator;
pub use application::{Application, FieldValue, IntakeError};
pub use comparator::{assess_criterion, compare, evaluate_criterion, Comparison};
pub use lender::{
    CatalogError, ComparisonMode, CriterionDefinition, CriterionValue, Lender, LenderCatalog,
    ValueType,
};
pub use prefilter::prefilter;
pub use types::{
    CriterionEvaluation, EvaluationResult, FailedLender, FailureKind, LenderVerdict,
    VerdictSource,
};
pub use verdict::{derive_verdict, AssessedCriterion, Assessment, DeriveError};

use std::collections::HashSet;
use thiserror::Error;

/// Errors that reject a whole evaluation request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("No lenders supplied")]
    NoLenders,

    #[error("Application id is empty")]
    MissingApplicationId,

    #[error("Duplicate lender id: {0}")]
    DuplicateLender(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Check the request-level preconditions of an evaluation.
pub fn validate_batch(
    application: &Application,
    lenders: &[Lender],
) -> Result<(), ValidationError> {
    if application.id.trim().is_empty() {
        return Err(ValidationError::MissingApplicationId);
    }
    if lenders.is_empty() {
        return Err(ValidationError::NoLenders);
    }

    let mut seen = HashSet::new();
    for lender in lenders {
        if !seen.insert(lender.id.as_str()) {
            return Err(ValidationError::DuplicateLender(lender.id.clone()));
        }
    }
    Ok(())
}

/// Evaluate an application with the comparator alone.
///
/// Every lender is judged by [`Assessment::from_comparator`]; lenders
/// without criteria are reported as `no_criteria` failures.
///
/// # Arguments
///
/// * `application` - The normalized application
/// * `lenders` - Lender snapshot, ids unique
/// * `match_threshold` - Minimum confidence for a match (0.0 - 1.0)
pub fn evaluate_deterministic(
    application: &Application,
    lenders: &[Lender],
    match_threshold: f64,
) -> Result<EvaluationResult, ValidationError> {
    validate_batch(application, lenders)?;
    if !(0.0..=1.0).contains(&match_threshold) {
        return Err(ValidationError::InvalidConfig(format!(
            "match_threshold must be within [0, 1], got {}",
            match_threshold
        )));
    }

    let mut verdicts = Vec::with_capacity(lenders.len());
    let mut failures = Vec::new();

    for lender in lenders {
        if lender.criteria.is_empty() {
            failures.push(FailedLender::new(
                &lender.id,
                &lender.name,
                FailureKind::NoCriteria,
                "lender has no criteria",
            ));
            continue;
        }

        let assessment = Assessment::from_comparator(application, lender);
        match derive_verdict(
            application,
            lender,
            assessment,
            match_threshold,
            VerdictSource::Fallback,
        ) {
            Ok(verdict) => verdicts.push(verdict),
            Err(e) => failures.push(FailedLender::new(
                &lender.id,
                &lender.name,
                e.failure_kind(),
                e.to_string(),
            )),
        }
    }

    Ok(Aggregator::new().aggregate(&application.id, verdicts, failures))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LENDERS: &str = r#"
lenders:
  - id: apex
    name: Apex Commercial Capital
    criteria:
      - key: min_fico_score
        display_name: Minimum FICO Score
        expected_value: 650
        value_type: number
      - key: allowed_states
        display_name: Allowed States
        expected_value: [TX, CA, NY]
        value_type: array
        field: state
  - id: stearns
    name: Stearns Bank
    criteria:
      - key: min_fico_score
        display_name: Minimum FICO Score
        expected_value: 720
        value_type: number
  - id: empty
    name: Empty Lender
    criteria: []
"#;

    fn application() -> Application {
        Application::new("app-1")
            .with_field("fico_score", 700)
            .with_field("state", "CA")
    }

    #[test]
    fn test_deterministic_evaluation() {
        let lenders = LenderCatalog::from_yaml(LENDERS).unwrap().into_lenders();
        let result = evaluate_deterministic(&application(), &lenders, 0.6).unwrap();

        assert_eq!(result.matched_lenders.len(), 1);
        assert_eq!(result.matched_lenders[0].lender_id, "apex");
        assert_eq!(result.unmatched_lenders[0].lender_id, "stearns");
        assert_eq!(result.failed_lenders[0].error_kind, FailureKind::NoCriteria);
        assert_eq!(result.total_lenders_evaluated, 2);
        assert_eq!(result.lender_ids().len(), lenders.len());
    }

    #[test]
    fn test_validate_batch() {
        let app = application();
        assert_eq!(validate_batch(&app, &[]), Err(ValidationError::NoLenders));

        let dup = vec![Lender::new("a", "A"), Lender::new("a", "A again")];
        assert_eq!(
            validate_batch(&app, &dup),
            Err(ValidationError::DuplicateLender("a".to_string()))
        );

        let anonymous = Application::new("  ");
        assert_eq!(
            validate_batch(&anonymous, &[Lender::new("a", "A")]),
            Err(ValidationError::MissingApplicationId)
        );
    }

    #[test]
    fn test_invalid_threshold() {
        let lenders = vec![Lender::new("a", "A")];
        assert!(matches!(
            evaluate_deterministic(&application(), &lenders, 1.5),
            Err(ValidationError::InvalidConfig(_))
        ));
    }
}
