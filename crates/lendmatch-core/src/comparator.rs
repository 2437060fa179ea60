//! Criterion Comparator
//!
//! Type-aware comparison of an application value against a lender's
//! expected value. Pure and deterministic: the same inputs always produce the
//! same [`Comparison`]. Used as a cheap pre-check before the reasoning
//! service is called and to fill in criteria the service did not cover.

use crate::application::{format_number, Application, FieldValue};
use crate::lender::{ComparisonMode, CriterionDefinition, CriterionValue, ValueType};
use crate::types::CriterionEvaluation;

/// Reasoning attached to an optional criterion with no application data.
pub const NOT_APPLICABLE_REASONING: &str = "criterion not applicable, no data provided";

/// Reasoning attached to a required criterion with no application data.
pub const MISSING_REQUIRED_REASONING: &str = "required data not provided";

/// Tolerance for `exact` numeric comparisons.
const EXACT_EPSILON: f64 = 1e-9;

/// Result of comparing one value pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub met: bool,
    pub reasoning: String,

    /// True when the outcome follows from well-typed data. Missing data and
    /// type mismatches are never decisive.
    pub decisive: bool,
}

impl Comparison {
    fn decided(met: bool, reasoning: String) -> Self {
        Self {
            met,
            reasoning,
            decisive: true,
        }
    }

    fn undecided(met: bool, reasoning: impl Into<String>) -> Self {
        Self {
            met,
            reasoning: reasoning.into(),
            decisive: false,
        }
    }
}

/// Compare an application value with an expected value.
pub fn compare(
    expected: &CriterionValue,
    actual: &FieldValue,
    value_type: ValueType,
    mode: ComparisonMode,
) -> Comparison {
    match value_type {
        ValueType::Number => compare_number(expected, actual, mode),
        ValueType::Boolean => compare_flag(expected, actual, mode),
        ValueType::String => compare_text(expected, actual, mode),
        ValueType::Array => compare_list(expected, actual, mode),
    }
}

/// Compare a criterion against the application, handling absent data.
pub fn assess_criterion(criterion: &CriterionDefinition, application: &Application) -> Comparison {
    match criterion.resolve(application) {
        Some(actual) => compare(
            &criterion.expected_value,
            actual,
            criterion.value_type,
            criterion.comparison,
        ),
        None if criterion.is_required => Comparison::undecided(false, MISSING_REQUIRED_REASONING),
        None => Comparison::undecided(true, NOT_APPLICABLE_REASONING),
    }
}

/// Build a full [`CriterionEvaluation`] from the comparator alone.
pub fn evaluate_criterion(
    criterion: &CriterionDefinition,
    application: &Application,
) -> CriterionEvaluation {
    let comparison = assess_criterion(criterion, application);
    CriterionEvaluation {
        criteria_key: criterion.key.clone(),
        display_name: criterion.display_name.clone(),
        required_value: criterion.expected_value.clone(),
        actual_value: criterion.resolve(application).cloned(),
        met: comparison.met,
        is_required: criterion.is_required,
        reasoning: comparison.reasoning,
    }
}

fn mismatch(expected: &CriterionValue, actual: &FieldValue, value_type: ValueType) -> Comparison {
    Comparison::undecided(
        false,
        format!(
            "cannot compare {} value '{}' against {} criterion value '{}'",
            actual.type_name(),
            actual,
            value_type,
            expected
        ),
    )
}

fn compare_number(
    expected: &CriterionValue,
    actual: &FieldValue,
    mode: ComparisonMode,
) -> Comparison {
    let (CriterionValue::Number(required), Some(value)) = (expected, actual.as_number()) else {
        return mismatch(expected, actual, ValueType::Number);
    };
    let (required, value) = (*required, value);
    let (r, v) = (format_number(required), format_number(value));

    match mode {
        ComparisonMode::Min => {
            if value >= required {
                Comparison::decided(true, format!("{} meets the minimum of {}", v, r))
            } else {
                Comparison::decided(false, format!("{} is below the minimum of {}", v, r))
            }
        }
        ComparisonMode::Max => {
            if value <= required {
                Comparison::decided(true, format!("{} is within the maximum of {}", v, r))
            } else {
                Comparison::decided(false, format!("{} exceeds the maximum of {}", v, r))
            }
        }
        ComparisonMode::Exact => {
            if (value - required).abs() <= EXACT_EPSILON {
                Comparison::decided(true, format!("{} equals the required {}", v, r))
            } else {
                Comparison::decided(false, format!("{} does not equal the required {}", v, r))
            }
        }
        ComparisonMode::Excludes => {
            if (value - required).abs() <= EXACT_EPSILON {
                Comparison::decided(false, format!("{} is an excluded value", v))
            } else {
                Comparison::decided(true, format!("{} is not the excluded value {}", v, r))
            }
        }
    }
}

fn compare_flag(
    expected: &CriterionValue,
    actual: &FieldValue,
    mode: ComparisonMode,
) -> Comparison {
    let (CriterionValue::Flag(required), Some(value)) = (expected, actual.as_flag()) else {
        return mismatch(expected, actual, ValueType::Boolean);
    };
    let equal = value == *required;

    if mode == ComparisonMode::Excludes {
        return if equal {
            Comparison::decided(false, format!("{} is the excluded value", value))
        } else {
            Comparison::decided(true, format!("{} differs from the excluded {}", value, required))
        };
    }

    if equal {
        Comparison::decided(true, format!("{} matches the required {}", value, required))
    } else {
        Comparison::decided(false, format!("{} does not match the required {}", value, required))
    }
}

fn compare_text(
    expected: &CriterionValue,
    actual: &FieldValue,
    mode: ComparisonMode,
) -> Comparison {
    let (CriterionValue::Text(required), Some(value)) = (expected, actual.as_text()) else {
        return mismatch(expected, actual, ValueType::String);
    };
    let equal = normalize(&value) == normalize(required);

    if mode == ComparisonMode::Excludes {
        return if equal {
            Comparison::decided(false, format!("'{}' is excluded", value.trim()))
        } else {
            Comparison::decided(
                true,
                format!("'{}' is not the excluded '{}'", value.trim(), required),
            )
        };
    }

    if equal {
        Comparison::decided(true, format!("'{}' matches the required '{}'", value.trim(), required))
    } else {
        Comparison::decided(
            false,
            format!("'{}' does not match the required '{}'", value.trim(), required),
        )
    }
}

fn compare_list(
    expected: &CriterionValue,
    actual: &FieldValue,
    mode: ComparisonMode,
) -> Comparison {
    let allowed: Vec<String> = match expected {
        CriterionValue::List(items) => items.iter().map(|s| normalize(s)).collect(),
        CriterionValue::Text(single) => vec![normalize(single)],
        _ => return mismatch(expected, actual, ValueType::Array),
    };
    let excludes = mode == ComparisonMode::Excludes;

    match actual {
        FieldValue::List(items) => {
            let outside: Vec<&str> = items
                .iter()
                .filter(|item| !allowed.contains(&normalize(item)))
                .map(|s| s.as_str())
                .collect();
            let inside: Vec<&str> = items
                .iter()
                .filter(|item| allowed.contains(&normalize(item)))
                .map(|s| s.as_str())
                .collect();

            if excludes {
                if inside.is_empty() {
                    Comparison::decided(
                        true,
                        format!("none of [{}] are excluded", items.join(", ")),
                    )
                } else {
                    Comparison::decided(
                        false,
                        format!("[{}] are excluded by {}", inside.join(", "), expected),
                    )
                }
            } else if outside.is_empty() {
                Comparison::decided(
                    true,
                    format!("all of [{}] are within {}", items.join(", "), expected),
                )
            } else {
                Comparison::decided(
                    false,
                    format!("[{}] are not within {}", outside.join(", "), expected),
                )
            }
        }
        other => {
            let Some(value) = other.as_text() else {
                return mismatch(expected, actual, ValueType::Array);
            };
            let member = allowed.contains(&normalize(&value));

            let value = value.trim();
            match (excludes, member) {
                (false, true) => {
                    Comparison::decided(true, format!("'{}' is in {}", value, expected))
                }
                (false, false) => {
                    Comparison::decided(false, format!("'{}' is not in {}", value, expected))
                }
                (true, true) => {
                    Comparison::decided(false, format!("'{}' is excluded by {}", value, expected))
                }
                (true, false) => Comparison::decided(
                    true,
                    format!("'{}' is not excluded by {}", value, expected),
                ),
            }
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}
