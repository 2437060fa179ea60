//! Lenders and their eligibility criteria.
//!
//! A lender snapshot is read-only to the engine. [`LenderCatalog`] loads one
//! from YAML/JSON and checks the structural rules the engine relies on.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::{format_number, Application, FieldValue};

/// Errors that can occur when loading a lender catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Catalog validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Value a lender expects for a criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CriterionValue {
    Number(f64),
    Flag(bool),
    Text(String),
    List(Vec<String>),
}

impl fmt::Display for CriterionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CriterionValue::Number(n) => write!(f, "{}", format_number(*n)),
            CriterionValue::Flag(b) => write!(f, "{}", b),
            CriterionValue::Text(s) => write!(f, "{}", s),
            CriterionValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<f64> for CriterionValue {
    fn from(value: f64) -> Self {
        CriterionValue::Number(value)
    }
}

impl From<i32> for CriterionValue {
    fn from(value: i32) -> Self {
        CriterionValue::Number(f64::from(value))
    }
}

impl From<bool> for CriterionValue {
    fn from(value: bool) -> Self {
        CriterionValue::Flag(value)
    }
}

impl From<&str> for CriterionValue {
    fn from(value: &str) -> Self {
        CriterionValue::Text(value.to_string())
    }
}

impl From<Vec<&str>> for CriterionValue {
    fn from(value: Vec<&str>) -> Self {
        CriterionValue::List(value.into_iter().map(str::to_string).collect())
    }
}

/// Declared type of a criterion. Untyped criteria are strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Number,
    #[default]
    String,
    Boolean,
    Array,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Number => write!(f, "number"),
            ValueType::String => write!(f, "string"),
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Array => write!(f, "array"),
        }
    }
}

/// How an application value is compared to the expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Actual must be at least the expected value (floors)
    #[default]
    Min,
    /// Actual must be at most the expected value (ceilings)
    Max,
    /// Actual must equal the expected value
    Exact,
    /// Actual must not appear in the expected list
    Excludes,
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonMode::Min => write!(f, "min"),
            ComparisonMode::Max => write!(f, "max"),
            ComparisonMode::Exact => write!(f, "exact"),
            ComparisonMode::Excludes => write!(f, "excludes"),
        }
    }
}

fn default_required() -> bool {
    true
}

fn default_category() -> String {
    "general".to_string()
}

/// Prefixes stripped from a criterion key when looking up the application field.
const KEY_PREFIXES: [&str; 4] = ["min_", "max_", "allowed_", "excluded_"];

/// A single typed requirement owned by a lender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionDefinition {
    /// Unique within a lender (e.g., "min_fico_score")
    #[serde(alias = "criteria_key")]
    pub key: String,

    /// Human-readable name
    pub display_name: String,

    #[serde(alias = "criteria_value")]
    pub expected_value: CriterionValue,

    #[serde(alias = "criteria_type", default)]
    pub value_type: ValueType,

    #[serde(default = "default_required")]
    pub is_required: bool,

    #[serde(default = "default_category")]
    pub category: String,

    #[serde(default)]
    pub comparison: ComparisonMode,

    /// Application field this criterion reads, when it differs from the key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CriterionDefinition {
    /// Create a required criterion in the "general" category.
    pub fn new(
        key: impl Into<String>,
        display_name: impl Into<String>,
        expected_value: impl Into<CriterionValue>,
        value_type: ValueType,
    ) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            expected_value: expected_value.into(),
            value_type,
            is_required: true,
            category: default_category(),
            comparison: ComparisonMode::Min,
            field: None,
            description: None,
        }
    }

    /// Mark the criterion as optional.
    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self
    }

    pub fn with_mode(mut self, mode: ComparisonMode) -> Self {
        self.comparison = mode;
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Candidate application field names, in lookup order.
    pub fn field_candidates(&self) -> Vec<&str> {
        if let Some(field) = &self.field {
            return vec![field.as_str()];
        }
        let mut candidates = vec![self.key.as_str()];
        if let Some(stripped) = KEY_PREFIXES
            .iter()
            .find_map(|prefix| self.key.strip_prefix(prefix))
        {
            candidates.push(stripped);
        }
        candidates
    }

    /// Resolve the application value this criterion is judged against.
    pub fn resolve<'a>(&self, application: &'a Application) -> Option<&'a FieldValue> {
        self.field_candidates()
            .into_iter()
            .find_map(|name| application.get(name))
    }
}

/// A lender and its ordered criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lender {
    #[serde(alias = "_id")]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub criteria: Vec<CriterionDefinition>,
}

impl Lender {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            criteria: Vec::new(),
        }
    }

    /// Append a criterion.
    pub fn with_criterion(mut self, criterion: CriterionDefinition) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// Criteria that must be met for a match.
    pub fn required_criteria(&self) -> impl Iterator<Item = &CriterionDefinition> {
        self.criteria.iter().filter(|c| c.is_required)
    }
}

/// A snapshot of lenders as supplied by the criteria store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LenderCatalog {
    #[serde(default)]
    pub lenders: Vec<Lender>,
}

impl LenderCatalog {
    /// Parse a catalog from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let catalog: LenderCatalog = serde_yaml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse a catalog from JSON string.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: LenderCatalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse a catalog from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a catalog from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Consume the catalog, yielding its lenders in file order.
    pub fn into_lenders(self) -> Vec<Lender> {
        self.lenders
    }

    /// Validate the catalog structure.
    fn validate(&self) -> Result<(), CatalogError> {
        let mut lender_ids = HashSet::new();

        for lender in &self.lenders {
            if lender.id.is_empty() {
                return Err(CatalogError::MissingField("lenders[].id".to_string()));
            }
            if lender.name.is_empty() {
                return Err(CatalogError::MissingField(format!(
                    "lenders[{}].name",
                    lender.id
                )));
            }
            if !lender_ids.insert(lender.id.as_str()) {
                return Err(CatalogError::ValidationError(format!(
                    "Duplicate lender ID: {}",
                    lender.id
                )));
            }
            Self::validate_unique_keys(lender)?;
        }

        Ok(())
    }

    /// Ensure criterion keys are unique within a lender.
    fn validate_unique_keys(lender: &Lender) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for criterion in &lender.criteria {
            if criterion.key.is_empty() {
                return Err(CatalogError::MissingField(format!(
                    "lenders[{}].criteria[].key",
                    lender.id
                )));
            }
            if !seen.insert(criterion.key.as_str()) {
                return Err(CatalogError::ValidationError(format!(
                    "Duplicate criterion key '{}' for lender {}",
                    criterion.key, lender.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CATALOG: &str = r#"
lenders:
  - id: "lender-1"
    name: "Advantage+ Financing"
    criteria:
      - key: "min_fico_score"
        display_name: "Minimum FICO Score"
        expected_value: 680
        value_type: number
        category: credit
      - criteria_key: "max_loan_amount"
        display_name: "Maximum Loan Amount"
        criteria_value: 250000
        criteria_type: number
        comparison: max
        field: requested_amount
      - key: "excluded_states"
        display_name: "Excluded States"
        expected_value: ["CA", "NV"]
        value_type: array
        comparison: excludes
        is_required: false
  - _id: "lender-2"
    name: "Empty Lender"
"#;

    #[test]
    fn test_parse_valid_catalog() {
        let catalog = LenderCatalog::from_yaml(VALID_CATALOG).unwrap();
        assert_eq!(catalog.lenders.len(), 2);

        let first = &catalog.lenders[0];
        assert_eq!(first.criteria.len(), 3);
        assert_eq!(first.criteria[0].expected_value, CriterionValue::Number(680.0));
        assert_eq!(first.criteria[0].comparison, ComparisonMode::Min);
        assert!(first.criteria[0].is_required);
        assert_eq!(first.criteria[1].comparison, ComparisonMode::Max);
        assert!(!first.criteria[2].is_required);
        assert_eq!(first.criteria[2].category, "general");

        assert_eq!(catalog.lenders[1].id, "lender-2");
        assert!(catalog.lenders[1].criteria.is_empty());
    }

    #[test]
    fn test_duplicate_criterion_keys() {
        let yaml = r#"
lenders:
  - id: "l1"
    name: "Dup"
    criteria:
      - { key: "k", display_name: "K", expected_value: 1, value_type: number }
      - { key: "k", display_name: "K2", expected_value: 2, value_type: number }
"#;
        assert!(matches!(
            LenderCatalog::from_yaml(yaml),
            Err(CatalogError::ValidationError(_))
        ));
    }

    #[test]
    fn test_untyped_criterion_defaults_to_string() {
        let json = r#"{"lenders": [{"_id": "a", "name": "A", "criteria": [
            {"criteria_key": "industry", "display_name": "Industry",
             "criteria_value": "construction"}
        ]}]}"#;
        let catalog = LenderCatalog::from_json(json).unwrap();

        assert_eq!(catalog.lenders[0].criteria[0].value_type, ValueType::String);
    }

    #[test]
    fn test_duplicate_lender_ids() {
        let json = r#"{"lenders": [{"id": "a", "name": "A"}, {"id": "a", "name": "B"}]}"#;
        assert!(matches!(
            LenderCatalog::from_json(json),
            Err(CatalogError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_name() {
        let json = r#"{"lenders": [{"id": "a", "name": ""}]}"#;
        assert!(matches!(
            LenderCatalog::from_json(json),
            Err(CatalogError::MissingField(_))
        ));
    }

    #[test]
    fn test_field_resolution_strips_prefix() {
        let app = Application::new("app").with_field("fico_score", 700);
        let criterion =
            CriterionDefinition::new("min_fico_score", "FICO", 650, ValueType::Number);

        assert_eq!(criterion.field_candidates(), vec!["min_fico_score", "fico_score"]);
        assert_eq!(criterion.resolve(&app), Some(&FieldValue::Number(700.0)));
    }

    #[test]
    fn test_explicit_field_wins() {
        let app = Application::new("app")
            .with_field("max_loan_amount", 1)
            .with_field("requested_amount", 90000);
        let criterion =
            CriterionDefinition::new("max_loan_amount", "Max", 100000, ValueType::Number)
                .with_field("requested_amount");

        assert_eq!(criterion.resolve(&app), Some(&FieldValue::Number(90000.0)));
    }
}
