//! Loan application records.
//!
//! An [`Application`] is a flat, immutable mapping of field names to typed
//! scalars. It is built once before evaluation starts and shared read-only by
//! every lender task.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors raised while flattening submitted application data.
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Failed to parse application JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Application data must be a JSON object")]
    NotAnObject,

    #[error("Field '{0}' appears in more than one section")]
    DuplicateField(String),

    #[error("Field '{field}' has an unsupported value: {reason}")]
    UnsupportedValue { field: String, reason: String },
}

/// A single application fact.
///
/// Serialized untagged so records read naturally in JSON. Strings shaped like
/// `YYYY-MM-DD` come back as [`FieldValue::Date`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Flag(bool),
    Date(NaiveDate),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Numeric view, accepting text that parses as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }

    /// Boolean view, accepting common textual spellings.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(b) => Some(*b),
            FieldValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" => Some(true),
                "false" | "no" | "n" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Scalar text view. Dates render as ISO strings; lists have none.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Date(d) => Some(d.to_string()),
            FieldValue::Number(n) => Some(format_number(*n)),
            FieldValue::Flag(b) => Some(b.to_string()),
            FieldValue::List(_) => None,
        }
    }

    /// Short type label used in reasoning text.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Number(_) => "number",
            FieldValue::Flag(_) => "boolean",
            FieldValue::Date(_) => "date",
            FieldValue::Text(_) => "string",
            FieldValue::List(_) => "list",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", format_number(*n)),
            FieldValue::Flag(b) => write!(f, "{}", b),
            FieldValue::Date(d) => write!(f, "{}", d),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Number(f64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Number(f64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(value: Vec<&str>) -> Self {
        FieldValue::List(value.into_iter().map(str::to_string).collect())
    }
}

/// Render a number without a trailing `.0` when it is integral.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Normalized loan application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    /// Application identifier
    pub id: String,

    /// Flat field map, ordered for deterministic prompts and fingerprints
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

/// Top-level keys that identify the record rather than describe the applicant.
const RECORD_KEYS: [&str; 5] = ["id", "_id", "status", "created_at", "updated_at"];

impl Application {
    /// Create an empty application.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field, replacing any previous value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Build an application from submitted form data.
    ///
    /// Nested sections (`business_info`, `credit_info`, ...) are flattened
    /// into their leaf field names. Nulls are skipped, ISO dates become
    /// [`FieldValue::Date`] and arrays must hold strings. When the loan
    /// amount and down payment are present, `down_payment_percent` is derived.
    pub fn from_json(id: impl Into<String>, data: &JsonValue) -> Result<Self, IntakeError> {
        let object = data.as_object().ok_or(IntakeError::NotAnObject)?;
        let mut application = Self::new(id);

        for (key, value) in object {
            if RECORD_KEYS.contains(&key.as_str()) {
                continue;
            }
            application.flatten_into(key, value)?;
        }

        application.derive_down_payment_percent();
        Ok(application)
    }

    /// Parse and flatten an application from a JSON string.
    pub fn from_json_str(id: impl Into<String>, json: &str) -> Result<Self, IntakeError> {
        let value: JsonValue = serde_json::from_str(json)?;
        Self::from_json(id, &value)
    }

    fn flatten_into(&mut self, key: &str, value: &JsonValue) -> Result<(), IntakeError> {
        let converted = match value {
            JsonValue::Null => return Ok(()),
            JsonValue::Object(section) => {
                for (child_key, child) in section {
                    self.flatten_into(child_key, child)?;
                }
                return Ok(());
            }
            JsonValue::Bool(b) => FieldValue::Flag(*b),
            JsonValue::Number(n) => match n.as_f64() {
                Some(f) => FieldValue::Number(f),
                None => {
                    return Err(IntakeError::UnsupportedValue {
                        field: key.to_string(),
                        reason: format!("number {} is not representable", n),
                    })
                }
            },
            JsonValue::String(s) => match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
                Ok(date) => FieldValue::Date(date),
                Err(_) => FieldValue::Text(s.clone()),
            },
            JsonValue::Array(items) => {
                let strings = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| IntakeError::UnsupportedValue {
                        field: key.to_string(),
                        reason: "arrays must contain only strings".to_string(),
                    })?;
                FieldValue::List(strings)
            }
        };

        if self.fields.insert(key.to_string(), converted).is_some() {
            return Err(IntakeError::DuplicateField(key.to_string()));
        }
        Ok(())
    }

    fn derive_down_payment_percent(&mut self) {
        if self.fields.contains_key("down_payment_percent") {
            return;
        }
        let requested = self.get("requested_amount").and_then(FieldValue::as_number);
        let down = self.get("down_payment").and_then(FieldValue::as_number);
        if let (Some(requested), Some(down)) = (requested, down) {
            if requested > 0.0 {
                let percent = (down / requested * 1000.0).round() / 10.0;
                self.fields
                    .insert("down_payment_percent".to_string(), FieldValue::Number(percent));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted_form() -> JsonValue {
        serde_json::json!({
            "_id": "507f1f77bcf86cd799439013",
            "business_info": {
                "business_name": "ABC Trucking LLC",
                "industry": "Transportation",
                "years_in_business": 5.5,
                "annual_revenue": 500000
            },
            "credit_info": {
                "fico_score": 720,
                "has_bankruptcy": false,
                "bankruptcy_discharge_date": null
            },
            "loan_details": {
                "requested_amount": 75000,
                "down_payment": 7500
            },
            "contact_info": { "state": "TX" },
            "licenses": ["CDL-A", "HAZMAT"],
            "status": "pending"
        })
    }

    #[test]
    fn test_sections_are_flattened() {
        let app = Application::from_json("app-1", &submitted_form()).unwrap();

        assert_eq!(app.id, "app-1");
        assert_eq!(app.get("fico_score"), Some(&FieldValue::Number(720.0)));
        assert_eq!(app.get("state"), Some(&FieldValue::Text("TX".to_string())));
        assert_eq!(app.get("has_bankruptcy"), Some(&FieldValue::Flag(false)));
        assert!(app.get("bankruptcy_discharge_date").is_none());
        assert!(app.get("status").is_none());
        assert!(app.get("_id").is_none());
        assert_eq!(
            app.get("licenses"),
            Some(&FieldValue::List(vec!["CDL-A".to_string(), "HAZMAT".to_string()]))
        );
    }

    #[test]
    fn test_down_payment_percent_is_derived() {
        let app = Application::from_json("app-1", &submitted_form()).unwrap();
        assert_eq!(app.get("down_payment_percent"), Some(&FieldValue::Number(10.0)));
    }

    #[test]
    fn test_iso_dates_are_parsed() {
        let data = serde_json::json!({ "credit_info": { "discharge": "2019-06-30" } });
        let app = Application::from_json("app-2", &data).unwrap();
        assert_eq!(
            app.get("discharge"),
            Some(&FieldValue::Date(NaiveDate::from_ymd_opt(2019, 6, 30).unwrap()))
        );
    }

    #[test]
    fn test_duplicate_leaf_names_rejected() {
        let data = serde_json::json!({
            "business_info": { "state": "TX" },
            "contact_info": { "state": "CA" }
        });
        let result = Application::from_json("app-3", &data);
        assert!(matches!(result, Err(IntakeError::DuplicateField(f)) if f == "state"));
    }

    #[test]
    fn test_mixed_arrays_rejected() {
        let data = serde_json::json!({ "tags": ["a", 1] });
        assert!(matches!(
            Application::from_json("app-4", &data),
            Err(IntakeError::UnsupportedValue { .. })
        ));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(
            Application::from_json_str("app-5", "[1, 2]"),
            Err(IntakeError::NotAnObject)
        ));
    }

    #[test]
    fn test_field_value_views() {
        assert_eq!(FieldValue::from("1,250").as_number(), Some(1250.0));
        assert_eq!(FieldValue::from("Yes").as_flag(), Some(true));
        assert_eq!(FieldValue::from(700).to_string(), "700");
        assert_eq!(FieldValue::from(2.5).to_string(), "2.5");
        assert!(FieldValue::from(vec!["a"]).as_text().is_none());
    }

    #[test]
    fn test_untagged_round_trip_keeps_dates() {
        let app = Application::new("app-6")
            .with_field("opened", NaiveDate::from_ymd_opt(2020, 1, 2).unwrap())
            .with_field("state", "TX");
        let json = serde_json::to_string(&app).unwrap();
        let back: Application = serde_json::from_str(&json).unwrap();
        assert_eq!(back, app);
    }
}
