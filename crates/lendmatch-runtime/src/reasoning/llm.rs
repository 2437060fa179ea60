//! LLM-backed reasoning service.
//!
//! One provider call per lender. The response must be a JSON document
//! matching `spec/assessment.schema.json`; anything else is reported as a
//! malformed response, never repaired by guesswork.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use lazy_static::lazy_static;
use lendmatch_core::{Application, Assessment, Lender};
use regex::Regex;
use serde_json::Value as JsonValue;

use super::{ReasoningError, ReasoningService};
use crate::config::LlmSettings;
use crate::prompts::{eligibility_prompt, SYSTEM_PROMPT};
use crate::providers::{ChatMessage, CompletionResponse, LlmProvider, ProviderError};
use crate::usage::UsageTracker;

/// Embedded response schema.
const ASSESSMENT_SCHEMA_JSON: &str = include_str!("../../../../spec/assessment.schema.json");

static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

lazy_static! {
    /// A whole response wrapped in a markdown code fence, language tag optional.
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)^\s*```[A-Za-z]*[ \t]*\r?\n?(.*?)\s*```\s*$").unwrap();
}

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: JsonValue = serde_json::from_str(ASSESSMENT_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;
        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result.as_ref().map_err(|e| e.clone())
}

/// Validate a response document against the assessment schema.
pub fn validate_assessment_schema(value: &JsonValue) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fences(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text.trim(),
    }
}

/// Parse model output into an [`Assessment`].
fn parse_assessment(raw: &str) -> Result<Assessment, ReasoningError> {
    let text = strip_code_fences(raw);
    if text.is_empty() {
        return Err(ReasoningError::empty("model returned no content"));
    }

    let value: JsonValue = serde_json::from_str(text)
        .map_err(|e| ReasoningError::malformed(format!("response is not JSON: {}", e)))?;

    validate_assessment_schema(&value).map_err(|errors| {
        ReasoningError::malformed(format!(
            "response failed schema validation: {}",
            errors.join("; ")
        ))
    })?;

    serde_json::from_value(value)
        .map_err(|e| ReasoningError::malformed(format!("response has unexpected shape: {}", e)))
}

/// Stretch a backoff delay to the provider's `retry_after` hint, capped.
///
/// `None` means the retry budget is spent and stays that way.
fn honor_retry_after(
    e: &ProviderError,
    delay: Option<Duration>,
    cap: Duration,
) -> Option<Duration> {
    match (e, delay) {
        (ProviderError::RateLimited { retry_after: Some(after) }, Some(delay)) => {
            Some(delay.max((*after).min(cap)))
        }
        _ => delay,
    }
}

/// Reasoning service that asks an LLM.
pub struct LlmReasoningService {
    provider: Arc<dyn LlmProvider>,
    settings: LlmSettings,
    usage: Arc<UsageTracker>,
}

impl LlmReasoningService {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: LlmSettings) -> Self {
        Self {
            provider,
            settings,
            usage: Arc::new(UsageTracker::new()),
        }
    }

    /// Share a usage tracker with the caller.
    pub fn with_usage_tracker(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    async fn complete_once(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<CompletionResponse, ProviderError> {
        let config = self.settings.completion_config();
        match self.provider.complete(messages, &config).await {
            Ok(response) => {
                self.usage.record(&response.usage, &response.model);
                Ok(response)
            }
            Err(e) => {
                self.usage.record_failure();
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ReasoningService for LlmReasoningService {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn assess(
        &self,
        application: &Application,
        lender: &Lender,
    ) -> Result<Assessment, ReasoningError> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT.trim()),
            ChatMessage::user(eligibility_prompt(application, lender)),
        ];

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.settings.retry_base_delay)
            .with_max_times(self.settings.retry_attempts);
        let retry_after_cap = self.settings.request_timeout;

        let response = (|| self.complete_once(messages.clone()))
            .retry(backoff)
            .when(|e: &ProviderError| e.is_transient())
            .adjust(move |e: &ProviderError, delay| honor_retry_after(e, delay, retry_after_cap))
            .notify(|e: &ProviderError, delay| {
                tracing::warn!(
                    lender_id = %lender.id,
                    provider = self.provider.name(),
                    error = %e,
                    delay = ?delay,
                    "Transient provider error, retrying"
                );
            })
            .await?;

        tracing::debug!(
            lender_id = %lender.id,
            model = %response.model,
            tokens = response.usage.total(),
            "Reasoning response received"
        );

        parse_assessment(&response.content)
    }
}
