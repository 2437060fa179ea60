//! Reasoning service abstraction and the client adapter around it.
//!
//! A [`ReasoningService`] is an oracle: given an application and one lender
//! it returns an [`Assessment`]. [`ReasoningClient`] turns that answer into
//! a validated [`LenderVerdict`] or a classified [`ReasoningError`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use lendmatch_core::{
    derive_verdict, Application, Assessment, DeriveError, FailureKind, Lender, LenderVerdict,
    VerdictSource,
};
use thiserror::Error;

use crate::providers::ProviderError;

mod comparator;
mod llm;

pub use comparator::ComparatorReasoningService;
pub use llm::{strip_code_fences, validate_assessment_schema, LlmReasoningService};

/// Classification of a reasoning failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningErrorKind {
    /// Service unreachable or returned a non-success status
    TransportError,
    /// Response did not have the assessment shape
    MalformedResponse,
    /// Response carried nothing to evaluate
    EmptyResponse,
}

impl ReasoningErrorKind {
    pub fn failure_kind(self) -> FailureKind {
        match self {
            ReasoningErrorKind::TransportError => FailureKind::TransportError,
            ReasoningErrorKind::MalformedResponse => FailureKind::MalformedResponse,
            ReasoningErrorKind::EmptyResponse => FailureKind::EmptyResponse,
        }
    }
}

impl fmt::Display for ReasoningErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.failure_kind())
    }
}

/// A failed reasoning call for one lender.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct ReasoningError {
    pub kind: ReasoningErrorKind,
    pub message: String,
}

impl ReasoningError {
    pub fn new(kind: ReasoningErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ReasoningErrorKind::TransportError, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ReasoningErrorKind::MalformedResponse, message)
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self::new(ReasoningErrorKind::EmptyResponse, message)
    }

    pub fn failure_kind(&self) -> FailureKind {
        self.kind.failure_kind()
    }
}

impl From<ProviderError> for ReasoningError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::ParseError(msg) => Self::malformed(msg),
            other => Self::transport(other.to_string()),
        }
    }
}

impl From<DeriveError> for ReasoningError {
    fn from(e: DeriveError) -> Self {
        match e {
            DeriveError::Empty => Self::empty(e.to_string()),
            DeriveError::NonFiniteConfidence(_) => Self::malformed(e.to_string()),
        }
    }
}

/// The reasoning oracle.
///
/// Implementations must be safe to call concurrently for different lenders
/// and must not depend on call order.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Judge one application against one lender's criteria.
    async fn assess(
        &self,
        application: &Application,
        lender: &Lender,
    ) -> Result<Assessment, ReasoningError>;
}

/// Adapter from a [`ReasoningService`] to validated verdicts.
#[derive(Clone)]
pub struct ReasoningClient {
    service: Arc<dyn ReasoningService>,
    match_threshold: f64,
}

impl ReasoningClient {
    pub fn new(service: Arc<dyn ReasoningService>, match_threshold: f64) -> Self {
        Self {
            service,
            match_threshold,
        }
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    /// Ask the service about one lender and derive the verdict.
    pub async fn evaluate_lender(
        &self,
        application: &Application,
        lender: &Lender,
    ) -> Result<LenderVerdict, ReasoningError> {
        let assessment = self.service.assess(application, lender).await?;
        let verdict = derive_verdict(
            application,
            lender,
            assessment,
            self.match_threshold,
            VerdictSource::Reasoning,
        )?;
        Ok(verdict)
    }
}

impl fmt::Debug for ReasoningClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReasoningClient")
            .field("service", &self.service.name())
            .field("match_threshold", &self.match_threshold)
            .finish()
    }
}
