//! Evaluation coordinator.
//!
//! Fans out one evaluation per lender and fans the outcomes back in:
//! - Concurrent lender tasks, optionally capped by `max_concurrency`
//! - Per-lender timeout and an optional global deadline
//! - Failures and panics are recorded per lender, never abort the run
//! - Deterministic aggregation of whatever completed

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use thiserror::Error;
use tokio::time::Instant;

use lendmatch_core::{
    derive_verdict, prefilter, validate_batch, Aggregator, Application, Assessment,
    EvaluationResult, FailedLender, FailureKind, Lender, LenderVerdict, ValidationError,
    VerdictSource,
};

use crate::cache::CachedReasoningService;
use crate::config::{CacheSettings, EngineConfig, FallbackStrategy};
use crate::reasoning::{ComparatorReasoningService, ReasoningClient, ReasoningService};

/// Errors from the coordinator.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid evaluation request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Reasoning service not configured")]
    NoService,
}

/// What one lender task produced.
#[derive(Debug)]
enum LenderOutcome {
    Verdict(LenderVerdict),
    Failed(FailedLender),
}

/// Runs evaluation batches against an injected reasoning service.
pub struct EvaluationCoordinator {
    service: Arc<dyn ReasoningService>,
    aggregator: Aggregator,
}

impl EvaluationCoordinator {
    pub fn new(service: Arc<dyn ReasoningService>) -> Self {
        Self {
            service,
            aggregator: Aggregator::new(),
        }
    }

    /// Coordinator that judges every lender with the comparator alone.
    pub fn offline() -> Self {
        Self::new(Arc::new(ComparatorReasoningService::new()))
    }

    pub fn builder() -> EvaluationCoordinatorBuilder {
        EvaluationCoordinatorBuilder::new()
    }

    /// Evaluate an application against every lender.
    ///
    /// # Execution Flow
    /// 1. Validate the request (hard failure)
    /// 2. Record lenders without criteria as `no_criteria`
    /// 3. Fan-out: evaluate remaining lenders concurrently
    /// 4. Fan-in: aggregate verdicts and failures
    pub async fn evaluate(
        &self,
        application: Arc<Application>,
        lenders: Vec<Lender>,
        config: &EngineConfig,
    ) -> Result<EvaluationResult, EngineError> {
        validate_batch(&application, &lenders)?;
        config.validate()?;

        let started = Instant::now();
        tracing::info!(
            application_id = %application.id,
            lenders = lenders.len(),
            service = self.service.name(),
            "Starting eligibility evaluation"
        );

        let client = ReasoningClient::new(self.service.clone(), config.match_threshold);
        let mut slots: Vec<Option<LenderOutcome>> = (0..lenders.len()).map(|_| None).collect();

        let mut runnable = Vec::with_capacity(lenders.len());
        for (index, lender) in lenders.iter().enumerate() {
            if lender.criteria.is_empty() {
                tracing::warn!(lender_id = %lender.id, "Lender has no criteria, skipping");
                slots[index] = Some(LenderOutcome::Failed(FailedLender::new(
                    &lender.id,
                    &lender.name,
                    FailureKind::NoCriteria,
                    "lender has no criteria",
                )));
            } else {
                runnable.push(index);
            }
        }

        let limit = config.max_concurrency.unwrap_or(runnable.len()).max(1);
        let application = &*application;
        let client = &client;
        let lenders_ref = &lenders;

        let mut tasks = pin!(futures::stream::iter(runnable.into_iter().map(|index| async move {
            let outcome = self
                .evaluate_one(client, application, &lenders_ref[index], config)
                .await;
            (index, outcome)
        }))
        .buffer_unordered(limit));

        let collect = async {
            while let Some((index, outcome)) = tasks.next().await {
                slots[index] = Some(outcome);
            }
        };

        // A deadline past the clock's range is no deadline at all.
        let deadline_at = config
            .global_deadline
            .and_then(|deadline| started.checked_add(deadline).map(|at| (deadline, at)));

        match deadline_at {
            Some((deadline, at)) => {
                if tokio::time::timeout_at(at, collect).await.is_err() {
                    tracing::warn!(
                        application_id = %application.id,
                        deadline = ?deadline,
                        "Global deadline expired, abandoning unfinished lenders"
                    );
                }
            }
            None => collect.await,
        }

        let mut verdicts = Vec::new();
        let mut failures = Vec::new();
        for (index, slot) in slots.into_iter().enumerate() {
            let outcome = slot.unwrap_or_else(|| {
                let lender = &lenders[index];
                LenderOutcome::Failed(FailedLender::new(
                    &lender.id,
                    &lender.name,
                    FailureKind::Timeout,
                    "global deadline expired before evaluation finished",
                ))
            });
            match outcome {
                LenderOutcome::Verdict(v) => verdicts.push(v),
                LenderOutcome::Failed(f) => failures.push(f),
            }
        }

        let result = self.aggregator.aggregate(&application.id, verdicts, failures);
        debug_assert_eq!(result.lender_ids().len(), lenders.len());

        tracing::info!(
            application_id = %application.id,
            matched = result.matched_lenders.len(),
            unmatched = result.unmatched_lenders.len(),
            failed = result.failed_lenders.len(),
            elapsed = ?started.elapsed(),
            "Eligibility evaluation finished"
        );

        Ok(result)
    }

    /// Evaluate one lender, converting panics into an `internal` failure.
    async fn evaluate_one(
        &self,
        client: &ReasoningClient,
        application: &Application,
        lender: &Lender,
        config: &EngineConfig,
    ) -> LenderOutcome {
        let guarded =
            AssertUnwindSafe(self.judge(client, application, lender, config)).catch_unwind();

        match guarded.await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    lender_id = %lender.id,
                    error = %message,
                    "Lender evaluation panicked"
                );
                LenderOutcome::Failed(FailedLender::new(
                    &lender.id,
                    &lender.name,
                    FailureKind::Internal,
                    message,
                ))
            }
        }
    }

    async fn judge(
        &self,
        client: &ReasoningClient,
        application: &Application,
        lender: &Lender,
        config: &EngineConfig,
    ) -> LenderOutcome {
        if config.enable_prefilter {
            if let Some(verdict) = prefilter(application, lender) {
                tracing::debug!(
                    lender_id = %lender.id,
                    "Required criterion failed pre-check, skipping reasoning call"
                );
                return LenderOutcome::Verdict(verdict);
            }
        }

        let timeout = config.per_lender_timeout;
        match tokio::time::timeout(timeout, client.evaluate_lender(application, lender)).await {
            Ok(Ok(verdict)) => LenderOutcome::Verdict(verdict),
            Ok(Err(e)) => self.recover(application, lender, config, e.failure_kind(), e.message),
            Err(_) => {
                tracing::warn!(
                    lender_id = %lender.id,
                    timeout = ?timeout,
                    "Lender evaluation timed out"
                );
                self.recover(
                    application,
                    lender,
                    config,
                    FailureKind::Timeout,
                    format!("no response within {:?}", timeout),
                )
            }
        }
    }

    /// Apply the fallback strategy to a failed reasoning call.
    fn recover(
        &self,
        application: &Application,
        lender: &Lender,
        config: &EngineConfig,
        kind: FailureKind,
        message: String,
    ) -> LenderOutcome {
        tracing::warn!(
            lender_id = %lender.id,
            error_kind = %kind,
            error = %message,
            "Lender evaluation failed"
        );

        if config.fallback == FallbackStrategy::Deterministic {
            let assessment = Assessment::from_comparator(application, lender);
            match derive_verdict(
                application,
                lender,
                assessment,
                config.match_threshold,
                VerdictSource::Fallback,
            ) {
                Ok(verdict) => {
                    tracing::info!(
                        lender_id = %lender.id,
                        "Falling back to deterministic evaluation"
                    );
                    return LenderOutcome::Verdict(verdict);
                }
                Err(e) => {
                    tracing::warn!(
                        lender_id = %lender.id,
                        error = %e,
                        "Deterministic fallback failed"
                    );
                }
            }
        }

        LenderOutcome::Failed(FailedLender::new(&lender.id, &lender.name, kind, message))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("evaluation panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("evaluation panicked: {}", s)
    } else {
        "evaluation panicked".to_string()
    }
}

/// Builder for EvaluationCoordinator.
pub struct EvaluationCoordinatorBuilder {
    service: Option<Arc<dyn ReasoningService>>,
    cache: Option<CacheSettings>,
}

impl EvaluationCoordinatorBuilder {
    pub fn new() -> Self {
        Self {
            service: None,
            cache: None,
        }
    }

    /// Set the reasoning service.
    pub fn service(mut self, service: Arc<dyn ReasoningService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Memoize assessments. Ignored when `settings.enabled` is false.
    pub fn cache(mut self, settings: CacheSettings) -> Self {
        self.cache = Some(settings);
        self
    }

    pub fn build(self) -> Result<EvaluationCoordinator, EngineError> {
        let service = self.service.ok_or(EngineError::NoService)?;

        let service: Arc<dyn ReasoningService> = match self.cache {
            Some(settings) if settings.enabled => {
                Arc::new(CachedReasoningService::from_settings(service, &settings))
            }
            _ => service,
        };

        Ok(EvaluationCoordinator::new(service))
    }
}

impl Default for EvaluationCoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
