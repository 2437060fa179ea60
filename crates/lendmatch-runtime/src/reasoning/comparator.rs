//! Deterministic reasoning service backed by the criterion comparator.
//!
//! Used for offline runs, as the fallback judge and as a fake in tests.

use async_trait::async_trait;
use lendmatch_core::{Application, Assessment, Lender};

use super::{ReasoningError, ReasoningService};

/// Reasoning service that never leaves the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComparatorReasoningService;

impl ComparatorReasoningService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReasoningService for ComparatorReasoningService {
    fn name(&self) -> &str {
        "comparator"
    }

    async fn assess(
        &self,
        application: &Application,
        lender: &Lender,
    ) -> Result<Assessment, ReasoningError> {
        Ok(Assessment::from_comparator(application, lender))
    }
}
