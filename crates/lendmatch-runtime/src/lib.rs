//! # lendmatch-runtime
//!
//! Concurrent eligibility evaluation for `lendmatch-core`.
//!
//! This crate owns everything with I/O or timing in it:
//! - [`EvaluationCoordinator`]: fans out one reasoning call per lender
//! - [`ReasoningService`]: the oracle seam (LLM, comparator or a test fake)
//! - [`CachedReasoningService`]: memoized assessments
//! - Provider plumbing for Gemini behind the `gemini` feature
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lendmatch_runtime::{EngineConfig, EvaluationCoordinator};
//!
//! let coordinator = EvaluationCoordinator::offline();
//! let result = coordinator
//!     .evaluate(Arc::new(application), lenders, &EngineConfig::default())
//!     .await?;
//!
//! println!("{} matched", result.matched_lenders.len());
//! ```

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod prompts;
pub mod providers;
pub mod reasoning;
pub mod usage;

pub use cache::{CacheKey, CachedReasoningService};
pub use config::{
    CacheSettings, ConfigError, EngineConfig, FallbackStrategy, LlmSettings, RuntimeConfig,
};
pub use coordinator::{EngineError, EvaluationCoordinator, EvaluationCoordinatorBuilder};
pub use providers::{LlmProvider, ProviderError, ProviderRegistry};
pub use reasoning::{
    ComparatorReasoningService, LlmReasoningService, ReasoningClient, ReasoningError,
    ReasoningErrorKind, ReasoningService,
};
pub use usage::{LlmUsage, UsageTracker};
