//! Caching layer for reasoning calls.
//!
//! Memoizes assessments per (application, lender) so re-evaluating an
//! unchanged application against an unchanged lender costs no LLM call.
//! Only successful assessments are cached.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lendmatch_core::{Application, Assessment, Lender};
use moka::future::Cache;
use serde::Serialize;

use crate::config::CacheSettings;
use crate::reasoning::{ReasoningError, ReasoningService};

/// Cache key for an assessment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    application_hash: u64,
    lender_hash: u64,
}

impl CacheKey {
    /// Fingerprint the inputs. `None` if either cannot be serialized.
    pub fn new(application: &Application, lender: &Lender) -> Option<Self> {
        Some(Self {
            application_hash: fingerprint(&application.fields)?,
            lender_hash: fingerprint(lender)?,
        })
    }
}

fn fingerprint<T: Serialize>(value: &T) -> Option<u64> {
    let canonical = serde_json::to_string(value).ok()?;
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    Some(hasher.finish())
}

/// Reasoning service decorator backed by a moka cache.
pub struct CachedReasoningService {
    inner: Arc<dyn ReasoningService>,
    cache: Cache<CacheKey, Assessment>,
}

impl CachedReasoningService {
    pub fn new(inner: Arc<dyn ReasoningService>, max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { inner, cache }
    }

    pub fn from_settings(inner: Arc<dyn ReasoningService>, settings: &CacheSettings) -> Self {
        Self::new(inner, settings.max_entries, settings.ttl)
    }

    /// Clear the cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of cached assessments.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl ReasoningService for CachedReasoningService {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn assess(
        &self,
        application: &Application,
        lender: &Lender,
    ) -> Result<Assessment, ReasoningError> {
        let Some(key) = CacheKey::new(application, lender) else {
            return self.inner.assess(application, lender).await;
        };

        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!(lender_id = %lender.id, "Assessment cache hit");
            return Ok(hit);
        }

        // Concurrent misses for the same key share one inner call.
        self.cache
            .try_get_with(key, self.inner.assess(application, lender))
            .await
            .map_err(|e| (*e).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lendmatch_core::{CriterionDefinition, ValueType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingService {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ReasoningService for CountingService {
        fn name(&self) -> &str {
            "counting"
        }

        async fn assess(
            &self,
            application: &Application,
            lender: &Lender,
        ) -> Result<Assessment, ReasoningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ReasoningError::transport("unreachable"));
            }
            Ok(Assessment::from_comparator(application, lender))
        }
    }

    fn counting(fail: bool) -> Arc<CountingService> {
        Arc::new(CountingService {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    fn lender() -> Lender {
        Lender::new("apex", "Apex").with_criterion(CriterionDefinition::new(
            "min_fico_score",
            "Minimum FICO Score",
            650,
            ValueType::Number,
        ))
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let inner = counting(false);
        let cached = CachedReasoningService::new(inner.clone(), 100, Duration::from_secs(60));
        let application = Application::new("app").with_field("fico_score", 700);

        let first = cached.assess(&application, &lender()).await.unwrap();
        let second = cached.assess(&application, &lender()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_changed_inputs_miss() {
        let inner = counting(false);
        let cached = CachedReasoningService::new(inner.clone(), 100, Duration::from_secs(60));

        let a = Application::new("app").with_field("fico_score", 700);
        let b = Application::new("app").with_field("fico_score", 640);
        cached.assess(&a, &lender()).await.unwrap();
        cached.assess(&b, &lender()).await.unwrap();

        let stricter = Lender::new("apex", "Apex").with_criterion(CriterionDefinition::new(
            "min_fico_score",
            "Minimum FICO Score",
            720,
            ValueType::Number,
        ));
        cached.assess(&a, &stricter).await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let inner = counting(true);
        let cached = CachedReasoningService::new(inner.clone(), 100, Duration::from_secs(60));
        let application = Application::new("app");

        assert!(cached.assess(&application, &lender()).await.is_err());
        assert!(cached.assess(&application, &lender()).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_key_ignores_application_id() {
        let a = Application::new("first").with_field("fico_score", 700);
        let b = Application::new("second").with_field("fico_score", 700);
        assert_eq!(CacheKey::new(&a, &lender()), CacheKey::new(&b, &lender()));
    }
}
