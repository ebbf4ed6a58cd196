//! The per-run resource gateway.
//!
//! A read-only facade over the definition catalog with a bounded LRU
//! cache keyed by `(kind, reference, revision)`. One gateway is created
//! per run, warmed lazily, and discarded with the run.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use weft_core::{DefinitionRef, Revision, TaskRef};
use weft_definition::{TaskDefinition, WorkflowDefinition};

use crate::catalog::DefinitionCatalog;
use crate::error::ResourceError;

/// Cache hit/miss counters, readable for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that went to the catalog.
    pub misses: u64,
}

/// Per-run caching facade over a [`DefinitionCatalog`].
pub struct ResourceGateway {
    catalog: Arc<dyn DefinitionCatalog>,
    workflows: Mutex<LruCache<(DefinitionRef, Revision), Arc<WorkflowDefinition>>>,
    tasks: Mutex<LruCache<(TaskRef, Revision), Arc<TaskDefinition>>>,
    stats: Mutex<GatewayStats>,
}

impl ResourceGateway {
    /// Create a gateway caching up to `cache_size` entries per kind.
    #[must_use]
    pub fn new(catalog: Arc<dyn DefinitionCatalog>, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            catalog,
            workflows: Mutex::new(LruCache::new(capacity)),
            tasks: Mutex::new(LruCache::new(capacity)),
            stats: Mutex::new(GatewayStats::default()),
        }
    }

    /// Fetch a workflow definition, from cache when possible.
    pub async fn workflow(
        &self,
        reference: &DefinitionRef,
        revision: Revision,
    ) -> Result<Arc<WorkflowDefinition>, ResourceError> {
        let key = (reference.clone(), revision);
        if let Some(hit) = self.workflows.lock().get(&key).cloned() {
            self.stats.lock().hits += 1;
            return Ok(hit);
        }

        self.stats.lock().misses += 1;
        tracing::debug!(reference = %reference, revision = %revision, "workflow cache miss");
        let definition = self.catalog.workflow(reference, revision).await?;
        self.workflows.lock().put(key, Arc::clone(&definition));
        Ok(definition)
    }

    /// Fetch a task definition, from cache when possible.
    pub async fn task(
        &self,
        reference: &TaskRef,
        revision: Revision,
    ) -> Result<Arc<TaskDefinition>, ResourceError> {
        let key = (reference.clone(), revision);
        if let Some(hit) = self.tasks.lock().get(&key).cloned() {
            self.stats.lock().hits += 1;
            return Ok(hit);
        }

        self.stats.lock().misses += 1;
        tracing::debug!(reference = %reference, revision = %revision, "task cache miss");
        let definition = self.catalog.task(reference, revision).await?;
        self.tasks.lock().put(key, Arc::clone(&definition));
        Ok(definition)
    }

    /// Current cache statistics.
    #[must_use]
    pub fn stats(&self) -> GatewayStats {
        *self.stats.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCatalog;
    use pretty_assertions::assert_eq;

    fn catalog_with_tasks(names: &[&str]) -> Arc<MemoryCatalog> {
        let catalog = MemoryCatalog::new();
        for name in names {
            catalog.put_task(TaskDefinition::new(
                TaskRef::new(*name).unwrap(),
                Revision::INITIAL,
            ));
        }
        Arc::new(catalog)
    }

    #[tokio::test]
    async fn second_lookup_hits_cache() {
        let gateway = ResourceGateway::new(catalog_with_tasks(&["echo"]), 8);
        let reference = TaskRef::new("echo").unwrap();

        gateway.task(&reference, Revision::INITIAL).await.unwrap();
        gateway.task(&reference, Revision::INITIAL).await.unwrap();

        let stats = gateway.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn not_found_propagates() {
        let gateway = ResourceGateway::new(catalog_with_tasks(&[]), 8);
        let err = gateway
            .task(&TaskRef::new("ghost").unwrap(), Revision::INITIAL)
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::NotFound { .. }));
        // Failures are not cached.
        assert_eq!(gateway.stats().misses, 1);
    }

    #[tokio::test]
    async fn lru_evicts_oldest() {
        let gateway = ResourceGateway::new(catalog_with_tasks(&["a", "b"]), 1);

        let a = TaskRef::new("a").unwrap();
        let b = TaskRef::new("b").unwrap();
        gateway.task(&a, Revision::INITIAL).await.unwrap();
        gateway.task(&b, Revision::INITIAL).await.unwrap();
        // `a` was evicted by `b` in the size-1 cache.
        gateway.task(&a, Revision::INITIAL).await.unwrap();

        assert_eq!(gateway.stats().misses, 3);
        assert_eq!(gateway.stats().hits, 0);
    }

    #[tokio::test]
    async fn distinct_revisions_are_distinct_entries() {
        let catalog = MemoryCatalog::new();
        let reference = TaskRef::new("t").unwrap();
        catalog.put_task(TaskDefinition::new(reference.clone(), Revision::new(1)));
        catalog.put_task(TaskDefinition::new(reference.clone(), Revision::new(2)));
        let gateway = ResourceGateway::new(Arc::new(catalog), 8);

        let v1 = gateway.task(&reference, Revision::new(1)).await.unwrap();
        let v2 = gateway.task(&reference, Revision::new(2)).await.unwrap();
        assert_eq!(v1.revision, Revision::new(1));
        assert_eq!(v2.revision, Revision::new(2));
    }
}
