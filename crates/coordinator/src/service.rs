//! The multi-run coordinator service.
//!
//! The embedding surface: owns one single-writer actor per run and
//! routes run control, trace queries and subscriptions to it. This is
//! what an HTTP layer (out of scope here) would call.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use weft_core::{DefinitionRef, Revision, RunId, SubscriptionId};
use weft_executor::TaskExecutor;
use weft_resource::DefinitionCatalog;
use weft_store::{MemoryRunStore, RunRecord, RunStore};
use weft_trace::{MetricsRegistry, StreamFrame, SubscriptionFilter, TraceEvent};

use crate::actor::{self, RunHandle};
use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;

/// Factory producing one store per run.
pub type StoreFactory = Arc<dyn Fn() -> Arc<dyn RunStore> + Send + Sync>;

/// The coordinator: run control, event streams and trace queries over
/// any number of independent runs.
pub struct Coordinator {
    config: CoordinatorConfig,
    catalog: Arc<dyn DefinitionCatalog>,
    executor: Arc<dyn TaskExecutor>,
    metrics: Arc<MetricsRegistry>,
    store_factory: StoreFactory,
    runs: DashMap<RunId, RunHandle>,
}

impl Coordinator {
    /// Create a coordinator over the given catalog and executor, with
    /// in-memory run stores and the default configuration.
    #[must_use]
    pub fn new(catalog: Arc<dyn DefinitionCatalog>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            config: CoordinatorConfig::default(),
            catalog,
            executor,
            metrics: Arc::new(MetricsRegistry::new()),
            store_factory: Arc::new(|| Arc::new(MemoryRunStore::new()) as Arc<dyn RunStore>),
            runs: DashMap::new(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the per-run store factory (e.g. with a durable driver).
    #[must_use]
    pub fn with_store_factory(mut self, factory: StoreFactory) -> Self {
        self.store_factory = factory;
        self
    }

    /// The coordinator's metrics registry.
    #[must_use]
    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.metrics)
    }

    /// Start a run of `definition_ref` at `revision` with `input`.
    ///
    /// Returns once the start pass is committed and the root token
    /// dispatched; the run continues driving itself.
    pub async fn start_run(
        &self,
        definition_ref: DefinitionRef,
        revision: Revision,
        input: Value,
    ) -> Result<RunId, CoordinatorError> {
        let store = (self.store_factory)();
        let handle = actor::spawn_run(
            definition_ref,
            revision,
            input,
            Arc::clone(&self.catalog),
            Arc::clone(&self.executor),
            store,
            self.config.clone(),
            Arc::clone(&self.metrics),
        )
        .await?;
        let run_id = handle.run_id();
        self.runs.insert(run_id, handle);
        Ok(run_id)
    }

    /// Snapshot of a run's row.
    pub async fn get_run(&self, run_id: RunId) -> Result<RunRecord, CoordinatorError> {
        self.handle(run_id)?.get_run().await
    }

    /// Committed composite context view of a run, preserved after
    /// termination until the run is deleted.
    pub async fn get_context(&self, run_id: RunId) -> Result<Value, CoordinatorError> {
        self.handle(run_id)?.get_context().await
    }

    /// Cancel a run: it fails with `cancelled`, all non-terminal tokens
    /// are cancelled and further executor replies are rejected.
    pub async fn cancel_run(
        &self,
        run_id: RunId,
        reason: impl Into<String>,
    ) -> Result<(), CoordinatorError> {
        self.handle(run_id)?.cancel(reason).await
    }

    /// Subscribe to a run's event streams. `since_sequence` replays
    /// committed trace events past that sequence before going live.
    pub async fn subscribe(
        &self,
        run_id: RunId,
        filter: SubscriptionFilter,
        since_sequence: Option<u64>,
    ) -> Result<(SubscriptionId, mpsc::Receiver<StreamFrame>), CoordinatorError> {
        self.handle(run_id)?.subscribe(filter, since_sequence).await
    }

    /// Committed trace events of a run.
    pub async fn trace(
        &self,
        run_id: RunId,
        since_sequence: u64,
        type_prefix: Option<String>,
    ) -> Result<Vec<TraceEvent>, CoordinatorError> {
        self.handle(run_id)?.trace(since_sequence, type_prefix).await
    }

    /// Forget a run: drops the actor handle (the actor winds down) and
    /// with it the retained context and trace.
    pub fn delete_run(&self, run_id: RunId) -> bool {
        self.runs.remove(&run_id).is_some()
    }

    fn handle(&self, run_id: RunId) -> Result<RunHandle, CoordinatorError> {
        self.runs
            .get(&run_id)
            .map(|entry| entry.value().clone())
            .ok_or(CoordinatorError::RunNotFound(run_id))
    }
}
