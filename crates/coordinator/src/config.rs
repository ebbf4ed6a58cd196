//! Coordinator configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

/// A registered custom merge function: contributions in branch-index
/// order (`None` for undefined sources) to the merged value.
pub type MergeFn =
    Arc<dyn Fn(&[(u32, Option<Value>)]) -> Result<Value, String> + Send + Sync>;

/// Named custom merge strategies, consulted when a definition declares
/// `merge.strategy = { custom: <name> }`.
#[derive(Clone, Default)]
pub struct MergeRegistry {
    entries: HashMap<String, MergeFn>,
}

impl MergeRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy under a name, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, merge: MergeFn) {
        self.entries.insert(name.into(), merge);
    }

    /// Look up a strategy by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MergeFn> {
        self.entries.get(name)
    }
}

impl std::fmt::Debug for MergeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeRegistry")
            .field("strategies", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Per-coordinator tunables.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Entries per kind in each run's resource gateway cache.
    pub run_cache_size: usize,
    /// Frames buffered per event-stream subscriber before lag-drop.
    pub subscriber_buffer_size: usize,
    /// Task timeout applied when neither node nor task declares one.
    pub default_task_timeout: Duration,
    /// Hard ceiling on tokens created by one run.
    pub max_tokens_per_run: usize,
    /// Capacity of each run actor's mailbox.
    pub mailbox_size: usize,
    /// Custom merge strategies available to definitions.
    pub merge_strategies: MergeRegistry,
}

impl CoordinatorConfig {
    /// Override the default task timeout.
    #[must_use]
    pub fn with_default_task_timeout(mut self, timeout: Duration) -> Self {
        self.default_task_timeout = timeout;
        self
    }

    /// Override the per-subscriber buffer size.
    #[must_use]
    pub fn with_subscriber_buffer_size(mut self, size: usize) -> Self {
        self.subscriber_buffer_size = size;
        self
    }

    /// Override the token ceiling.
    #[must_use]
    pub fn with_max_tokens_per_run(mut self, max: usize) -> Self {
        self.max_tokens_per_run = max;
        self
    }

    /// Register a custom merge strategy.
    #[must_use]
    pub fn with_merge_strategy(mut self, name: impl Into<String>, merge: MergeFn) -> Self {
        self.merge_strategies.register(name, merge);
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            run_cache_size: 64,
            subscriber_buffer_size: 256,
            default_task_timeout: Duration::from_secs(30),
            max_tokens_per_run: 10_000,
            mailbox_size: 256,
            merge_strategies: MergeRegistry::new(),
        }
    }
}
