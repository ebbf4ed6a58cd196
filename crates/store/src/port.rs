//! The run-store port.
//!
//! The persistence contract of one workflow run: four row-oriented tables
//! (`runs` row, `tokens`, the context pages, transient branch pages) and
//! the append-only trace. Any backend offering serializable batch commits
//! and a monotonic sequence counter can implement this; the bundled
//! driver is [`MemoryRunStore`](crate::memory::MemoryRunStore).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use weft_core::{SiblingGroupId, TokenId};
use weft_trace::{TraceEvent, TraceEventKind};

use crate::error::StoreError;
use crate::run::RunRecord;
use crate::token::{TokenRecord, TokenStatus};

/// Addresses one of the run's context tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextTable {
    /// The immutable input table.
    Input,
    /// The mutable state table.
    State,
    /// The output table.
    Output,
    /// A token's transient branch table. Persisted until the run
    /// terminates so post-mortem inspection can see unmerged branches.
    Branch(TokenId),
}

/// A full-table snapshot to persist in an apply batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPage {
    /// Which table the rows replace.
    pub table: ContextTable,
    /// The table content after the batch.
    pub rows: Map<String, Value>,
}

/// One atomic unit of mutation: everything a planning pass decided,
/// together with the trace events explaining it.
///
/// The store commits the whole batch or none of it. Events are stamped
/// with sequence numbers in listed order at commit; no trace event
/// becomes visible from a rejected batch.
#[derive(Debug, Clone, Default)]
pub struct ApplyBatch {
    /// Run row upsert.
    pub run: Option<RunRecord>,
    /// Token upserts, applied in order. Inserts are checked for id and
    /// `(sibling_group, branch_index)` uniqueness; updates are checked
    /// against the token status machine.
    pub tokens: Vec<TokenRecord>,
    /// Context table replacements.
    pub context_pages: Vec<ContextPage>,
    /// Planned trace events, stamped at commit.
    pub events: Vec<TraceEventKind>,
}

impl ApplyBatch {
    /// An empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the batch performs no mutation and carries no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.run.is_none()
            && self.tokens.is_empty()
            && self.context_pages.is_empty()
            && self.events.is_empty()
    }
}

/// Persistence port for one workflow run.
///
/// The coordinator's applier is the only caller of [`apply`]; reads may
/// be issued concurrently and observe only committed state.
///
/// [`apply`]: RunStore::apply
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Commit a batch atomically, assigning each event the next sequence
    /// numbers in listed order. Returns the stamped events.
    async fn apply(&self, batch: ApplyBatch) -> Result<Vec<TraceEvent>, StoreError>;

    /// The run row, if the run has been started.
    async fn run(&self) -> Result<Option<RunRecord>, StoreError>;

    /// A token by id.
    async fn token(&self, id: TokenId) -> Result<TokenRecord, StoreError>;

    /// All tokens in creation order.
    async fn tokens(&self) -> Result<Vec<TokenRecord>, StoreError>;

    /// Tokens with the given status, in creation order. This is the
    /// dispatcher's cursor over `pending`.
    async fn tokens_with_status(&self, status: TokenStatus)
        -> Result<Vec<TokenRecord>, StoreError>;

    /// Members of a sibling group, ordered by branch index.
    async fn sibling_group(&self, group: SiblingGroupId)
        -> Result<Vec<TokenRecord>, StoreError>;

    /// The content of a context table (empty map if never written).
    async fn context_page(&self, table: ContextTable) -> Result<Map<String, Value>, StoreError>;

    /// Committed trace events with `sequence_number > since_sequence`,
    /// optionally filtered by dotted type prefix.
    async fn trace(
        &self,
        since_sequence: u64,
        type_prefix: Option<&str>,
    ) -> Result<Vec<TraceEvent>, StoreError>;

    /// The highest committed sequence number (0 before the first event).
    async fn last_sequence(&self) -> Result<u64, StoreError>;
}
