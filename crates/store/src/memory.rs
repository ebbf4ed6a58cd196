//! In-memory run store driver.
//!
//! Serializable semantics come from one mutex around the whole run state:
//! an apply batch validates against committed state first and mutates
//! only after every check passes, so a rejected batch leaves nothing
//! behind — including its trace events.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use weft_core::{SiblingGroupId, TokenId};
use weft_trace::TraceEvent;

use crate::error::StoreError;
use crate::port::{ApplyBatch, ContextPage, ContextTable, RunStore};
use crate::run::RunRecord;
use crate::token::{validate_transition, TokenRecord, TokenStatus};

#[derive(Default)]
struct Inner {
    run: Option<RunRecord>,
    tokens: HashMap<TokenId, TokenRecord>,
    token_order: Vec<TokenId>,
    pages: HashMap<ContextTable, Map<String, Value>>,
    trace: Vec<TraceEvent>,
    sequence: u64,
}

/// Mutex-guarded in-memory realization of the [`RunStore`] port.
#[derive(Default)]
pub struct MemoryRunStore {
    inner: Mutex<Inner>,
}

impl MemoryRunStore {
    /// Create an empty store for one run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    /// Validate every token upsert in `batch` against committed state.
    ///
    /// A batch may both insert a token and transition it (an arrival that
    /// resolves its fan-in in the same pass); later rows are validated
    /// against the staged state of earlier ones.
    fn stage(&self, batch: &ApplyBatch) -> Result<(), StoreError> {
        // Group/branch pairs already taken, plus the ones this batch adds.
        let mut taken: Vec<(SiblingGroupId, u32)> = self
            .tokens
            .values()
            .filter_map(|t| Some((t.sibling_group_id?, t.branch_index?)))
            .collect();
        // Status of every token as staged so far.
        let mut staged: HashMap<TokenId, TokenStatus> = self
            .tokens
            .iter()
            .map(|(&id, t)| (id, t.status))
            .collect();

        for token in &batch.tokens {
            match staged.get(&token.id) {
                None => {
                    if let (Some(group), Some(index)) =
                        (token.sibling_group_id, token.branch_index)
                    {
                        if taken.contains(&(group, index)) {
                            return Err(StoreError::UniqueViolation {
                                entity: "token",
                                detail: format!(
                                    "duplicate branch index {index} in sibling group {group}"
                                ),
                            });
                        }
                        taken.push((group, index));
                    }
                    staged.insert(token.id, token.status);
                }
                Some(&current) => {
                    if current == token.status {
                        continue;
                    }
                    if current.is_terminal() {
                        return Err(StoreError::TerminalTokenImmutable(token.id));
                    }
                    validate_transition(current, token.status)?;
                    staged.insert(token.id, token.status);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn apply(&self, batch: ApplyBatch) -> Result<Vec<TraceEvent>, StoreError> {
        let mut inner = self.inner.lock();
        inner.stage(&batch)?;

        if let Some(run) = batch.run {
            inner.run = Some(run);
        }
        for token in batch.tokens {
            if !inner.tokens.contains_key(&token.id) {
                inner.token_order.push(token.id);
            }
            inner.tokens.insert(token.id, token);
        }
        for ContextPage { table, rows } in batch.context_pages {
            inner.pages.insert(table, rows);
        }

        let now = Utc::now();
        let mut stamped = Vec::with_capacity(batch.events.len());
        for kind in batch.events {
            inner.sequence += 1;
            stamped.push(TraceEvent {
                sequence_number: inner.sequence,
                timestamp: now,
                kind,
            });
        }
        inner.trace.extend(stamped.iter().cloned());
        tracing::trace!(
            events = stamped.len(),
            last_sequence = inner.sequence,
            "apply batch committed"
        );
        Ok(stamped)
    }

    async fn run(&self) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.inner.lock().run.clone())
    }

    async fn token(&self, id: TokenId) -> Result<TokenRecord, StoreError> {
        self.inner
            .lock()
            .tokens
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("token", id))
    }

    async fn tokens(&self) -> Result<Vec<TokenRecord>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .token_order
            .iter()
            .filter_map(|id| inner.tokens.get(id).cloned())
            .collect())
    }

    async fn tokens_with_status(
        &self,
        status: TokenStatus,
    ) -> Result<Vec<TokenRecord>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .token_order
            .iter()
            .filter_map(|id| inner.tokens.get(id))
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn sibling_group(
        &self,
        group: SiblingGroupId,
    ) -> Result<Vec<TokenRecord>, StoreError> {
        let inner = self.inner.lock();
        let mut members: Vec<TokenRecord> = inner
            .tokens
            .values()
            .filter(|t| t.sibling_group_id == Some(group))
            .cloned()
            .collect();
        members.sort_by_key(|t| t.branch_index);
        Ok(members)
    }

    async fn context_page(&self, table: ContextTable) -> Result<Map<String, Value>, StoreError> {
        Ok(self.inner.lock().pages.get(&table).cloned().unwrap_or_default())
    }

    async fn trace(
        &self,
        since_sequence: u64,
        type_prefix: Option<&str>,
    ) -> Result<Vec<TraceEvent>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .trace
            .iter()
            .filter(|e| e.sequence_number > since_sequence)
            .filter(|e| type_prefix.map_or(true, |p| e.matches_prefix(p)))
            .cloned()
            .collect())
    }

    async fn last_sequence(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().sequence)
    }
}
