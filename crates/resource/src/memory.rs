//! In-memory definition catalog.
//!
//! The catalog embedders and tests register definitions into directly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use weft_core::{DefinitionRef, Revision, TaskRef};
use weft_definition::{TaskDefinition, WorkflowDefinition};

use crate::catalog::DefinitionCatalog;
use crate::error::{ResourceError, ResourceKind};

/// An in-memory [`DefinitionCatalog`].
#[derive(Default)]
pub struct MemoryCatalog {
    workflows: RwLock<HashMap<(DefinitionRef, Revision), Arc<WorkflowDefinition>>>,
    tasks: RwLock<HashMap<(TaskRef, Revision), Arc<TaskDefinition>>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow definition under its own ref and revision.
    pub fn put_workflow(&self, definition: WorkflowDefinition) {
        self.workflows.write().insert(
            (definition.definition_ref.clone(), definition.revision),
            Arc::new(definition),
        );
    }

    /// Register a task definition under its own ref and revision.
    pub fn put_task(&self, definition: TaskDefinition) {
        self.tasks.write().insert(
            (definition.task_ref.clone(), definition.revision),
            Arc::new(definition),
        );
    }
}

#[async_trait]
impl DefinitionCatalog for MemoryCatalog {
    async fn workflow(
        &self,
        reference: &DefinitionRef,
        revision: Revision,
    ) -> Result<Arc<WorkflowDefinition>, ResourceError> {
        self.workflows
            .read()
            .get(&(reference.clone(), revision))
            .cloned()
            .ok_or_else(|| {
                ResourceError::not_found(ResourceKind::Workflow, reference.as_str(), revision)
            })
    }

    async fn task(
        &self,
        reference: &TaskRef,
        revision: Revision,
    ) -> Result<Arc<TaskDefinition>, ResourceError> {
        self.tasks
            .read()
            .get(&(reference.clone(), revision))
            .cloned()
            .ok_or_else(|| {
                ResourceError::not_found(ResourceKind::Task, reference.as_str(), revision)
            })
    }
}
