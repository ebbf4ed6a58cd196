//! The definition catalog port.

use std::sync::Arc;

use async_trait::async_trait;
use weft_core::{DefinitionRef, Revision, TaskRef};
use weft_definition::{TaskDefinition, WorkflowDefinition};

use crate::error::ResourceError;

/// Read-only access to the external store of authored artifacts.
///
/// Returned definitions are immutable: a `(reference, revision)` pair
/// always resolves to the same content, which is what makes the
/// gateway's cache sound.
#[async_trait]
pub trait DefinitionCatalog: Send + Sync {
    /// Fetch a workflow definition.
    async fn workflow(
        &self,
        reference: &DefinitionRef,
        revision: Revision,
    ) -> Result<Arc<WorkflowDefinition>, ResourceError>;

    /// Fetch a task definition.
    async fn task(
        &self,
        reference: &TaskRef,
        revision: Revision,
    ) -> Result<Arc<TaskDefinition>, ResourceError>;
}
