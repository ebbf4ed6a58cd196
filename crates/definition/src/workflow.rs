//! Workflow definitions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use weft_core::{DefinitionRef, NodeRef, Revision, TaskRef, TransitionRef};
use weft_schema::Schema;

use crate::transition::TransitionDefinition;

/// A mapping table: destination path → source JSONPath.
///
/// Used for node input composition (destination keys inside the task
/// input object), node output projection and the workflow's final output
/// projection. Insertion order is preserved and is the application order.
pub type Mapping = IndexMap<String, String>;

/// A node: a position in the graph that dispatches one task invocation
/// per token visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique reference of this node within the workflow.
    #[serde(rename = "ref")]
    pub node_ref: NodeRef,
    /// The task the node invokes.
    pub task_ref: TaskRef,
    /// Revision of the task.
    pub task_revision: Revision,
    /// Task input composition: input key → snapshot JSONPath.
    #[serde(default)]
    pub input_mapping: Mapping,
    /// Task output projection: context path → JSONPath into the task
    /// output.
    #[serde(default)]
    pub output_mapping: Mapping,
    /// Per-node override of the task timeout, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl NodeDefinition {
    /// A node invoking `task_ref` with empty mappings.
    #[must_use]
    pub fn new(node_ref: NodeRef, task_ref: TaskRef, task_revision: Revision) -> Self {
        Self {
            node_ref,
            task_ref,
            task_revision,
            input_mapping: Mapping::new(),
            output_mapping: Mapping::new(),
            timeout_ms: None,
        }
    }
}

/// An authored workflow definition: the read-only graph a run executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Catalog reference of this definition.
    #[serde(rename = "id")]
    pub definition_ref: DefinitionRef,
    /// Published revision.
    #[serde(rename = "version")]
    pub revision: Revision,
    /// Schema the run input must satisfy.
    #[serde(default)]
    pub input_schema: Schema,
    /// Schema typing the mutable `state` table.
    #[serde(default)]
    pub context_schema: Schema,
    /// Schema the final output must satisfy.
    #[serde(default)]
    pub output_schema: Schema,
    /// Final output projection: result key → snapshot JSONPath.
    #[serde(default)]
    pub output_mapping: Mapping,
    /// Node where the root token starts.
    pub initial_node_ref: NodeRef,
    /// The nodes of the graph.
    pub nodes: Vec<NodeDefinition>,
    /// The transitions of the graph.
    #[serde(default)]
    pub transitions: Vec<TransitionDefinition>,
    /// Whole-run timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl WorkflowDefinition {
    /// Look up a node by ref.
    #[must_use]
    pub fn node(&self, node_ref: &NodeRef) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| &n.node_ref == node_ref)
    }

    /// Look up a transition by ref.
    #[must_use]
    pub fn transition(&self, transition_ref: &TransitionRef) -> Option<&TransitionDefinition> {
        self.transitions
            .iter()
            .find(|t| &t.transition_ref == transition_ref)
    }

    /// Outgoing transitions of a node, sorted by `(priority asc, ref asc)`.
    ///
    /// This ordering is the deterministic evaluation order of §routing:
    /// priority first, lexicographic ref as the tie-break.
    #[must_use]
    pub fn outgoing(&self, node_ref: &NodeRef) -> Vec<&TransitionDefinition> {
        let mut out: Vec<&TransitionDefinition> = self
            .transitions
            .iter()
            .filter(|t| &t.from_node_ref == node_ref)
            .collect();
        out.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.transition_ref.cmp(&b.transition_ref))
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(name: &str) -> NodeDefinition {
        NodeDefinition::new(
            NodeRef::new(name).unwrap(),
            TaskRef::new("task").unwrap(),
            Revision::INITIAL,
        )
    }

    fn transition(name: &str, from: &str, to: &str, priority: u32) -> TransitionDefinition {
        let mut t = TransitionDefinition::new(
            TransitionRef::new(name).unwrap(),
            NodeRef::new(from).unwrap(),
            NodeRef::new(to).unwrap(),
        );
        t.priority = priority;
        t
    }

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition {
            definition_ref: DefinitionRef::new("wf").unwrap(),
            revision: Revision::INITIAL,
            input_schema: Schema::any(),
            context_schema: Schema::any(),
            output_schema: Schema::any(),
            output_mapping: Mapping::new(),
            initial_node_ref: NodeRef::new("a").unwrap(),
            nodes: vec![node("a"), node("b"), node("c")],
            transitions: vec![
                transition("t-late", "a", "c", 2),
                transition("t-b", "a", "b", 1),
                transition("t-a", "a", "b", 1),
            ],
            timeout_ms: None,
        }
    }

    #[test]
    fn node_lookup() {
        let def = definition();
        assert!(def.node(&NodeRef::new("b").unwrap()).is_some());
        assert!(def.node(&NodeRef::new("zzz").unwrap()).is_none());
    }

    #[test]
    fn outgoing_sorted_by_priority_then_ref() {
        let def = definition();
        let refs: Vec<&str> = def
            .outgoing(&NodeRef::new("a").unwrap())
            .iter()
            .map(|t| t.transition_ref.as_str())
            .collect();
        assert_eq!(refs, ["t-a", "t-b", "t-late"]);
    }

    #[test]
    fn outgoing_of_leaf_is_empty() {
        let def = definition();
        assert!(def.outgoing(&NodeRef::new("c").unwrap()).is_empty());
    }

    #[test]
    fn serde_roundtrip() {
        let def = definition();
        let json = serde_json::to_string(&def).unwrap();
        let back: WorkflowDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
    }

    #[test]
    fn mapping_preserves_insertion_order() {
        let mut mapping = Mapping::new();
        mapping.insert("output.z".into(), "$.z".into());
        mapping.insert("output.a".into(), "$.a".into());
        let keys: Vec<&String> = mapping.keys().collect();
        assert_eq!(keys, ["output.z", "output.a"]);
    }
}
