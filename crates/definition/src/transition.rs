//! Transition definitions: routing, spawning and synchronization.

use serde::{Deserialize, Serialize};
use weft_core::{NodeRef, TransitionRef};

use crate::condition::Condition;

/// How many tokens a firing transition produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnMode {
    /// One token at the destination node.
    Single,
    /// `count` sibling tokens with branch indexes `0..count`.
    Fanout {
        /// Static sibling count, at least 1.
        count: u32,
    },
    /// One sibling per element of a snapshot collection.
    Foreach {
        /// JSONPath of the collection in the snapshot.
        collection: String,
        /// Name under which each sibling's branch table binds its element.
        item_var: String,
    },
}

/// Dynamic fan-out over a snapshot collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Foreach {
    /// JSONPath of the collection in the snapshot.
    pub collection: String,
    /// Name under which each sibling's branch table binds its element.
    pub item_var: String,
}

/// Fan-in readiness strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Ready when every sibling has arrived.
    All,
    /// Ready on the first arrival; the rest are cancelled.
    Any,
    /// Ready once `m` siblings have arrived; the rest are cancelled.
    MOfN {
        /// Required arrival count, at least 1.
        m: u32,
    },
}

impl SyncStrategy {
    /// Whether `arrivals` of `branch_total` satisfies the strategy.
    #[must_use]
    pub fn is_ready(&self, arrivals: u32, branch_total: u32) -> bool {
        match self {
            Self::All => arrivals == branch_total,
            Self::Any => arrivals >= 1,
            Self::MOfN { m } => arrivals >= *m,
        }
    }

    /// Whether satisfying the strategy cancels the remaining siblings.
    #[must_use]
    pub fn cancels_stragglers(&self) -> bool {
        !matches!(self, Self::All)
    }
}

/// How branch values are projected into shared context at a fan-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Target becomes an array in branch-index order; undefined sources
    /// are omitted.
    Append,
    /// Target receives a shallow object merge of the contributing values
    /// in branch-index order; later branches win on duplicate keys.
    MergeObject,
    /// Target becomes `{ "<branch_index>": value }`.
    KeyedByBranch,
    /// Target gets the value from the highest contributing branch index.
    LastWins,
    /// A strategy resolved by name from the coordinator's merge strategy
    /// registry.
    Custom(String),
}

impl MergeStrategy {
    /// The strategy's wire name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Append => "append",
            Self::MergeObject => "merge_object",
            Self::KeyedByBranch => "keyed_by_branch",
            Self::LastWins => "last_wins",
            Self::Custom(name) => name,
        }
    }
}

/// Projection of branch tables into shared context at a fan-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSpec {
    /// JSONPath evaluated against each contributing branch table
    /// (e.g. `_branch.output.rating`).
    pub source: String,
    /// Writable context path receiving the merged value
    /// (`state.*` or `output.*`).
    pub target: String,
    /// The merge strategy.
    pub strategy: MergeStrategy,
}

/// Fan-in synchronization attached to an arrival transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synchronization {
    /// Readiness strategy.
    pub strategy: SyncStrategy,
    /// Name of the sibling group this fan-in resolves.
    pub sibling_group: String,
    /// Optional merge executed at readiness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeSpec>,
}

/// A directed edge of the workflow graph.
///
/// `spawn_count` and `foreach` are mutually exclusive; the loader rejects
/// definitions that set both. [`TransitionDefinition::spawn_mode`] folds
/// them into a [`SpawnMode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDefinition {
    /// Unique reference of this transition.
    #[serde(rename = "ref")]
    pub transition_ref: TransitionRef,
    /// Source node.
    pub from_node_ref: NodeRef,
    /// Destination node.
    pub to_node_ref: NodeRef,
    /// Evaluation priority; lower fires first. All matching transitions at
    /// priority 0 form a parallel group and fire together.
    #[serde(default)]
    pub priority: u32,
    /// Optional firing condition over the snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Static fan-out count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_count: Option<u32>,
    /// Dynamic fan-out over a snapshot collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreach: Option<Foreach>,
    /// Sibling group name for spawned tokens. Defaults to the transition
    /// ref when spawning without an explicit name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sibling_group: Option<String>,
    /// Fan-in synchronization; present on arrival-side transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synchronization: Option<Synchronization>,
}

impl TransitionDefinition {
    /// A plain unconditional transition.
    pub fn new(
        transition_ref: TransitionRef,
        from_node_ref: NodeRef,
        to_node_ref: NodeRef,
    ) -> Self {
        Self {
            transition_ref,
            from_node_ref,
            to_node_ref,
            priority: 0,
            condition: None,
            spawn_count: None,
            foreach: None,
            sibling_group: None,
            synchronization: None,
        }
    }

    /// The transition's spawn mode.
    ///
    /// Assumes the definition passed loader validation (not both
    /// `spawn_count` and `foreach`).
    #[must_use]
    pub fn spawn_mode(&self) -> SpawnMode {
        if let Some(count) = self.spawn_count {
            SpawnMode::Fanout { count }
        } else if let Some(foreach) = &self.foreach {
            SpawnMode::Foreach {
                collection: foreach.collection.clone(),
                item_var: foreach.item_var.clone(),
            }
        } else {
            SpawnMode::Single
        }
    }

    /// Whether this transition spawns a sibling group.
    #[must_use]
    pub fn is_spawning(&self) -> bool {
        self.spawn_count.is_some() || self.foreach.is_some()
    }

    /// The sibling group name spawned tokens will carry.
    #[must_use]
    pub fn spawn_group_name(&self) -> String {
        self.sibling_group
            .clone()
            .unwrap_or_else(|| self.transition_ref.as_str().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn t(name: &str) -> TransitionDefinition {
        TransitionDefinition::new(
            TransitionRef::new(name).unwrap(),
            NodeRef::new("a").unwrap(),
            NodeRef::new("b").unwrap(),
        )
    }

    #[test]
    fn default_spawn_mode_is_single() {
        assert_eq!(t("t1").spawn_mode(), SpawnMode::Single);
        assert!(!t("t1").is_spawning());
    }

    #[test]
    fn fanout_spawn_mode() {
        let mut tr = t("t1");
        tr.spawn_count = Some(3);
        assert_eq!(tr.spawn_mode(), SpawnMode::Fanout { count: 3 });
        assert!(tr.is_spawning());
    }

    #[test]
    fn foreach_spawn_mode() {
        let mut tr = t("t1");
        tr.foreach = Some(Foreach {
            collection: "$.state.items".into(),
            item_var: "it".into(),
        });
        assert_eq!(
            tr.spawn_mode(),
            SpawnMode::Foreach {
                collection: "$.state.items".into(),
                item_var: "it".into(),
            }
        );
    }

    #[test]
    fn spawn_group_name_defaults_to_ref() {
        let mut tr = t("fan");
        assert_eq!(tr.spawn_group_name(), "fan");
        tr.sibling_group = Some("g".into());
        assert_eq!(tr.spawn_group_name(), "g");
    }

    #[test]
    fn strategy_readiness() {
        assert!(SyncStrategy::All.is_ready(3, 3));
        assert!(!SyncStrategy::All.is_ready(2, 3));
        assert!(SyncStrategy::Any.is_ready(1, 3));
        assert!(SyncStrategy::MOfN { m: 2 }.is_ready(2, 3));
        assert!(!SyncStrategy::MOfN { m: 2 }.is_ready(1, 3));
    }

    #[test]
    fn strategy_cancellation() {
        assert!(!SyncStrategy::All.cancels_stragglers());
        assert!(SyncStrategy::Any.cancels_stragglers());
        assert!(SyncStrategy::MOfN { m: 2 }.cancels_stragglers());
    }

    #[test]
    fn all_with_branch_total_one_is_pass_through() {
        assert!(SyncStrategy::All.is_ready(1, 1));
    }

    #[test]
    fn merge_strategy_names() {
        assert_eq!(MergeStrategy::Append.name(), "append");
        assert_eq!(MergeStrategy::MergeObject.name(), "merge_object");
        assert_eq!(MergeStrategy::KeyedByBranch.name(), "keyed_by_branch");
        assert_eq!(MergeStrategy::LastWins.name(), "last_wins");
        assert_eq!(MergeStrategy::Custom("join_csv".into()).name(), "join_csv");
    }

    #[test]
    fn merge_strategy_wire_shape() {
        assert_eq!(
            serde_json::to_value(MergeStrategy::Append).unwrap(),
            "append"
        );
        assert_eq!(
            serde_json::to_value(MergeStrategy::Custom("join_csv".into())).unwrap(),
            serde_json::json!({ "custom": "join_csv" })
        );
    }

    #[test]
    fn serde_roundtrip_with_synchronization() {
        let mut tr = t("join");
        tr.synchronization = Some(Synchronization {
            strategy: SyncStrategy::MOfN { m: 2 },
            sibling_group: "g".into(),
            merge: Some(MergeSpec {
                source: "_branch.output.result".into(),
                target: "state.results".into(),
                strategy: MergeStrategy::Append,
            }),
        });
        let json = serde_json::to_string(&tr).unwrap();
        let back: TransitionDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(tr, back);
    }

    #[test]
    fn sync_strategy_wire_shape() {
        assert_eq!(serde_json::to_value(SyncStrategy::All).unwrap(), "all");
        assert_eq!(
            serde_json::to_value(SyncStrategy::MOfN { m: 2 }).unwrap(),
            serde_json::json!({ "m_of_n": { "m": 2 } })
        );
    }
}
