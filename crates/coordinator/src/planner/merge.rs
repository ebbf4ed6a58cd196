//! Merge strategies.
//!
//! A merge folds the contributing branches' source values — ordered by
//! branch index — into one value for the merge target. Every strategy is
//! deterministic given that ordering.

use serde_json::{Map, Value};
use weft_definition::MergeStrategy;

/// Execute a built-in merge strategy over `(branch_index, value)`
/// contributions.
///
/// Contributions must be sorted by branch index. `None` values are
/// branches whose source path was undefined: `append` and
/// `keyed_by_branch` omit them, `merge_object` and `last_wins` fail when
/// nothing at all is defined. `Custom` strategies never reach this
/// function — the synchronizer resolves them through the coordinator's
/// merge strategy registry.
pub fn merge_values(
    strategy: &MergeStrategy,
    contributions: &[(u32, Option<Value>)],
) -> Result<Value, String> {
    match strategy {
        MergeStrategy::Append => Ok(Value::Array(
            contributions
                .iter()
                .filter_map(|(_, value)| value.clone())
                .collect(),
        )),

        MergeStrategy::MergeObject => {
            let mut merged = Map::new();
            let mut any_defined = false;
            for (index, value) in contributions {
                let Some(value) = value else { continue };
                any_defined = true;
                let Some(object) = value.as_object() else {
                    return Err(format!(
                        "merge_object: branch {index} contributed a non-object value"
                    ));
                };
                // Later branches win on duplicate keys.
                for (key, entry) in object {
                    merged.insert(key.clone(), entry.clone());
                }
            }
            if !any_defined {
                return Err("merge_object: no branch contributed a value".into());
            }
            Ok(Value::Object(merged))
        }

        MergeStrategy::KeyedByBranch => {
            let mut keyed = Map::new();
            for (index, value) in contributions {
                if let Some(value) = value {
                    keyed.insert(index.to_string(), value.clone());
                }
            }
            Ok(Value::Object(keyed))
        }

        MergeStrategy::LastWins => contributions
            .iter()
            .rev()
            .find_map(|(_, value)| value.clone())
            .ok_or_else(|| "last_wins: no branch contributed a value".into()),

        MergeStrategy::Custom(name) => Err(format!(
            "custom strategy {name:?} must resolve through the merge registry"
        )),
    }
}
