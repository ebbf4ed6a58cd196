//! The per-run context store.
//!
//! One instance per run, owned by the run's coordinator actor. Holds the
//! three shared tables (`input` write-once, `state`, `output`) and the
//! per-token branch tables. Every operation that touches data pushes its
//! own trace events into the supplied [`Recorder`] — emission lives here,
//! not at call sites, so trace coverage cannot drift.

use std::collections::HashMap;

use serde_json::{Map, Value};
use weft_core::TokenId;
use weft_schema::{self as schema, Schema};
use weft_trace::{Recorder, TraceEventKind};

use crate::error::ContextError;
use crate::path::{
    resolve_rooted, write_at, JsonPath, PathRoot, WriteMode, WriteNamespace, WritePath,
};

/// Where an output mapping's destinations land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingTarget {
    /// Destinations write into the shared `state`/`output` tables.
    Shared,
    /// `output.*` destinations are diverted into the token's branch table;
    /// `state.*` destinations stay shared.
    Branch(TokenId),
}

/// The typed data plane of one run.
#[derive(Debug, Clone)]
pub struct ContextStore {
    input: Map<String, Value>,
    state: Map<String, Value>,
    output: Map<String, Value>,
    branches: HashMap<TokenId, Map<String, Value>>,
    input_schema: Schema,
    context_schema: Schema,
    output_schema: Schema,
    initialized: bool,
}

impl ContextStore {
    /// Create an empty store typed by the run's schemas.
    #[must_use]
    pub fn new(input_schema: Schema, context_schema: Schema, output_schema: Schema) -> Self {
        Self {
            input: Map::new(),
            state: Map::new(),
            output: Map::new(),
            branches: HashMap::new(),
            input_schema,
            context_schema,
            output_schema,
            initialized: false,
        }
    }

    /// Validate and write the run input, creating the empty state and
    /// output tables. Write-once: a second call fails.
    pub fn initialize(&mut self, input: Value, rec: &mut Recorder) -> Result<(), ContextError> {
        if self.initialized {
            return Err(ContextError::AlreadyInitialized);
        }

        schema::check(&self.input_schema, &input)?;
        rec.push(TraceEventKind::ContextValidate {
            subtree: "input".into(),
        });

        let table = match input {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                map
            }
        };
        self.input = table;
        self.initialized = true;
        rec.push(TraceEventKind::ContextInit {
            input: Value::Object(self.input.clone()),
        });
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has run.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The composite `{input, state, output}` root, plus `_branch` when a
    /// token scope is given.
    #[must_use]
    pub fn composite(&self, branch: Option<TokenId>) -> Value {
        let mut root = Map::new();
        root.insert("input".into(), Value::Object(self.input.clone()));
        root.insert("state".into(), Value::Object(self.state.clone()));
        root.insert("output".into(), Value::Object(self.output.clone()));
        if let Some(token) = branch {
            let table = self.branches.get(&token).cloned().unwrap_or_default();
            root.insert("_branch".into(), Value::Object(table));
        }
        Value::Object(root)
    }

    /// Resolve a read path. Returns `None` for undefined paths; emits a
    /// `context.read` event either way.
    #[must_use]
    pub fn read(
        &self,
        path: &JsonPath,
        branch: Option<TokenId>,
        rec: &mut Recorder,
    ) -> Option<Value> {
        let resolved = self.resolve(path, branch);
        rec.push(TraceEventKind::ContextRead {
            path: path.as_str().to_owned(),
            value: resolved.clone().unwrap_or(Value::Null),
            defined: resolved.is_some(),
        });
        resolved
    }

    /// Resolve a read path without emitting a trace event.
    ///
    /// Used internally and by the planner for bulk resolution where the
    /// surrounding operation (routing, merge) emits its own events.
    #[must_use]
    pub fn resolve(&self, path: &JsonPath, branch: Option<TokenId>) -> Option<Value> {
        match path.root() {
            PathRoot::Composite => {
                let root = self.composite(branch);
                path.resolve(&root).cloned()
            }
            PathRoot::Branch => {
                let token = branch?;
                let table = self.branches.get(&token)?;
                let root = Value::Object(table.clone());
                path.resolve(&root).cloned()
            }
        }
    }

    /// Write into `state` or `output`.
    ///
    /// State writes are validated against the `context_schema` subtree the
    /// path targets. Output writes are checked for path admissibility
    /// only — the output table is validated as a whole at completion.
    /// The matching `context.validate` event always precedes the
    /// `context.write`.
    pub fn write(
        &mut self,
        path: &WritePath,
        value: Value,
        mode: WriteMode,
        rec: &mut Recorder,
    ) -> Result<(), ContextError> {
        match path.namespace {
            WriteNamespace::State => {
                let located = schema::locate(&self.context_schema, &path.segments)?;
                located.check(&value)?;
            }
            WriteNamespace::Output => {
                let _ = schema::locate(&self.output_schema, &path.segments)?;
            }
        }
        rec.push(TraceEventKind::ContextValidate {
            subtree: path.as_str().to_owned(),
        });

        let table = match path.namespace {
            WriteNamespace::State => &mut self.state,
            WriteNamespace::Output => &mut self.output,
        };
        write_at(table, &path.segments, value.clone(), mode, path.as_str())?;
        rec.push(TraceEventKind::ContextWrite {
            path: path.as_str().to_owned(),
            value,
            mode: mode.as_str().to_owned(),
        });
        Ok(())
    }

    /// Create a token's branch table if it does not exist yet.
    pub fn ensure_branch(&mut self, token: TokenId) {
        self.branches.entry(token).or_default();
    }

    /// Write below a token's branch table. Branch tables are untyped; no
    /// schema applies, but the write is traced like any other.
    pub fn write_branch(
        &mut self,
        token: TokenId,
        segments: &[String],
        value: Value,
        mode: WriteMode,
        rec: &mut Recorder,
    ) -> Result<(), ContextError> {
        let dotted = format!("_branch.{}", segments.join("."));
        rec.push(TraceEventKind::ContextValidate {
            subtree: dotted.clone(),
        });
        let table = self.branches.entry(token).or_default();
        write_at(table, segments, value.clone(), mode, &dotted)?;
        rec.push(TraceEventKind::ContextWrite {
            path: dotted,
            value,
            mode: mode.as_str().to_owned(),
        });
        Ok(())
    }

    /// A token's branch table, if one exists.
    #[must_use]
    pub fn branch(&self, token: TokenId) -> Option<&Map<String, Value>> {
        self.branches.get(&token)
    }

    /// All branch tables, keyed by their owning token.
    pub fn branches(&self) -> impl Iterator<Item = (TokenId, &Map<String, Value>)> {
        self.branches.iter().map(|(token, table)| (*token, table))
    }

    /// Resolve a branch-rooted path against a specific token's table.
    #[must_use]
    pub fn branch_value(&self, token: TokenId, path: &JsonPath) -> Option<Value> {
        let table = self.branches.get(&token)?;
        let root = Value::Object(table.clone());
        path.resolve(&root).cloned()
    }

    /// Drop a token's branch table (run teardown).
    pub fn drop_branch(&mut self, token: TokenId) {
        self.branches.remove(&token);
    }

    /// Deep-copied, referentially consistent view of the composite root.
    /// Emits `context.snapshot` carrying the content.
    #[must_use]
    pub fn snapshot(&self, branch: Option<TokenId>, rec: &mut Recorder) -> Value {
        let content = self.composite(branch);
        rec.push(TraceEventKind::ContextSnapshot {
            content: content.clone(),
        });
        content
    }

    /// Apply a node output mapping.
    ///
    /// For each `destination → source` entry, the source JSONPath is
    /// resolved against `source_root` (the task output). Defined sources
    /// are written to their destinations (`context.output_mapping.apply`
    /// plus the ordinary write events); undefined sources are skipped with
    /// `context.output_mapping.skip` and the destination is untouched.
    pub fn apply_output_mapping(
        &mut self,
        mapping: &[(String, String)],
        source_root: &Value,
        target: MappingTarget,
        rec: &mut Recorder,
    ) -> Result<(), ContextError> {
        rec.push(TraceEventKind::OutputMappingInput {
            source: source_root.clone(),
        });

        for (dest, source) in mapping {
            let source_path = JsonPath::parse(source)?;
            let Some(value) = resolve_rooted(&source_path, source_root).cloned() else {
                rec.push(TraceEventKind::OutputMappingSkip {
                    dest: dest.clone(),
                    source: source.clone(),
                });
                continue;
            };

            rec.push(TraceEventKind::OutputMappingApply {
                dest: dest.clone(),
                value: value.clone(),
            });

            let path = WritePath::parse(dest)?;
            match (target, path.namespace) {
                (MappingTarget::Branch(token), WriteNamespace::Output) => {
                    // Sibling-group isolation: output writes stay in the
                    // token's branch table until the merge projects them.
                    let mut segments = vec!["output".to_owned()];
                    segments.extend(path.segments.iter().cloned());
                    self.write_branch(token, &segments, value, WriteMode::Set, rec)?;
                }
                _ => {
                    self.write(&path, value, WriteMode::Set, rec)?;
                }
            }
        }
        Ok(())
    }

    /// Validate the whole output table against the output schema.
    pub fn validate_output(&self, rec: &mut Recorder) -> Result<(), ContextError> {
        schema::check(&self.output_schema, &Value::Object(self.output.clone()))?;
        rec.push(TraceEventKind::ContextValidate {
            subtree: "output".into(),
        });
        Ok(())
    }

    /// The immutable input table.
    #[must_use]
    pub fn input(&self) -> &Map<String, Value> {
        &self.input
    }

    /// The mutable state table.
    #[must_use]
    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    /// The output table.
    #[must_use]
    pub fn output(&self) -> &Map<String, Value> {
        &self.output
    }
}

/// Compose an object from a mapping table by resolving each source path
/// against `source_root` and writing it at the destination key path.
///
/// Returns the composed object and the entries whose sources were
/// undefined. Used for task input composition and the final output
/// projection; emits no trace events — the surrounding operation does.
pub fn compose_object(
    mapping: &[(String, String)],
    source_root: &Value,
) -> Result<(Value, Vec<(String, String)>), ContextError> {
    let mut composed = Map::new();
    let mut skipped = Vec::new();
    for (dest, source) in mapping {
        let source_path = JsonPath::parse(source)?;
        match resolve_rooted(&source_path, source_root) {
            Some(value) => {
                let segments = crate::path::parse_key_path(dest)?;
                write_at(
                    &mut composed,
                    &segments,
                    value.clone(),
                    WriteMode::Set,
                    dest,
                )?;
            }
            None => skipped.push((dest.clone(), source.clone())),
        }
    }
    Ok((Value::Object(composed), skipped))
}
