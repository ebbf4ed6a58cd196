//! Context paths.
//!
//! Two path grammars cover every context access:
//!
//! - [`JsonPath`] — read paths. `$.state.items.0` (or bare
//!   `state.items.0`) resolves against the composite `{input, state,
//!   output}` root; `_branch.output.rating` resolves against a token's
//!   branch table. Resolution returns `Option`: an undefined path is
//!   distinct from one holding `null`.
//! - [`WritePath`] — dotted write paths. The first segment names the
//!   namespace (`state` or `output`); writes targeting `input` are
//!   rejected. Writes create intermediate objects as needed.

use serde_json::{Map, Value};

use crate::error::ContextError;

/// The root a [`JsonPath`] resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRoot {
    /// The composite `{input, state, output}` view.
    Composite,
    /// The current token's branch table.
    Branch,
}

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object member access.
    Key(String),
    /// Array element access.
    Index(usize),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        // Purely numeric segments index arrays; `items.0` is element zero.
        raw.parse::<usize>().map_or_else(|_| Self::Key(raw.to_owned()), Self::Index)
    }
}

/// A parsed read path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    root: PathRoot,
    segments: Vec<Segment>,
    raw: String,
}

impl JsonPath {
    /// Parse a read path.
    ///
    /// Accepts a leading `$` / `$.` root marker or a bare dotted path; a
    /// first segment of `_branch` roots the path at the branch table.
    pub fn parse(raw: &str) -> Result<Self, ContextError> {
        if raw.is_empty() {
            return Err(ContextError::invalid_path(raw, "empty path"));
        }

        let rest = raw.strip_prefix("$.").or_else(|| raw.strip_prefix('$')).unwrap_or(raw);

        if rest.is_empty() {
            return Ok(Self {
                root: PathRoot::Composite,
                segments: Vec::new(),
                raw: raw.to_owned(),
            });
        }

        let mut parts = rest.split('.');
        let mut segments = Vec::new();
        let mut root = PathRoot::Composite;

        if let Some(first) = parts.next() {
            if first.is_empty() {
                return Err(ContextError::invalid_path(raw, "empty segment"));
            }
            if first == "_branch" {
                root = PathRoot::Branch;
            } else {
                segments.push(Segment::parse(first));
            }
        }
        for part in parts {
            if part.is_empty() {
                return Err(ContextError::invalid_path(raw, "empty segment"));
            }
            segments.push(Segment::parse(part));
        }

        Ok(Self {
            root,
            segments,
            raw: raw.to_owned(),
        })
    }

    /// The root this path resolves against.
    #[must_use]
    pub fn root(&self) -> PathRoot {
        self.root
    }

    /// The path as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve against a root value. Returns `None` when any step is
    /// undefined — callers must not conflate that with JSON `null`.
    #[must_use]
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match segment {
                Segment::Key(key) => current.as_object()?.get(key)?,
                Segment::Index(i) => current.as_array()?.get(*i)?,
            };
        }
        Some(current)
    }
}

impl std::fmt::Display for JsonPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// The writable namespace a [`WritePath`] targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteNamespace {
    /// The mutable `state` table.
    State,
    /// The `output` table.
    Output,
}

impl WriteNamespace {
    /// The namespace's path prefix.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Output => "output",
        }
    }
}

/// A parsed dotted write path (`state.foo.bar`, `output.result`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePath {
    /// The targeted namespace.
    pub namespace: WriteNamespace,
    /// Segments below the namespace. May be empty only for mapping
    /// destinations that replace a whole table; ordinary writes require at
    /// least one segment.
    pub segments: Vec<String>,
    raw: String,
}

impl WritePath {
    /// Parse a dotted write path.
    pub fn parse(raw: &str) -> Result<Self, ContextError> {
        let mut parts = raw.split('.');
        let namespace = match parts.next() {
            Some("state") => WriteNamespace::State,
            Some("output") => WriteNamespace::Output,
            Some("input") => return Err(ContextError::ImmutableInput(raw.to_owned())),
            Some(other) => {
                return Err(ContextError::invalid_path(
                    raw,
                    format!("unknown namespace {other:?}, expected state or output"),
                ));
            }
            None => return Err(ContextError::invalid_path(raw, "empty path")),
        };

        let mut segments = Vec::new();
        for part in parts {
            if part.is_empty() {
                return Err(ContextError::invalid_path(raw, "empty segment"));
            }
            segments.push(part.to_owned());
        }
        if segments.is_empty() {
            return Err(ContextError::invalid_path(
                raw,
                "write path needs a key below the namespace",
            ));
        }

        Ok(Self {
            namespace,
            segments,
            raw: raw.to_owned(),
        })
    }

    /// The path as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for WritePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Resolve a path against a self-contained root value.
///
/// Branch-rooted paths descend through the root's `_branch` key, so a
/// composite view that embeds the branch table (a snapshot, a task-input
/// root) resolves both forms. For branch tables held separately, use
/// [`crate::ContextStore::resolve`].
#[must_use]
pub fn resolve_rooted<'a>(path: &JsonPath, root: &'a Value) -> Option<&'a Value> {
    match path.root() {
        PathRoot::Composite => path.resolve(root),
        PathRoot::Branch => path.resolve(root.as_object()?.get("_branch")?),
    }
}

/// Parse a plain dotted key path (no namespace), used when composing task
/// inputs and the final result object.
pub fn parse_key_path(raw: &str) -> Result<Vec<String>, ContextError> {
    if raw.is_empty() {
        return Err(ContextError::invalid_path(raw, "empty path"));
    }
    let mut segments = Vec::new();
    for part in raw.split('.') {
        if part.is_empty() {
            return Err(ContextError::invalid_path(raw, "empty segment"));
        }
        segments.push(part.to_owned());
    }
    Ok(segments)
}

/// How a write combines with an existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Replace the destination.
    #[default]
    Set,
    /// Recursively merge object values into the destination; non-objects
    /// replace.
    Merge,
}

impl WriteMode {
    /// The mode's wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Merge => "merge",
        }
    }
}

/// Write `value` at `segments` below `table`, creating intermediate
/// objects as needed.
pub fn write_at(
    table: &mut Map<String, Value>,
    segments: &[String],
    value: Value,
    mode: WriteMode,
    full_path: &str,
) -> Result<(), ContextError> {
    debug_assert!(!segments.is_empty());
    let mut current = table;
    for segment in &segments[..segments.len() - 1] {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        current = entry.as_object_mut().ok_or_else(|| {
            ContextError::invalid_path(
                full_path,
                format!("segment {segment:?} holds a non-object value"),
            )
        })?;
    }

    let last = &segments[segments.len() - 1];
    match mode {
        WriteMode::Set => {
            current.insert(last.clone(), value);
        }
        WriteMode::Merge => match (current.get_mut(last), value) {
            (Some(existing), incoming) => merge_value(existing, incoming),
            (None, incoming) => {
                current.insert(last.clone(), incoming);
            }
        },
    }
    Ok(())
}

/// Recursive object merge: object-into-object merges per key, anything
/// else replaces.
fn merge_value(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, incoming) => *slot = incoming,
    }
}
