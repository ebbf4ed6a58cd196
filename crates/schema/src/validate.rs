//! Value validation against a [`Schema`].

use serde_json::Value;

use crate::error::{SchemaError, Violation};
use crate::schema::{Schema, SchemaType};

/// Validate `value` against `schema`, collecting every violation.
#[must_use]
pub fn validate(schema: &Schema, value: &Value) -> Vec<Violation> {
    let mut violations = Vec::new();
    validate_at(schema, value, "", &mut violations);
    violations
}

/// Validate `value` against `schema`, failing on the first batch of
/// violations.
pub fn check(schema: &Schema, value: &Value) -> Result<(), SchemaError> {
    let violations = validate(schema, value);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Violations(violations))
    }
}

/// Outcome of resolving a dotted path against a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Located<'a> {
    /// The path resolves to this subschema.
    Constrained(&'a Schema),
    /// The schema places no constraint at this path.
    Unconstrained,
}

impl<'a> Located<'a> {
    /// Validate a value against the located subschema, if any.
    pub fn check(&self, value: &Value) -> Result<(), SchemaError> {
        match self {
            Self::Constrained(schema) => check(schema, value),
            Self::Unconstrained => Ok(()),
        }
    }
}

/// Resolve the subschema governing a dotted path (`["foo", "bar"]` for
/// `foo.bar`) below `schema`.
///
/// Descends object `properties`. A segment that falls outside a closed
/// object (`additionalProperties: false`) is a [`SchemaError::PathDenied`];
/// a segment below an unconstrained location is admitted unconstrained.
pub fn locate<'a, S: AsRef<str>>(
    schema: &'a Schema,
    segments: &[S],
) -> Result<Located<'a>, SchemaError> {
    let mut current = schema;
    for (i, segment) in segments.iter().enumerate() {
        let segment = segment.as_ref();
        if let Some(properties) = &current.properties {
            if let Some(next) = properties.get(segment) {
                current = next;
                continue;
            }
            if !current.admits_additional() {
                return Err(SchemaError::PathDenied {
                    path: join_dotted(segments),
                    denied_at: segment.to_string(),
                });
            }
            return Ok(Located::Unconstrained);
        }
        // No property table: an explicit non-object type cannot be descended
        // into, anything else is unconstrained.
        match current.schema_type {
            None | Some(SchemaType::Object) => return Ok(Located::Unconstrained),
            Some(other) => {
                let prefix = if i == 0 {
                    "<root>".to_owned()
                } else {
                    join_dotted(&segments[..i])
                };
                return Err(SchemaError::PathDenied {
                    path: join_dotted(segments),
                    denied_at: format!("{prefix} (typed {other})"),
                });
            }
        }
    }
    Ok(Located::Constrained(current))
}

fn join_dotted<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<&str>>()
        .join(".")
}

fn validate_at(schema: &Schema, value: &Value, path: &str, out: &mut Vec<Violation>) {
    if value.is_null() && schema.nullable == Some(true) {
        return;
    }

    if let Some(allowed) = &schema.enumeration {
        if !allowed.contains(value) {
            out.push(Violation::new(
                path,
                format!("value {value} is not one of the admitted values"),
            ));
            return;
        }
    }

    let Some(expected) = schema.schema_type else {
        // Untyped schema: only object properties (if declared) constrain.
        if value.is_object() {
            validate_object(schema, value, path, out);
        }
        return;
    };

    let matches = match expected {
        SchemaType::Object => value.is_object(),
        SchemaType::Array => value.is_array(),
        SchemaType::String => value.is_string(),
        SchemaType::Number => value.is_number(),
        SchemaType::Integer => value.is_i64() || value.is_u64(),
        SchemaType::Boolean => value.is_boolean(),
        SchemaType::Null => value.is_null(),
    };
    if !matches {
        out.push(Violation::new(
            path,
            format!("expected {expected}, got {}", type_name(value)),
        ));
        return;
    }

    match expected {
        SchemaType::Object => validate_object(schema, value, path, out),
        SchemaType::Array => {
            if let (Some(items), Some(array)) = (&schema.items, value.as_array()) {
                for (i, item) in array.iter().enumerate() {
                    validate_at(items, item, &format!("{path}/{i}"), out);
                }
            }
        }
        _ => {}
    }
}

fn validate_object(schema: &Schema, value: &Value, path: &str, out: &mut Vec<Violation>) {
    let Some(object) = value.as_object() else {
        return;
    };

    if let Some(required) = &schema.required {
        for name in required {
            if !object.contains_key(name) {
                out.push(Violation::new(
                    path,
                    format!("missing required property {name:?}"),
                ));
            }
        }
    }

    let Some(properties) = &schema.properties else {
        return;
    };

    for (name, entry) in object {
        match properties.get(name) {
            Some(subschema) => {
                validate_at(subschema, entry, &format!("{path}/{name}"), out);
            }
            None if !schema.admits_additional() => {
                out.push(Violation::new(
                    path,
                    format!("property {name:?} is not admitted"),
                ));
            }
            None => {}
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
