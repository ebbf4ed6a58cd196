//! Declarative schema model.
//!
//! A [`Schema`] is the JSON-Schema-subset the definition store ships with
//! authored artifacts: a type keyword, object properties with `required`
//! and `additionalProperties`, array `items`, an `enum` whitelist and a
//! `nullable` escape hatch. Schemas arrive as data (deserialized from the
//! definition), so the model is a plain struct rather than a combinator
//! tree.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `type` keyword of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    /// A JSON object.
    Object,
    /// A JSON array.
    Array,
    /// A JSON string.
    String,
    /// Any JSON number.
    Number,
    /// A JSON number with no fractional part.
    Integer,
    /// A JSON boolean.
    Boolean,
    /// JSON `null`.
    Null,
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Null => "null",
        };
        f.write_str(s)
    }
}

/// A schema node.
///
/// A default-constructed schema constrains nothing and accepts every value;
/// [`Schema::any`] spells that out at call sites.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Schema {
    /// Expected JSON type, if constrained.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,

    /// Named properties of an object schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, Schema>>,

    /// Property names that must be present on an object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,

    /// Whether properties outside `properties` are admitted. Defaults to
    /// `true` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,

    /// Item schema of an array schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,

    /// Exhaustive whitelist of admitted values.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enumeration: Option<Vec<Value>>,

    /// Whether `null` is admitted in addition to the declared type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
}

impl Schema {
    /// The unconstrained schema: accepts any value.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// An object schema with the given properties, all optional.
    #[must_use]
    pub fn object(properties: impl IntoIterator<Item = (String, Schema)>) -> Self {
        Self {
            schema_type: Some(SchemaType::Object),
            properties: Some(properties.into_iter().collect()),
            ..Self::default()
        }
    }

    /// A bare typed schema with no further constraints.
    #[must_use]
    pub fn of_type(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::default()
        }
    }

    /// Mark property names as required (object schemas).
    #[must_use]
    pub fn with_required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Forbid properties outside `properties` (object schemas).
    #[must_use]
    pub fn closed(mut self) -> Self {
        self.additional_properties = Some(false);
        self
    }

    /// Admit `null` in addition to the declared type.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = Some(true);
        self
    }

    /// Whether properties outside `properties` are admitted.
    #[must_use]
    pub fn admits_additional(&self) -> bool {
        self.additional_properties.unwrap_or(true)
    }

    /// Returns `true` if this schema places no constraint on values.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.schema_type.is_none() && self.enumeration.is_none() && self.properties.is_none()
    }
}
