//! Entity definitions: the declarative shapes the type assembler turns into
//! GraphQL object, enum, and union types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

/// Scalars understood by the query engine without any entity definition.
pub const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

/// Returns true when `type_name` names one of [`BUILTIN_SCALARS`].
pub fn is_builtin_scalar(type_name: &str) -> bool {
    BUILTIN_SCALARS.contains(&type_name)
}

/// Kind of GraphQL type an entity compiles to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    #[default]
    Object,
    Enum,
    Union,
}

/// A named data shape, optionally exposed as query and mutation fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDef {
    /// GraphQL type name. Falls back to the entity key when absent.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub model_type: ModelType,
    #[serde(default)]
    pub fields: IndexMap<String, FieldDef>,
    /// Enum values; only meaningful for [`ModelType::Enum`].
    #[serde(default)]
    pub values: EnumValues,
    /// Member entity keys; only meaningful for [`ModelType::Union`].
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub connector: Option<ConnectorBinding>,
    #[serde(default)]
    pub expose: bool,
    #[serde(default)]
    pub single_endpoint: Option<EndpointDef>,
    #[serde(default)]
    pub multi_endpoint: Option<EndpointDef>,
    #[serde(default)]
    pub mutations: IndexMap<String, MutationDef>,
}

impl EntityDef {
    /// The GraphQL type name for an entity stored under `key`.
    pub fn graphql_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.name.as_deref().filter(|name| !name.trim().is_empty()).unwrap_or(key)
    }

    pub fn is_enum(&self) -> bool {
        self.model_type == ModelType::Enum
    }

    pub fn is_union(&self) -> bool {
        self.model_type == ModelType::Union
    }
}

/// Declared enum values, either a bare list of names or a map of name to details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumValues {
    List(Vec<String>),
    Map(IndexMap<String, EnumValueDef>),
}

impl Default for EnumValues {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl EnumValues {
    /// Iterates `(name, description)` pairs in declaration order.
    pub fn entries(&self) -> Vec<(&str, Option<&str>)> {
        match self {
            Self::List(names) => names.iter().map(|name| (name.as_str(), None)).collect(),
            Self::Map(values) => values
                .iter()
                .map(|(name, def)| (name.as_str(), def.description.as_deref()))
                .collect(),
        }
    }

    pub fn contains(&self, candidate: &str) -> bool {
        match self {
            Self::List(names) => names.iter().any(|name| name == candidate),
            Self::Map(values) => values.contains_key(candidate),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::List(names) => names.is_empty(),
            Self::Map(values) => values.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumValueDef {
    #[serde(default)]
    pub description: Option<String>,
}

/// Binds an entity to a logical connector plus static per-entity configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorBinding {
    #[serde(rename = "type")]
    pub connector_type: String,
    #[serde(default)]
    pub configs: JsonMap<String, Value>,
}

/// Per-field or per-endpoint adjustments to how the connector pipeline runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOverride {
    /// Connector-defined verb; required for mutations, optional hint elsewhere.
    #[serde(default)]
    pub method_name: Option<String>,
    /// Replaces the connector's default pre-stages when non-empty.
    #[serde(default)]
    pub pre_pipeline: Option<Vec<String>>,
    /// Replaces the connector's default post-stages when non-empty.
    #[serde(default)]
    pub post_pipeline: Option<Vec<String>>,
    #[serde(default)]
    pub pipeline_params: JsonMap<String, Value>,
    /// Highest-precedence configuration layer.
    #[serde(default)]
    pub configs: JsonMap<String, Value>,
}

impl PipelineOverride {
    /// The pre-stage list that replaces the connector default; an empty list keeps the default.
    pub fn custom_pre(&self) -> Option<Vec<String>> {
        self.pre_pipeline.clone().filter(|stages| !stages.is_empty())
    }

    pub fn custom_post(&self) -> Option<Vec<String>> {
        self.post_pipeline.clone().filter(|stages| !stages.is_empty())
    }

    /// Every stage name referenced by the custom pre/post lists.
    pub fn referenced_stages(&self) -> impl Iterator<Item = &str> {
        self.pre_pipeline
            .iter()
            .chain(self.post_pipeline.iter())
            .flatten()
            .map(String::as_str)
    }
}

/// One field of an entity, or an explicit argument override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub multivalued: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub description: Option<String>,
    /// Only honored where the field is used as an input.
    #[serde(default)]
    pub default_value: Option<Value>,
    /// Arguments accepted by the field when it resolves through a connector.
    #[serde(default)]
    pub args: IndexMap<String, FieldDef>,
    /// `child argument -> parent key`: copies `parent[parentKey]` into the child call's args.
    #[serde(default)]
    pub relation: IndexMap<String, String>,
    #[serde(flatten)]
    pub pipeline: PipelineOverride,
}

impl FieldDef {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            multivalued: false,
            required: false,
            read_only: false,
            description: None,
            default_value: None,
            args: IndexMap::new(),
            relation: IndexMap::new(),
            pipeline: PipelineOverride::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn multivalued(mut self) -> Self {
        self.multivalued = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// A read endpoint (single or multi) exposed on the query root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub args: IndexMap<String, FieldDef>,
    /// Field names excluded from argument derivation; `"all"` excludes every field.
    #[serde(default)]
    pub excluded_args: Vec<String>,
    #[serde(flatten)]
    pub pipeline: PipelineOverride,
}

/// A write operation exposed on the mutation root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationDef {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub multivalued: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub args: IndexMap<String, FieldDef>,
    #[serde(default)]
    pub excluded_args: Vec<String>,
    #[serde(flatten)]
    pub pipeline: PipelineOverride,
}

/// Excluded-argument marker that removes every derived argument.
pub const EXCLUDE_ALL: &str = "all";

pub fn is_excluded(excluded: &[String], name: &str) -> bool {
    excluded.iter().any(|entry| entry == EXCLUDE_ALL || entry == name)
}
