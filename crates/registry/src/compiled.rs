//! Compiled, engine-independent descriptions of the assembled schema.
//!
//! The assembler produces these; `dynamic` lowers them onto async-graphql.
//! Keeping them separate lets tests inspect argument sets and resolver
//! bindings without executing queries.

use std::fmt;

use async_graphql::dynamic::TypeRef;
use indexmap::IndexMap;
use retort_engine::{
    Operation, Payload, PipelineEngine, PipelineError, PipelineParams, SharedContext,
    payload::PARENT_REQUEST_KEY,
};
use retort_types::FieldDef;
use serde_json::{Map as JsonMap, Value};

/// GraphQL type expression: a named type wrapped in list and non-null modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
    Named(String),
    List(Box<TypeShape>),
    NonNull(Box<TypeShape>),
}

impl TypeShape {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// `name`, then `[name]` if multivalued, then `!` if required.
    pub fn wrapped(name: impl Into<String>, multivalued: bool, required: bool) -> Self {
        let mut shape = Self::named(name);
        if multivalued {
            shape = Self::List(Box::new(shape));
        }
        if required {
            shape = Self::NonNull(Box::new(shape));
        }
        shape
    }

    pub fn base_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.base_name(),
        }
    }

    pub fn is_list(&self) -> bool {
        match self {
            Self::Named(_) => false,
            Self::List(_) => true,
            Self::NonNull(inner) => inner.is_list(),
        }
    }

    pub fn to_type_ref(&self) -> TypeRef {
        match self {
            Self::Named(name) => TypeRef::named(name.clone()),
            Self::List(inner) => TypeRef::List(Box::new(inner.to_type_ref())),
            Self::NonNull(inner) => TypeRef::NonNull(Box::new(inner.to_type_ref())),
        }
    }
}

impl fmt::Display for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// What sits at the bottom of an output field's [`TypeShape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKind {
    Scalar,
    Enum,
    Object,
    /// Member entity keys mapped to their GraphQL type names.
    Union { members: IndexMap<String, String> },
}

/// What sits at the bottom of an argument's [`TypeShape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgTarget {
    Scalar(String),
    /// An entity's input type, by entity key.
    Entity(String),
    /// One of the built-in option argument input types.
    Builtin(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledArg {
    pub name: String,
    pub shape: TypeShape,
    pub target: ArgTarget,
    pub description: Option<String>,
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    Resolve,
    Execute,
}

/// Everything a resolver needs to run one connector pipeline call.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorCall {
    pub mode: CallMode,
    pub connector_type: String,
    /// Entity key of the resolved type.
    pub target_type: String,
    /// Entity binding configs overlaid with field or endpoint override configs.
    pub config: JsonMap<String, Value>,
    pub multivalued: bool,
    pub method_name: Option<String>,
    pub custom_pre: Option<Vec<String>>,
    pub custom_post: Option<Vec<String>>,
    pub pipeline_params: JsonMap<String, Value>,
    pub args_definition: IndexMap<String, FieldDef>,
    /// `child argument -> parent key`.
    pub relation: IndexMap<String, String>,
}

/// Result of a connector call plus the lineage string of the call that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub value: Value,
    pub lineage: String,
}

impl ConnectorCall {
    /// Runs the call for one resolution.
    ///
    /// Relation entries copy `parent[parentKey]` into `args[childArgument]`
    /// (null when the parent lacks the key) before the pipeline starts.
    pub fn invoke(
        &self,
        engine: &PipelineEngine,
        parent: Option<&Value>,
        mut args: JsonMap<String, Value>,
        parent_lineage: Option<&str>,
        shared: &SharedContext,
    ) -> Result<CallOutcome, PipelineError> {
        for (child_argument, parent_key) in &self.relation {
            let related = parent.and_then(|record| record.get(parent_key)).cloned().unwrap_or(Value::Null);
            args.insert(child_argument.clone(), related);
        }

        let mut params = PipelineParams::with_values(self.pipeline_params.clone());
        params.args_definition = self.args_definition.clone();
        if let Some(lineage) = parent_lineage {
            params.values.insert(PARENT_REQUEST_KEY.to_string(), Value::String(lineage.to_string()));
        }

        let operation = match self.mode {
            CallMode::Resolve => Operation::Resolve,
            CallMode::Execute => Operation::Mutate,
        };
        let payload = Payload::new(operation, self.target_type.clone(), args, self.multivalued)
            .with_config(self.config.clone())
            .with_params(params)
            .with_method_name(self.method_name.clone());
        let lineage = payload.request_string();

        let custom_pre = self.custom_pre.as_deref();
        let custom_post = self.custom_post.as_deref();
        let value = match self.mode {
            CallMode::Resolve => engine.run_resolve(&self.connector_type, payload, custom_pre, custom_post, shared)?,
            CallMode::Execute => engine.run_execute(&self.connector_type, payload, custom_pre, custom_post, shared)?,
        };
        Ok(CallOutcome { value, lineage })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldResolver {
    /// Reads the field's key from the parent value.
    Structural,
    Connector(ConnectorCall),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledField {
    pub name: String,
    pub shape: TypeShape,
    pub kind: OutputKind,
    pub description: Option<String>,
    pub args: Vec<CompiledArg>,
    pub resolver: FieldResolver,
}

impl CompiledField {
    pub fn arg(&self, name: &str) -> Option<&CompiledArg> {
        self.args.iter().find(|arg| arg.name == name)
    }

    pub fn arg_names(&self) -> Vec<&str> {
        self.args.iter().map(|arg| arg.name.as_str()).collect()
    }

    pub fn connector_call(&self) -> Option<&ConnectorCall> {
        match &self.resolver {
            FieldResolver::Connector(call) => Some(call),
            FieldResolver::Structural => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompiledType {
    Object {
        name: String,
        description: Option<String>,
        fields: IndexMap<String, CompiledField>,
    },
    Enum {
        name: String,
        description: Option<String>,
        values: Vec<(String, Option<String>)>,
    },
    Union {
        name: String,
        description: Option<String>,
        members: IndexMap<String, String>,
    },
}

impl CompiledType {
    pub fn name(&self) -> &str {
        match self {
            Self::Object { name, .. } | Self::Enum { name, .. } | Self::Union { name, .. } => name,
        }
    }

    pub fn fields(&self) -> Option<&IndexMap<String, CompiledField>> {
        match self {
            Self::Object { fields, .. } => Some(fields),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompiledInputType {
    Enum {
        name: String,
        description: Option<String>,
        values: Vec<(String, Option<String>)>,
    },
    Object {
        name: String,
        description: Option<String>,
        fields: IndexMap<String, CompiledArg>,
    },
}

impl CompiledInputType {
    pub fn name(&self) -> &str {
        match self {
            Self::Enum { name, .. } | Self::Object { name, .. } => name,
        }
    }
}
