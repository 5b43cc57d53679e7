//! Lowers the compiled schema onto async-graphql's dynamic schema builder and
//! binds every field to its resolver.

use std::sync::Arc;

use async_graphql::{
    Name, Value as GqlValue,
    dynamic::{
        Enum, EnumItem, Field, FieldFuture, FieldValue, InputObject, InputValue, Object, ResolverContext, Schema, Type, Union,
    },
};
use indexmap::IndexMap;
use retort_engine::{PipelineEngine, SharedContext};
use serde_json::{Map as JsonMap, Value};
use tracing::{debug, warn};

use crate::{
    assembler::{TypeAssembler, TypeRegistry},
    compiled::{ArgTarget, CallMode, CompiledArg, CompiledField, CompiledInputType, CompiledType, FieldResolver, OutputKind, TypeShape},
    error::SchemaError,
    option_args::builtin_input_types,
};

pub const QUERY_ROOT: &str = "Query";
pub const MUTATION_ROOT: &str = "Mutation";

/// Key a mutation result is tagged with so union fields can pick its member type.
pub const RESULT_TYPE_KEY: &str = "type";

/// An object value handed down to child resolvers.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentRecord {
    pub value: Value,
    /// Lineage of the connector call that produced the record.
    pub lineage: Option<String>,
}

/// Request data holding the raw request text; root fields use it as their parent lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLineage(pub String);

struct FieldBinding {
    field_name: String,
    shape: TypeShape,
    kind: OutputKind,
    resolver: FieldResolver,
    engine: Arc<PipelineEngine>,
}

/// Builds the executable schema from an assembled type set.
///
/// # Errors
/// [`SchemaError::NoQueryFields`] when no entity exposes a read endpoint, or
/// the builder's own error when the lowered schema is inconsistent.
pub fn build_schema(assembler: &TypeAssembler, engine: Arc<PipelineEngine>) -> Result<Schema, SchemaError> {
    if assembler.query_fields().is_empty() {
        return Err(SchemaError::NoQueryFields);
    }
    let registry = assembler.registry();
    let mutation_root = (!assembler.mutation_fields().is_empty()).then_some(MUTATION_ROOT);
    let mut builder = Schema::build(QUERY_ROOT, mutation_root, None);

    for builtin in builtin_input_types() {
        builder = builder.register(builtin);
    }
    for (_, compiled) in registry.outputs() {
        builder = builder.register(lower_output(compiled, registry, &engine)?);
    }
    for (_, compiled) in registry.inputs() {
        builder = builder.register(lower_input(compiled, registry)?);
    }
    builder = builder.register(lower_root(QUERY_ROOT, assembler.query_fields(), registry, &engine)?);
    if let Some(mutation_root) = mutation_root {
        builder = builder.register(lower_root(mutation_root, assembler.mutation_fields(), registry, &engine)?);
    }

    debug!(
        types = registry.output_count() + registry.input_count(),
        query_fields = assembler.query_fields().len(),
        mutation_fields = assembler.mutation_fields().len(),
        "building executable schema"
    );
    Ok(builder.finish()?)
}

fn lower_root(
    name: &str,
    fields: &IndexMap<String, CompiledField>,
    registry: &TypeRegistry,
    engine: &Arc<PipelineEngine>,
) -> Result<Object, SchemaError> {
    fields
        .values()
        .try_fold(Object::new(name), |object, field| Ok(object.field(lower_field(field, registry, engine)?)))
}

fn lower_output(compiled: &CompiledType, registry: &TypeRegistry, engine: &Arc<PipelineEngine>) -> Result<Type, SchemaError> {
    let lowered: Type = match compiled {
        CompiledType::Object { name, description, fields } => {
            let mut object = Object::new(name);
            if let Some(description) = description {
                object = object.description(description);
            }
            fields
                .values()
                .try_fold(object, |object, field| Ok::<_, SchemaError>(object.field(lower_field(field, registry, engine)?)))?
                .into()
        }
        CompiledType::Enum { name, description, values } => lower_enum(name, description.as_deref(), values).into(),
        CompiledType::Union { name, description, members } => {
            let mut union = members.values().fold(Union::new(name), |union, member| union.possible_type(member));
            if let Some(description) = description {
                union = union.description(description);
            }
            union.into()
        }
    };
    Ok(lowered)
}

fn lower_input(compiled: &CompiledInputType, registry: &TypeRegistry) -> Result<Type, SchemaError> {
    let lowered: Type = match compiled {
        CompiledInputType::Enum { name, description, values } => lower_enum(name, description.as_deref(), values).into(),
        CompiledInputType::Object { name, description, fields } => {
            let mut input = InputObject::new(name);
            if let Some(description) = description {
                input = input.description(description);
            }
            fields
                .values()
                .try_fold(input, |input, field| Ok::<_, SchemaError>(input.field(lower_arg(field, registry)?)))?
                .into()
        }
    };
    Ok(lowered)
}

fn lower_enum(name: &str, description: Option<&str>, values: &[(String, Option<String>)]) -> Enum {
    let mut enumeration = values.iter().fold(Enum::new(name), |enumeration, (value, description)| {
        let mut item = EnumItem::new(value);
        if let Some(description) = description {
            item = item.description(description);
        }
        enumeration.item(item)
    });
    if let Some(description) = description {
        enumeration = enumeration.description(description);
    }
    enumeration
}

fn lower_arg(arg: &CompiledArg, registry: &TypeRegistry) -> Result<InputValue, SchemaError> {
    let mut input = InputValue::new(&arg.name, arg.shape.to_type_ref());
    if let Some(description) = &arg.description {
        input = input.description(description);
    }
    if let Some(default) = &arg.default_value {
        input = input.default_value(default_literal(&arg.name, default, &arg.target, registry)?);
    }
    Ok(input)
}

/// Defaults of enum-typed arguments must be enum literals, not strings.
fn default_literal(arg: &str, default: &Value, target: &ArgTarget, registry: &TypeRegistry) -> Result<GqlValue, SchemaError> {
    if let ArgTarget::Entity(key) = target
        && let Some(CompiledInputType::Enum { .. }) = registry.input(key)
        && let Value::String(item) = default
    {
        return Ok(GqlValue::Enum(Name::new(item)));
    }
    GqlValue::from_json(default.clone()).map_err(|error| SchemaError::InvalidDefault {
        arg: arg.to_string(),
        message: error.to_string(),
    })
}

fn lower_field(field: &CompiledField, registry: &TypeRegistry, engine: &Arc<PipelineEngine>) -> Result<Field, SchemaError> {
    let binding = Arc::new(FieldBinding {
        field_name: field.name.clone(),
        shape: field.shape.clone(),
        kind: field.kind.clone(),
        resolver: field.resolver.clone(),
        engine: Arc::clone(engine),
    });
    let mut lowered = Field::new(&field.name, field.shape.to_type_ref(), move |ctx| {
        let binding = Arc::clone(&binding);
        FieldFuture::new(async move { resolve_field(ctx, &binding).await })
    });
    if let Some(description) = &field.description {
        lowered = lowered.description(description);
    }
    field
        .args
        .iter()
        .try_fold(lowered, |lowered, arg| Ok(lowered.argument(lower_arg(arg, registry)?)))
}

async fn resolve_field<'a>(ctx: ResolverContext<'a>, binding: &FieldBinding) -> async_graphql::Result<Option<FieldValue<'a>>> {
    let parent = ctx.parent_value.downcast_ref::<ParentRecord>();
    match &binding.resolver {
        FieldResolver::Structural => {
            let Some(parent) = parent else {
                return Ok(None);
            };
            let value = parent.value.get(&binding.field_name).cloned().unwrap_or(Value::Null);
            to_field_value(value, &binding.shape, &binding.kind, parent.lineage.as_deref())
        }
        FieldResolver::Connector(call) => {
            let mut args = JsonMap::new();
            for (name, value) in ctx.args.as_index_map() {
                args.insert(name.to_string(), value.clone().into_json()?);
            }
            let parent_lineage = match parent {
                Some(record) => record.lineage.clone(),
                None => ctx.data_opt::<RequestLineage>().map(|request| request.0.clone()),
            };
            let shared = ctx.data_opt::<SharedContext>().cloned().unwrap_or_default();

            let outcome = call
                .invoke(&binding.engine, parent.map(|record| &record.value), args, parent_lineage.as_deref(), &shared)
                .map_err(|error| {
                    warn!(field = %binding.field_name, kind = ?error.kind(), error = %error, "connector call failed");
                    async_graphql::Error::new(error.to_string())
                })?;

            let mut value = outcome.value;
            if call.mode == CallMode::Execute
                && let Value::Object(record) = &mut value
                && !record.contains_key(RESULT_TYPE_KEY)
            {
                record.insert(RESULT_TYPE_KEY.to_string(), Value::String(call.target_type.clone()));
            }
            to_field_value(value, &binding.shape, &binding.kind, Some(outcome.lineage.as_str()))
        }
    }
}

/// Shapes a JSON result to the field's declared type. A single value where a
/// list is declared becomes a one-element list.
fn to_field_value<'a>(value: Value, shape: &TypeShape, kind: &OutputKind, lineage: Option<&str>) -> async_graphql::Result<Option<FieldValue<'a>>> {
    match shape {
        TypeShape::NonNull(inner) => to_field_value(value, inner, kind, lineage),
        _ if value.is_null() => Ok(None),
        TypeShape::List(inner) => {
            let items = match value {
                Value::Array(items) => items,
                single => vec![single],
            };
            let values = items
                .into_iter()
                .map(|item| Ok(to_field_value(item, inner, kind, lineage)?.unwrap_or_else(|| FieldValue::value(GqlValue::Null))))
                .collect::<async_graphql::Result<Vec<_>>>()?;
            Ok(Some(FieldValue::list(values)))
        }
        TypeShape::Named(_) => leaf_value(value, kind, lineage).map(Some),
    }
}

fn leaf_value<'a>(value: Value, kind: &OutputKind, lineage: Option<&str>) -> async_graphql::Result<FieldValue<'a>> {
    let record = |value: Value| {
        FieldValue::owned_any(ParentRecord {
            value,
            lineage: lineage.map(str::to_string),
        })
    };
    match kind {
        OutputKind::Scalar => Ok(FieldValue::value(GqlValue::from_json(value)?)),
        OutputKind::Enum => match value {
            Value::String(item) => Ok(FieldValue::value(GqlValue::Enum(Name::new(item)))),
            other => Ok(FieldValue::value(GqlValue::from_json(other)?)),
        },
        OutputKind::Object => Ok(record(value)),
        OutputKind::Union { members } => {
            let tag = value.get(RESULT_TYPE_KEY).and_then(Value::as_str).unwrap_or_default();
            let member = members
                .get(tag)
                .or_else(|| members.values().find(|name| name.as_str() == tag))
                .cloned()
                .ok_or_else(|| async_graphql::Error::new(format!("cannot resolve union member for type tag '{tag}'")))?;
            Ok(record(value).with_type(member))
        }
    }
}
