//! Builds compiled output and input types from entity definitions.
//!
//! Loading is memoized per entity key. The first step of loading an entity
//! registers a [`Slot::Pending`] placeholder, and fields refer to other types
//! by name, so cyclic entity graphs terminate: a second request for a key that
//! is already pending returns immediately.

use std::sync::Arc;

use indexmap::IndexMap;
use retort_engine::StageRegistry;
use retort_types::{ConnectorBinding, EntityDef, FieldDef, ModelType, PipelineOverride, RetortConfig, is_builtin_scalar, is_excluded};
use serde_json::{Map as JsonMap, Value};
use tracing::{debug, info, warn};

use crate::{
    compiled::{
        ArgTarget, CallMode, CompiledArg, CompiledField, CompiledInputType, CompiledType, ConnectorCall, FieldResolver, OutputKind, TypeShape,
    },
    error::SchemaError,
    option_args::append_option_args,
};

/// Prefix of every entity input type name.
pub const INPUT_TYPE_PREFIX: &str = "Input_";

pub fn input_type_name(graphql_name: &str) -> String {
    format!("{INPUT_TYPE_PREFIX}{graphql_name}")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    /// Registered as a forward reference; body still under construction.
    Pending,
    Ready(T),
}

impl<T> Slot<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Pending => None,
        }
    }
}

/// Two independent memo tables keyed by entity key: output types and input types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeRegistry {
    outputs: IndexMap<String, Slot<CompiledType>>,
    inputs: IndexMap<String, Slot<CompiledInputType>>,
}

impl TypeRegistry {
    pub fn output(&self, key: &str) -> Option<&CompiledType> {
        self.outputs.get(key).and_then(Slot::ready)
    }

    pub fn input(&self, key: &str) -> Option<&CompiledInputType> {
        self.inputs.get(key).and_then(Slot::ready)
    }

    pub fn has_output(&self, key: &str) -> bool {
        self.outputs.contains_key(key)
    }

    pub fn has_input(&self, key: &str) -> bool {
        self.inputs.contains_key(key)
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &CompiledType)> {
        self.outputs.iter().filter_map(|(key, slot)| slot.ready().map(|compiled| (key.as_str(), compiled)))
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&str, &CompiledInputType)> {
        self.inputs.iter().filter_map(|(key, slot)| slot.ready().map(|compiled| (key.as_str(), compiled)))
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }
}

#[derive(Debug, Clone)]
struct Checkpoint {
    registry: TypeRegistry,
    query_fields: IndexMap<String, CompiledField>,
    mutation_fields: IndexMap<String, CompiledField>,
}

/// An entity that failed to assemble and was left out of the schema.
#[derive(Debug)]
pub struct SkippedEntity {
    pub key: String,
    pub error: SchemaError,
}

#[derive(Debug, Clone)]
pub struct TypeAssembler {
    config: Arc<RetortConfig>,
    stages: StageRegistry,
    registry: TypeRegistry,
    query_fields: IndexMap<String, CompiledField>,
    mutation_fields: IndexMap<String, CompiledField>,
}

impl TypeAssembler {
    pub fn new(config: Arc<RetortConfig>, stages: StageRegistry) -> Self {
        Self {
            config,
            stages,
            registry: TypeRegistry::default(),
            query_fields: IndexMap::new(),
            mutation_fields: IndexMap::new(),
        }
    }

    pub fn config(&self) -> &RetortConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn query_fields(&self) -> &IndexMap<String, CompiledField> {
        &self.query_fields
    }

    pub fn mutation_fields(&self) -> &IndexMap<String, CompiledField> {
        &self.mutation_fields
    }

    /// Loads every configured entity in configuration order.
    ///
    /// With `debug` set the first failure aborts assembly. Otherwise a failing
    /// entity is logged, everything it registered is rolled back, and assembly
    /// continues; the skipped entities are returned.
    pub fn assemble_all(&mut self, debug: bool) -> Result<Vec<SkippedEntity>, SchemaError> {
        let keys: Vec<String> = self.config.entities.keys().cloned().collect();
        let mut skipped = Vec::new();
        for key in keys {
            let checkpoint = self.checkpoint();
            if let Err(error) = self.load_type(&key) {
                if debug {
                    return Err(error);
                }
                warn!(entity = %key, error = %error, "entity skipped during schema assembly");
                self.restore(checkpoint);
                skipped.push(SkippedEntity { key, error });
            }
        }
        info!(
            output_types = self.registry.output_count(),
            input_types = self.registry.input_count(),
            query_fields = self.query_fields.len(),
            mutation_fields = self.mutation_fields.len(),
            skipped = skipped.len(),
            "schema assembled"
        );
        Ok(skipped)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            registry: self.registry.clone(),
            query_fields: self.query_fields.clone(),
            mutation_fields: self.mutation_fields.clone(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.registry = checkpoint.registry;
        self.query_fields = checkpoint.query_fields;
        self.mutation_fields = checkpoint.mutation_fields;
    }

    fn entity(&self, key: &str) -> Result<&EntityDef, SchemaError> {
        self.config.entity(key).ok_or_else(|| SchemaError::UndefinedEntity(key.to_string()))
    }

    /// Registers the output type for `key`, plus its endpoints when exposed.
    pub fn load_type(&mut self, key: &str) -> Result<(), SchemaError> {
        if self.registry.has_output(key) {
            return Ok(());
        }
        let config = Arc::clone(&self.config);
        let entity = config.entity(key).ok_or_else(|| SchemaError::UndefinedEntity(key.to_string()))?;
        let name = entity.graphql_name(key).to_string();
        debug!(entity = key, type_name = %name, model_type = ?entity.model_type, "loading output type");

        match entity.model_type {
            ModelType::Enum => {
                let compiled = CompiledType::Enum {
                    name,
                    description: entity.description.clone(),
                    values: enum_values(entity),
                };
                self.registry.outputs.insert(key.to_string(), Slot::Ready(compiled));
            }
            ModelType::Union => {
                self.registry.outputs.insert(key.to_string(), Slot::Pending);
                for member in &entity.types {
                    let member_entity = self.entity(member)?;
                    if member_entity.model_type != ModelType::Object {
                        return Err(SchemaError::InvalidUnionMember {
                            union: key.to_string(),
                            member: member.clone(),
                        });
                    }
                    self.load_type(member)?;
                }
                let compiled = CompiledType::Union {
                    name,
                    description: entity.description.clone(),
                    members: union_members(&config, entity),
                };
                self.registry.outputs.insert(key.to_string(), Slot::Ready(compiled));
            }
            ModelType::Object => {
                self.registry.outputs.insert(key.to_string(), Slot::Pending);
                let mut fields = IndexMap::new();
                for (field_name, field) in &entity.fields {
                    let compiled = self.build_field(field_name, field, key)?;
                    fields.insert(field_name.clone(), compiled);
                }
                let compiled = CompiledType::Object {
                    name,
                    description: entity.description.clone(),
                    fields,
                };
                self.registry.outputs.insert(key.to_string(), Slot::Ready(compiled));
                if entity.expose {
                    self.expose_endpoints(key, entity)?;
                }
            }
        }
        Ok(())
    }

    /// Registers the input type for `key` (`Input_<Name>`).
    pub fn load_input_type(&mut self, key: &str) -> Result<(), SchemaError> {
        if self.registry.has_input(key) {
            return Ok(());
        }
        let config = Arc::clone(&self.config);
        let entity = config.entity(key).ok_or_else(|| SchemaError::UndefinedEntity(key.to_string()))?;
        let name = input_type_name(entity.graphql_name(key));
        debug!(entity = key, type_name = %name, "loading input type");

        match entity.model_type {
            ModelType::Union => Err(SchemaError::UnionInput(key.to_string())),
            ModelType::Enum => {
                let compiled = CompiledInputType::Enum {
                    name,
                    description: entity.description.clone(),
                    values: enum_values(entity),
                };
                self.registry.inputs.insert(key.to_string(), Slot::Ready(compiled));
                Ok(())
            }
            ModelType::Object => {
                self.registry.inputs.insert(key.to_string(), Slot::Pending);
                let mut fields = IndexMap::new();
                for (field_name, field) in &entity.fields {
                    let compiled = self.build_input_field(field_name, field)?;
                    fields.insert(field_name.clone(), compiled);
                }
                let compiled = CompiledInputType::Object {
                    name,
                    description: entity.description.clone(),
                    fields,
                };
                self.registry.inputs.insert(key.to_string(), Slot::Ready(compiled));
                Ok(())
            }
        }
    }

    /// Derives an endpoint's argument definitions from the owning entity's fields.
    ///
    /// Reads only take builtin-scalar and enum fields, forced optional.
    /// Union-typed fields never become arguments. An override with a field's
    /// name replaces the derived argument; otherwise exclusion by name or by
    /// `"all"`, or `readOnly` on a mutation, drops it. Override-only names are
    /// appended last.
    pub fn derive_endpoint_args(
        &self,
        fields: &IndexMap<String, FieldDef>,
        overrides: &IndexMap<String, FieldDef>,
        excluded: &[String],
        is_mutation: bool,
    ) -> IndexMap<String, FieldDef> {
        let mut derived = IndexMap::new();
        for (name, field) in fields {
            let target_model = if is_builtin_scalar(&field.type_name) {
                None
            } else {
                self.config.entity(&field.type_name).map(|entity| entity.model_type)
            };
            let scalar_or_enum = is_builtin_scalar(&field.type_name) || target_model == Some(ModelType::Enum);
            if !is_mutation && !scalar_or_enum {
                continue;
            }
            if target_model == Some(ModelType::Union) {
                continue;
            }
            if let Some(argument) = overrides.get(name) {
                derived.insert(name.clone(), argument.clone());
            } else if !is_excluded(excluded, name) && !(is_mutation && field.read_only) {
                let mut argument = field.clone();
                if !is_mutation {
                    argument.required = false;
                }
                derived.insert(name.clone(), argument);
            }
        }
        for (name, argument) in overrides {
            derived.insert(name.clone(), argument.clone());
        }
        derived
    }

    /// Compiles one output field of `owner`, loading its target type first.
    pub fn build_field(&mut self, name: &str, field: &FieldDef, owner: &str) -> Result<CompiledField, SchemaError> {
        self.check_stages(&format!("{owner}.{name}"), &field.pipeline)?;
        let config = Arc::clone(&self.config);

        let (type_name, kind, binding) = if is_builtin_scalar(&field.type_name) {
            (field.type_name.clone(), OutputKind::Scalar, None)
        } else {
            let target = config.entity(&field.type_name).ok_or_else(|| SchemaError::UnknownType {
                field: format!("{owner}.{name}"),
                type_name: field.type_name.clone(),
            })?;
            self.load_type(&field.type_name)?;
            (
                target.graphql_name(&field.type_name).to_string(),
                output_kind(&config, target),
                target.connector.as_ref(),
            )
        };

        let mut args = field
            .args
            .iter()
            .map(|(arg_name, arg)| self.build_input_field(arg_name, arg))
            .collect::<Result<Vec<_>, _>>()?;

        let resolver = match binding {
            Some(binding) => {
                if field.multivalued {
                    append_option_args(&mut args);
                }
                FieldResolver::Connector(ConnectorCall {
                    mode: CallMode::Resolve,
                    connector_type: binding.connector_type.clone(),
                    target_type: field.type_name.clone(),
                    config: layered_config(binding, &field.pipeline),
                    multivalued: field.multivalued,
                    method_name: field.pipeline.method_name.clone(),
                    custom_pre: field.pipeline.custom_pre(),
                    custom_post: field.pipeline.custom_post(),
                    pipeline_params: field.pipeline.pipeline_params.clone(),
                    args_definition: field.args.clone(),
                    relation: field.relation.clone(),
                })
            }
            None => FieldResolver::Structural,
        };

        Ok(CompiledField {
            name: name.to_string(),
            shape: TypeShape::wrapped(type_name, field.multivalued, field.required),
            kind,
            description: field.description.clone(),
            args,
            resolver,
        })
    }

    /// Compiles one input position: an argument or an input object field.
    pub fn build_input_field(&mut self, name: &str, field: &FieldDef) -> Result<CompiledArg, SchemaError> {
        let (type_name, target) = if is_builtin_scalar(&field.type_name) {
            (field.type_name.clone(), ArgTarget::Scalar(field.type_name.clone()))
        } else {
            let config = Arc::clone(&self.config);
            let entity = config.entity(&field.type_name).ok_or_else(|| SchemaError::UnknownType {
                field: name.to_string(),
                type_name: field.type_name.clone(),
            })?;
            self.load_input_type(&field.type_name)?;
            (input_type_name(entity.graphql_name(&field.type_name)), ArgTarget::Entity(field.type_name.clone()))
        };
        Ok(CompiledArg {
            name: name.to_string(),
            shape: TypeShape::wrapped(type_name, field.multivalued, field.required),
            target,
            description: field.description.clone(),
            default_value: field.default_value.clone(),
        })
    }

    fn expose_endpoints(&mut self, key: &str, entity: &EntityDef) -> Result<(), SchemaError> {
        let type_name = entity.graphql_name(key).to_string();
        let binding = entity.connector.as_ref();

        let endpoints = [(entity.single_endpoint.as_ref(), false), (entity.multi_endpoint.as_ref(), true)];
        for (endpoint, multivalued) in endpoints {
            let Some(endpoint) = endpoint.filter(|endpoint| !endpoint.name.trim().is_empty()) else {
                continue;
            };
            self.check_stages(&endpoint.name, &endpoint.pipeline)?;
            let args_definition = self.derive_endpoint_args(&entity.fields, &endpoint.args, &endpoint.excluded_args, false);
            let mut args = self.build_args(&args_definition)?;
            if multivalued {
                append_option_args(&mut args);
            }
            let resolver = endpoint_resolver(CallMode::Resolve, key, binding, &endpoint.pipeline, multivalued, args_definition);
            let field = CompiledField {
                name: endpoint.name.clone(),
                shape: TypeShape::wrapped(type_name.clone(), multivalued, false),
                kind: OutputKind::Object,
                description: endpoint.description.clone().or_else(|| entity.description.clone()),
                args,
                resolver,
            };
            debug!(entity = key, endpoint = %endpoint.name, multivalued, "query field exposed");
            self.query_fields.insert(endpoint.name.clone(), field);
        }

        for (mutation_name, mutation) in &entity.mutations {
            self.check_stages(mutation_name, &mutation.pipeline)?;
            let (result_name, kind) = if is_builtin_scalar(&mutation.type_name) {
                (mutation.type_name.clone(), OutputKind::Scalar)
            } else {
                let config = Arc::clone(&self.config);
                let target = config.entity(&mutation.type_name).ok_or_else(|| SchemaError::UnknownType {
                    field: mutation_name.clone(),
                    type_name: mutation.type_name.clone(),
                })?;
                self.load_type(&mutation.type_name)?;
                (target.graphql_name(&mutation.type_name).to_string(), output_kind(&config, target))
            };
            let args_definition = self.derive_endpoint_args(&entity.fields, &mutation.args, &mutation.excluded_args, true);
            let args = self.build_args(&args_definition)?;
            let resolver = endpoint_resolver(CallMode::Execute, key, binding, &mutation.pipeline, false, args_definition);
            let field = CompiledField {
                name: mutation_name.clone(),
                shape: TypeShape::wrapped(result_name, mutation.multivalued, mutation.required),
                kind,
                description: mutation.description.clone(),
                args,
                resolver,
            };
            debug!(entity = key, mutation = %mutation_name, "mutation field exposed");
            self.mutation_fields.insert(mutation_name.clone(), field);
        }
        Ok(())
    }

    fn build_args(&mut self, definitions: &IndexMap<String, FieldDef>) -> Result<Vec<CompiledArg>, SchemaError> {
        definitions.iter().map(|(name, definition)| self.build_input_field(name, definition)).collect()
    }

    fn check_stages(&self, owner: &str, pipeline: &PipelineOverride) -> Result<(), SchemaError> {
        match pipeline.referenced_stages().find(|stage| !self.stages.contains(stage)) {
            Some(stage) => Err(SchemaError::UnknownStage {
                owner: owner.to_string(),
                stage: stage.to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn enum_values(entity: &EntityDef) -> Vec<(String, Option<String>)> {
    entity
        .values
        .entries()
        .into_iter()
        .map(|(value, description)| (value.to_string(), description.map(str::to_string)))
        .collect()
}

fn union_members(config: &RetortConfig, entity: &EntityDef) -> IndexMap<String, String> {
    entity
        .types
        .iter()
        .map(|member| {
            let name = config.entity(member).map_or(member.as_str(), |member_entity| member_entity.graphql_name(member));
            (member.clone(), name.to_string())
        })
        .collect()
}

fn output_kind(config: &RetortConfig, target: &EntityDef) -> OutputKind {
    match target.model_type {
        ModelType::Object => OutputKind::Object,
        ModelType::Enum => OutputKind::Enum,
        ModelType::Union => OutputKind::Union {
            members: union_members(config, target),
        },
    }
}

/// Entity binding configs with the override's configs layered on top.
fn layered_config(binding: &ConnectorBinding, pipeline: &PipelineOverride) -> JsonMap<String, Value> {
    let mut config = binding.configs.clone();
    config.extend(pipeline.configs.clone());
    config
}

fn endpoint_resolver(
    mode: CallMode,
    owner: &str,
    binding: Option<&ConnectorBinding>,
    pipeline: &PipelineOverride,
    multivalued: bool,
    args_definition: IndexMap<String, FieldDef>,
) -> FieldResolver {
    let Some(binding) = binding else {
        return FieldResolver::Structural;
    };
    FieldResolver::Connector(ConnectorCall {
        mode,
        connector_type: binding.connector_type.clone(),
        target_type: owner.to_string(),
        config: layered_config(binding, pipeline),
        multivalued,
        method_name: pipeline.method_name.clone(),
        custom_pre: pipeline.custom_pre(),
        custom_post: pipeline.custom_post(),
        pipeline_params: pipeline.pipeline_params.clone(),
        args_definition,
        relation: IndexMap::new(),
    })
}
