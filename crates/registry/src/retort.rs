//! The public facade: assembles a schema from configuration and executes
//! GraphQL requests against it.

use std::{path::Path, sync::Arc};

use async_graphql::{PathSegment, Request, Response, Variables, dynamic::Schema};
use indexmap::IndexMap;
use retort_engine::{PipelineEngine, SharedContext, Stage, StageRegistry};
use retort_types::RetortConfig;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    assembler::{SkippedEntity, TypeAssembler, TypeRegistry},
    compiled::CompiledField,
    dynamic::{RequestLineage, build_schema},
    error::SchemaError,
    validation::input_violations,
};

/// One entry of a GraphQL response's `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Value>,
}

/// `{data, errors}` in the shape a GraphQL client expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorEntry>,
}

impl ExecutionResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn from_response(response: Response) -> Self {
        let errors = response
            .errors
            .into_iter()
            .map(|error| ErrorEntry {
                message: error.message,
                path: error
                    .path
                    .into_iter()
                    .map(|segment| match segment {
                        PathSegment::Field(name) => Value::String(name),
                        PathSegment::Index(index) => Value::from(index),
                    })
                    .collect(),
            })
            .collect();
        let data = match response.data.into_json() {
            Ok(Value::Null) | Err(_) => None,
            Ok(data) => Some(data),
        };
        Self { data, errors }
    }
}

/// Configures how a [`Retort`] is assembled.
#[derive(Debug, Clone)]
pub struct RetortBuilder {
    stages: StageRegistry,
    debug: bool,
    shared: SharedContext,
}

impl Default for RetortBuilder {
    fn default() -> Self {
        Self {
            stages: StageRegistry::with_builtins(),
            debug: false,
            shared: SharedContext::default(),
        }
    }
}

impl RetortBuilder {
    /// Makes a custom stage available to connector and field pipelines under `name`.
    pub fn register_stage<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Stage> + Send + Sync + 'static,
    {
        self.stages.register(name, factory);
        self
    }

    /// In debug mode the first entity that fails to assemble aborts construction.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn shared_context(mut self, shared: SharedContext) -> Self {
        self.shared = shared;
        self
    }

    /// # Errors
    /// Engine construction errors, assembly errors in debug mode, and schema build errors.
    pub fn build(self, config: RetortConfig) -> Result<Retort, SchemaError> {
        let config = Arc::new(config);
        let engine = Arc::new(PipelineEngine::new(config.connectors.clone(), self.stages.clone())?);
        let mut assembler = TypeAssembler::new(Arc::clone(&config), self.stages);
        let skipped = assembler.assemble_all(self.debug)?;
        let schema = build_schema(&assembler, Arc::clone(&engine))?;
        info!(
            entities = config.entities.len(),
            connectors = config.connectors.len(),
            debug = self.debug,
            "retort schema ready"
        );
        Ok(Retort {
            engine,
            assembler,
            schema,
            shared: self.shared,
            skipped,
        })
    }

    /// Loads `<dir>/connectors/*.json` and `<dir>/models/*.json`, then builds.
    pub fn build_from_dir(self, dir: impl AsRef<Path>) -> Result<Retort, SchemaError> {
        let config = RetortConfig::load_from_dir(dir)?;
        self.build(config)
    }
}

/// An assembled schema bound to its pipeline engine.
///
/// Built once and then only read, so a shared reference can serve concurrent
/// requests. The shared pipeline context changes only through `&mut self`.
pub struct Retort {
    engine: Arc<PipelineEngine>,
    assembler: TypeAssembler,
    schema: Schema,
    shared: SharedContext,
    skipped: Vec<SkippedEntity>,
}

impl std::fmt::Debug for Retort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retort")
            .field("engine", &self.engine)
            .field("query_fields", &self.assembler.query_fields().keys().collect::<Vec<_>>())
            .field("mutation_fields", &self.assembler.mutation_fields().keys().collect::<Vec<_>>())
            .field("skipped", &self.skipped.len())
            .finish()
    }
}

impl Retort {
    pub fn builder() -> RetortBuilder {
        RetortBuilder::default()
    }

    pub fn new(config: RetortConfig) -> Result<Self, SchemaError> {
        Self::builder().build(config)
    }

    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, SchemaError> {
        Self::builder().build_from_dir(dir)
    }

    /// Executes one GraphQL request.
    ///
    /// Resolver failures never abort the request; they surface as entries in
    /// [`ExecutionResult::errors`] next to whatever data did resolve.
    pub async fn execute(&self, query: &str, variables: Option<Value>, operation_name: Option<&str>) -> ExecutionResult {
        let mut request = Request::new(query)
            .data(self.shared.clone())
            .data(RequestLineage(query.to_string()));
        if let Some(variables) = variables {
            request = request.variables(Variables::from_json(variables));
        }
        if let Some(operation_name) = operation_name {
            request = request.operation_name(operation_name);
        }
        let result = ExecutionResult::from_response(self.schema.execute(request).await);
        debug!(errors = result.errors.len(), has_data = result.data.is_some(), "request executed");
        result
    }

    /// Replaces the context every later pipeline call receives as default params.
    pub fn set_shared_pipeline_context(&mut self, shared: SharedContext) {
        self.shared = shared;
    }

    pub fn shared_pipeline_context(&self) -> &SharedContext {
        &self.shared
    }

    /// Checks `data` against the input type derived for `entity`.
    ///
    /// # Errors
    /// [`SchemaError::UndefinedEntity`] for an unknown entity key, or the
    /// assembly error for an entity whose input type cannot be built.
    pub fn validate_data(&self, data: &Value, entity: &str) -> Result<bool, SchemaError> {
        let violations = self.validation_errors(data, entity)?;
        if !violations.is_empty() {
            debug!(entity, violations = ?violations, "data failed validation");
        }
        Ok(violations.is_empty())
    }

    /// Like [`Retort::validate_data`], returning every violation with its path.
    pub fn validation_errors(&self, data: &Value, entity: &str) -> Result<Vec<String>, SchemaError> {
        if self.assembler.registry().has_input(entity) {
            return Ok(input_violations(data, entity, self.assembler.registry()));
        }
        let mut scratch = self.assembler.clone();
        scratch.load_input_type(entity)?;
        Ok(input_violations(data, entity, scratch.registry()))
    }

    pub fn query_fields(&self) -> &IndexMap<String, CompiledField> {
        self.assembler.query_fields()
    }

    pub fn mutation_fields(&self) -> &IndexMap<String, CompiledField> {
        self.assembler.mutation_fields()
    }

    pub fn registry(&self) -> &TypeRegistry {
        self.assembler.registry()
    }

    /// Entities left out of the schema because they failed to assemble.
    pub fn skipped_entities(&self) -> &[SkippedEntity] {
        &self.skipped
    }

    pub fn engine(&self) -> &PipelineEngine {
        &self.engine
    }

    /// The schema in SDL form.
    pub fn sdl(&self) -> String {
        self.schema.sdl()
    }
}
