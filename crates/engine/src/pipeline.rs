//! Compiles connector stage lists into cached pipelines and runs payloads through them.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use indexmap::IndexMap;
use retort_types::ConnectorDef;
use serde_json::Value;
use tracing::debug;

use crate::{
    error::PipelineError,
    payload::{CURRENT_REQUEST_KEY, Operation, Payload, SharedContext},
    stage::{Stage, StageRegistry},
};

/// Separator between stage identifiers in a pipeline signature.
pub const SIGNATURE_SEPARATOR: &str = " > ";

/// An ordered, immutable chain of stage instances.
pub struct Pipeline {
    signature: String,
    stages: Vec<Box<dyn Stage>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("signature", &self.signature)
            .field("stage_count", &self.stages.len())
            .finish()
    }
}

impl Pipeline {
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn process(&self, payload: Payload) -> Result<Payload, PipelineError> {
        self.stages.iter().try_fold(payload, |payload, stage| stage.process(payload))
    }
}

pub fn signature_for(stage_names: &[String]) -> String {
    stage_names.join(SIGNATURE_SEPARATOR)
}

/// Owns the connector map, the stage registry, and the pipeline cache.
///
/// Connectors and stages are fixed at construction. Pipelines are compiled on
/// first use of a stage signature and shared by every later call with the same
/// signature for the lifetime of the engine.
pub struct PipelineEngine {
    connectors: IndexMap<String, ConnectorDef>,
    stages: StageRegistry,
    cache: Mutex<HashMap<String, Arc<Pipeline>>>,
}

impl fmt::Debug for PipelineEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("connectors", &self.connectors.keys().collect::<Vec<_>>())
            .field("stages", &self.stages)
            .finish()
    }
}

impl PipelineEngine {
    /// Builds an engine, rejecting connectors that name unregistered stages.
    pub fn new(connectors: IndexMap<String, ConnectorDef>, stages: StageRegistry) -> Result<Self, PipelineError> {
        for (name, connector) in &connectors {
            if connector.connector_class.trim().is_empty() {
                return Err(PipelineError::config(format!("connector '{name}' has no connectorClass")));
            }
            if let Some(unknown) = connector.stage_names().find(|stage| !stages.contains(stage)) {
                return Err(PipelineError::UnknownStage(unknown.to_string()));
            }
        }
        Ok(Self {
            connectors,
            stages,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn connector(&self, name: &str) -> Option<&ConnectorDef> {
        self.connectors.get(name)
    }

    /// Signatures of every pipeline compiled so far, sorted.
    pub fn cached_signatures(&self) -> Vec<String> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let mut signatures: Vec<String> = cache.keys().cloned().collect();
        signatures.sort();
        signatures
    }

    /// Runs a read through `connector_type`.
    ///
    /// Option arguments are moved out of `payload.args` into typed params so
    /// the connector only sees equality arguments.
    ///
    /// # Errors
    /// `UndefinedConnector` for an unknown connector, argument errors for
    /// malformed option arguments, and whatever a stage reports.
    pub fn run_resolve(
        &self,
        connector_type: &str,
        mut payload: Payload,
        custom_pre: Option<&[String]>,
        custom_post: Option<&[String]>,
        shared: &SharedContext,
    ) -> Result<Value, PipelineError> {
        payload.operation = Operation::Resolve;
        let request_string = payload.request_string();
        payload.params.values.insert(CURRENT_REQUEST_KEY.to_string(), Value::String(request_string));
        payload.params.absorb_option_args(&mut payload.args)?;
        self.run_pipeline(connector_type, payload, custom_pre, custom_post, shared)
    }

    /// Runs a write through `connector_type`.
    pub fn run_execute(
        &self,
        connector_type: &str,
        mut payload: Payload,
        custom_pre: Option<&[String]>,
        custom_post: Option<&[String]>,
        shared: &SharedContext,
    ) -> Result<Value, PipelineError> {
        payload.operation = Operation::Mutate;
        payload.multivalued = false;
        self.run_pipeline(connector_type, payload, custom_pre, custom_post, shared)
    }

    fn run_pipeline(
        &self,
        connector_type: &str,
        mut payload: Payload,
        custom_pre: Option<&[String]>,
        custom_post: Option<&[String]>,
        shared: &SharedContext,
    ) -> Result<Value, PipelineError> {
        let connector = self
            .connectors
            .get(connector_type)
            .ok_or_else(|| PipelineError::UndefinedConnector(connector_type.to_string()))?;

        let mut config = connector.configs.clone();
        config.extend(std::mem::take(&mut payload.config));
        payload.config = config;
        payload.params.merge_shared(shared);

        let stage_names = stage_sequence(connector, custom_pre, custom_post);
        let pipeline = self.compiled(&stage_names)?;
        debug!(
            connector = connector_type,
            signature = pipeline.signature(),
            target_type = %payload.target_type,
            mutation = payload.is_mutation(),
            "running connector pipeline"
        );
        Ok(pipeline.process(payload)?.into_response())
    }

    fn compiled(&self, stage_names: &[String]) -> Result<Arc<Pipeline>, PipelineError> {
        let signature = signature_for(stage_names);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pipeline) = cache.get(&signature) {
            return Ok(Arc::clone(pipeline));
        }
        let stages = stage_names
            .iter()
            .map(|name| self.stages.instantiate(name))
            .collect::<Result<Vec<_>, _>>()?;
        let pipeline = Arc::new(Pipeline {
            signature: signature.clone(),
            stages,
        });
        debug!(signature = %signature, stage_count = stage_names.len(), "pipeline compiled");
        cache.insert(signature, Arc::clone(&pipeline));
        Ok(pipeline)
    }
}

/// `pre ++ [connectorClass] ++ post`; a custom list replaces the default for its side.
pub fn stage_sequence(connector: &ConnectorDef, custom_pre: Option<&[String]>, custom_post: Option<&[String]>) -> Vec<String> {
    let pre = custom_pre.unwrap_or(&connector.pre_pipeline);
    let post = custom_post.unwrap_or(&connector.post_pipeline);
    pre.iter()
        .cloned()
        .chain(std::iter::once(connector.connector_class.clone()))
        .chain(post.iter().cloned())
        .collect()
}
