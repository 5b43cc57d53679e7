//! Pipeline stages and the registry that instantiates them by name.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{connector::RecordFileConnector, error::PipelineError, middleware::IntegrityCheck, payload::Payload};

/// Registry key of the built-in record-file connector.
pub const RECORD_FILE_STAGE: &str = "json";
/// Registry key of the built-in argument integrity middleware.
pub const INTEGRITY_STAGE: &str = "integrity";

/// A single step of a connector pipeline.
///
/// Stages are shared between concurrent calls and hold no per-call state.
/// A stage that finds [`Payload::response`] already set must hand the payload
/// back unchanged.
pub trait Stage: Send + Sync {
    fn process(&self, payload: Payload) -> Result<Payload, PipelineError>;
}

impl<F> Stage for F
where
    F: Fn(Payload) -> Result<Payload, PipelineError> + Send + Sync,
{
    fn process(&self, payload: Payload) -> Result<Payload, PipelineError> {
        self(payload)
    }
}

pub type StageFactory = Arc<dyn Fn() -> Box<dyn Stage> + Send + Sync>;

/// Maps stable stage identifiers to factories.
#[derive(Clone, Default)]
pub struct StageRegistry {
    factories: HashMap<String, StageFactory>,
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("StageRegistry").field("stages", &names).finish()
    }
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the record-file connector and integrity middleware.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(RECORD_FILE_STAGE, || Box::new(RecordFileConnector::new()));
        registry.register(INTEGRITY_STAGE, || Box::new(IntegrityCheck));
        registry
    }

    /// Registers or replaces the factory for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Stage> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Stage>, PipelineError> {
        let factory = self.factories.get(name).ok_or_else(|| PipelineError::UnknownStage(name.to_string()))?;
        Ok(factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map as JsonMap, json};

    #[test]
    fn builtins_are_registered() {
        let registry = StageRegistry::with_builtins();
        assert!(registry.contains(RECORD_FILE_STAGE));
        assert!(registry.contains(INTEGRITY_STAGE));
        assert!(matches!(registry.instantiate("missing"), Err(PipelineError::UnknownStage(name)) if name == "missing"));
    }

    #[test]
    fn closures_are_stages() {
        let mut registry = StageRegistry::new();
        registry.register("stamp", || {
            Box::new(|mut payload: Payload| {
                payload.response = Some(json!("stamped"));
                Ok::<_, PipelineError>(payload)
            })
        });
        let stage = registry.instantiate("stamp").expect("registered");
        let payload = stage.process(Payload::resolve("user", JsonMap::new(), false)).expect("stage runs");
        assert_eq!(payload.response, Some(json!("stamped")));
    }
}
