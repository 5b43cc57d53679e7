use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

/// A logical connector: the terminal stage plus the default stages around it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorDef {
    /// Stage registry key of the terminal connector stage.
    pub connector_class: String,
    /// Lowest-precedence configuration layer.
    #[serde(default)]
    pub configs: JsonMap<String, Value>,
    #[serde(default)]
    pub pre_pipeline: Vec<String>,
    #[serde(default)]
    pub post_pipeline: Vec<String>,
}

impl ConnectorDef {
    pub fn new(connector_class: impl Into<String>) -> Self {
        Self {
            connector_class: connector_class.into(),
            ..Self::default()
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.configs.insert(key.into(), value);
        self
    }

    /// Every stage identifier this connector can run, terminal stage included.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.pre_pipeline
            .iter()
            .chain(std::iter::once(&self.connector_class))
            .chain(self.post_pipeline.iter())
            .map(String::as_str)
    }
}
