use async_graphql::dynamic::SchemaError as DynamicSchemaError;
use retort_engine::PipelineError;
use retort_types::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("field '{field}' references unknown type '{type_name}'")]
    UnknownType { field: String, type_name: String },
    #[error("entity '{0}' is not defined")]
    UndefinedEntity(String),
    #[error("union '{0}' cannot be used as an input type")]
    UnionInput(String),
    #[error("union '{union}' member '{member}' must be an object entity")]
    InvalidUnionMember { union: String, member: String },
    #[error("'{owner}' references unregistered pipeline stage '{stage}'")]
    UnknownStage { owner: String, stage: String },
    #[error("invalid default value for '{arg}': {message}")]
    InvalidDefault { arg: String, message: String },
    #[error("no entity exposes a query field")]
    NoQueryFields,
    #[error("schema build failed: {0}")]
    Build(#[from] DynamicSchemaError),
}
