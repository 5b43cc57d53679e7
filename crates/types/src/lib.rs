//! Shared configuration model for Retort.
//!
//! Everything here is plain data decoded from JSON: entity definitions, the
//! connector map, and the directory loader that merges them.

pub mod config;
pub mod connector;
pub mod entity;

pub use config::{ConfigError, RetortConfig};
pub use connector::ConnectorDef;
pub use entity::{
    BUILTIN_SCALARS, ConnectorBinding, EndpointDef, EntityDef, EnumValueDef, EnumValues, FieldDef, ModelType, MutationDef, PipelineOverride,
    is_builtin_scalar, is_excluded,
};
