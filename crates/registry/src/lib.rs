//! Assembles a GraphQL schema from entity and connector configuration and
//! binds every field to a connector pipeline.
//!
//! [`Retort`] is the entry point: it loads configuration, runs the
//! [`TypeAssembler`] over every entity, lowers the result onto async-graphql's
//! dynamic schema, and executes requests against it.

pub mod assembler;
pub mod compiled;
pub mod dynamic;
pub mod error;
pub mod option_args;
pub mod retort;
pub mod validation;

pub use assembler::{INPUT_TYPE_PREFIX, SkippedEntity, TypeAssembler, TypeRegistry, input_type_name};
pub use compiled::{ArgTarget, CallMode, CompiledArg, CompiledField, CompiledInputType, CompiledType, ConnectorCall, FieldResolver, OutputKind, TypeShape};
pub use dynamic::{ParentRecord, RequestLineage};
pub use error::SchemaError;
pub use option_args::{append_option_args, option_args};
pub use retort::{ErrorEntry, ExecutionResult, Retort, RetortBuilder};
pub use retort_engine::{PipelineError, SharedContext, Stage};
pub use retort_types::RetortConfig;
