//! # Retort Engine
//!
//! The connector pipeline engine behind every Retort field resolution and
//! mutation. A call names a logical connector; the engine expands it to an
//! ordered stage list (`pre ++ [connector] ++ post`), compiles that list once
//! per signature, and threads a [`Payload`] through the stages until one of
//! them fills the response slot.
//!
//! ## Usage
//!
//! ```rust
//! use indexmap::IndexMap;
//! use retort_engine::{Payload, PipelineEngine, SharedContext, StageRegistry};
//! use retort_types::ConnectorDef;
//! use serde_json::{Map, json};
//!
//! let dir = tempfile::tempdir()?;
//! let connector = ConnectorDef::new("json").with_config("fullPath", json!(dir.path().join("users.json")));
//! let engine = PipelineEngine::new(IndexMap::from([("users".to_string(), connector)]), StageRegistry::with_builtins())?;
//!
//! let users = engine.run_resolve("users", Payload::resolve("user", Map::new(), true), None, None, &SharedContext::default())?;
//! assert_eq!(users, json!([]));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Modules
//!
//! - **`pipeline`**: stage sequencing, the signature-keyed pipeline cache, resolve/execute entry points
//! - **`stage`**: the [`Stage`] trait and the name-to-factory [`StageRegistry`]
//! - **`payload`**: the per-call envelope and option argument extraction
//! - **`filters`** / **`filter_value`**: the `filters` DSL and its operand codec
//! - **`connector`**: the record-file reference connector
//! - **`middleware`**: argument integrity checks for writes

pub mod connector;
pub mod error;
pub mod filter_value;
pub mod filters;
pub mod middleware;
pub mod payload;
pub mod pipeline;
pub mod stage;

pub use connector::RecordFileConnector;
pub use error::{ErrorKind, PipelineError};
pub use filter_value::{decode_filter_value, decode_filter_value_at};
pub use filters::FilterSet;
pub use middleware::IntegrityCheck;
pub use payload::{OPTION_ARG_NAMES, Operation, Payload, PipelineParams, SharedContext, SortDirection};
pub use pipeline::{Pipeline, PipelineEngine};
pub use stage::{INTEGRITY_STAGE, RECORD_FILE_STAGE, Stage, StageFactory, StageRegistry};
