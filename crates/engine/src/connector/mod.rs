//! Terminal pipeline stages that talk to a data source.

pub mod ordering;
pub mod record_file;

pub use record_file::{RecordFileConnector, WriteMethod, record_file_path};
