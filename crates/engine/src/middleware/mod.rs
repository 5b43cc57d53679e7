//! Non-terminal stages that inspect or adjust a payload before the connector.

pub mod integrity;

pub use integrity::IntegrityCheck;
