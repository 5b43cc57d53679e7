use std::{
    fs,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;

use crate::{ConnectorDef, EntityDef};

pub const CONNECTORS_DIR: &str = "connectors";
pub const MODELS_DIR: &str = "models";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration directory '{0}' does not exist")]
    MissingDirectory(PathBuf),
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Complete, immutable input to schema assembly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetortConfig {
    #[serde(default)]
    pub connectors: IndexMap<String, ConnectorDef>,
    #[serde(default)]
    pub entities: IndexMap<String, EntityDef>,
}

impl RetortConfig {
    /// Loads every `connectors/*.json` and `models/*.json` below `dir`.
    ///
    /// Files are merged in file-name order, so a key defined twice takes the
    /// value from the later file. Missing subdirectories contribute nothing.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ConfigError::MissingDirectory(dir.to_path_buf()));
        }
        let connectors = merge_json_maps::<ConnectorDef>(&dir.join(CONNECTORS_DIR))?;
        let entities = merge_json_maps::<EntityDef>(&dir.join(MODELS_DIR))?;
        debug!(
            directory = %dir.display(),
            connector_count = connectors.len(),
            entity_count = entities.len(),
            "configuration loaded"
        );
        Ok(Self { connectors, entities })
    }

    pub fn entity(&self, key: &str) -> Option<&EntityDef> {
        self.entities.get(key)
    }

    pub fn connector(&self, key: &str) -> Option<&ConnectorDef> {
        self.connectors.get(key)
    }
}

fn merge_json_maps<T: DeserializeOwned>(dir: &Path) -> Result<IndexMap<String, T>, ConfigError> {
    let mut merged = IndexMap::new();
    for path in json_files(dir)? {
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        let decoded: IndexMap<String, T> = serde_json::from_str(&content).map_err(|source| ConfigError::Decode { path: path.clone(), source })?;
        merged.extend(decoded);
    }
    Ok(merged)
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|extension| extension == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(path, content).expect("write fixture");
    }

    #[test]
    fn merges_connector_and_model_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "connectors/a.json", r#"{"users": {"connectorClass": "json", "configs": {"basePath": "/tmp"}}}"#);
        write(temp.path(), "models/a_user.json", r#"{"user": {"name": "User", "fields": {"id": {"type": "ID"}}}}"#);
        write(temp.path(), "models/b_post.json", r#"{"post": {"name": "Post", "fields": {"id": {"type": "ID"}}}}"#);
        write(temp.path(), "models/notes.txt", "ignored");

        let config = RetortConfig::load_from_dir(temp.path()).expect("config loads");
        assert_eq!(config.connector("users").expect("users").connector_class, "json");
        assert_eq!(config.entities.keys().collect::<Vec<_>>(), vec!["user", "post"]);
    }

    #[test]
    fn later_files_override_earlier_keys() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "models/1.json", r#"{"user": {"name": "First"}}"#);
        write(temp.path(), "models/2.json", r#"{"user": {"name": "Second"}}"#);

        let config = RetortConfig::load_from_dir(temp.path()).expect("config loads");
        assert_eq!(config.entity("user").and_then(|entity| entity.name.as_deref()), Some("Second"));
    }

    #[test]
    fn malformed_file_error_names_the_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "models/broken.json", "{ not json");

        let error = RetortConfig::load_from_dir(temp.path()).expect_err("decode must fail");
        assert!(matches!(error, ConfigError::Decode { .. }));
        assert!(error.to_string().contains("broken.json"), "message was: {error}");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let error = RetortConfig::load_from_dir(temp.path().join("absent")).expect_err("missing dir");
        assert!(matches!(error, ConfigError::MissingDirectory(_)));
    }

    #[test]
    fn missing_subdirectories_are_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = RetortConfig::load_from_dir(temp.path()).expect("empty config");
        assert!(config.connectors.is_empty());
        assert!(config.entities.is_empty());
    }
}
