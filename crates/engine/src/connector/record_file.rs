use std::{
    fs,
    io::ErrorKind as IoErrorKind,
    path::{Path, PathBuf},
};

use serde_json::{Map as JsonMap, Value};
use tracing::debug;

use super::ordering::{compare_values, loosely_equal};
use crate::{
    error::PipelineError,
    payload::{Payload, PipelineParams, SortDirection},
    stage::Stage,
};

pub const FULL_PATH_KEY: &str = "fullPath";
pub const BASE_PATH_KEY: &str = "basePath";
pub const FILE_NAME_KEY: &str = "fileName";
pub const STRICT_IDS_KEY: &str = "strictIds";

/// Write verbs understood by [`RecordFileConnector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMethod {
    Create,
    Update,
    Delete,
}

impl WriteMethod {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Connector backed by a single JSON file holding an array of flat records.
///
/// The file is read on every call and rewritten whole after every write, so
/// concurrent writers follow last-writer-wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFileConnector;

impl RecordFileConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for RecordFileConnector {
    fn process(&self, mut payload: Payload) -> Result<Payload, PipelineError> {
        if payload.has_response() {
            return Ok(payload);
        }
        let path = record_file_path(&payload.config)?;
        let records = read_records(&path)?;
        let response = if payload.is_mutation() {
            execute(&payload, records, &path)?
        } else {
            resolve(&payload.args, &payload.params, payload.multivalued, records)
        };
        payload.response = Some(response);
        Ok(payload)
    }
}

/// `fullPath` wins; otherwise `basePath` joined with `fileName`.
pub fn record_file_path(config: &JsonMap<String, Value>) -> Result<PathBuf, PipelineError> {
    let setting = |key: &str| config.get(key).and_then(Value::as_str).filter(|value| !value.is_empty());
    if let Some(full_path) = setting(FULL_PATH_KEY) {
        return Ok(PathBuf::from(full_path));
    }
    match (setting(BASE_PATH_KEY), setting(FILE_NAME_KEY)) {
        (Some(base_path), Some(file_name)) => Ok(Path::new(base_path).join(file_name)),
        _ => Err(PipelineError::config("unable to resolve a record file path; set fullPath, or basePath and fileName")),
    }
}

fn read_records(path: &Path) -> Result<Vec<Value>, PipelineError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PipelineError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|source| PipelineError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn write_records(path: &Path, records: &[Value]) -> Result<(), PipelineError> {
    let content = serde_json::to_string(records).map_err(|source| PipelineError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, content).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), record_count = records.len(), "record file rewritten");
    Ok(())
}

fn resolve(args: &JsonMap<String, Value>, params: &PipelineParams, multivalued: bool, mut records: Vec<Value>) -> Value {
    if let Some(order_by) = params.order_by.as_deref() {
        records.sort_by(|left, right| {
            let ordering = compare_values(left.get(order_by), right.get(order_by));
            match params.order_by_direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }

    let start = params.start.unwrap_or(0);
    let limit = params.limit.unwrap_or(records.len());
    let mut window = records
        .into_iter()
        .filter(|record| record_matches(record, args, params))
        .skip(start)
        .take(limit);

    if multivalued {
        Value::Array(window.collect())
    } else {
        window.next().unwrap_or(Value::Null)
    }
}

fn record_matches(record: &Value, args: &JsonMap<String, Value>, params: &PipelineParams) -> bool {
    let Some(fields) = record.as_object() else {
        return false;
    };
    let equal = args.iter().all(|(key, expected)| {
        fields
            .get(key)
            .filter(|actual| !actual.is_null())
            .is_some_and(|actual| loosely_equal(actual, expected))
    });
    equal && params.filters.as_ref().is_none_or(|filters| filters.matches(fields))
}

fn execute(payload: &Payload, mut records: Vec<Value>, path: &Path) -> Result<Value, PipelineError> {
    let method_name = payload
        .method_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| PipelineError::config("record file connector requires a methodName for write operations"))?;
    let method = WriteMethod::parse(method_name).ok_or_else(|| PipelineError::config(format!("record file connector does not support method '{method_name}'")))?;

    if method == WriteMethod::Create {
        let created = Value::Object(payload.args.clone());
        records.push(created.clone());
        write_records(path, &records)?;
        return Ok(created);
    }

    let id = payload
        .args
        .get("id")
        .filter(|id| !is_empty_id(id))
        .ok_or_else(|| PipelineError::arguments(format!("'{method_name}' requires a non-empty id argument")))?;
    let position = records
        .iter()
        .position(|record| record.get("id").is_some_and(|candidate| loosely_equal(candidate, id)));
    let Some(position) = position else {
        if strict_ids(&payload.config) {
            return Err(PipelineError::arguments(format!("no record with id {id}")));
        }
        debug!(path = %path.display(), id = %id, method = method_name, "write matched no record");
        return Ok(Value::Null);
    };

    let response = if method == WriteMethod::Delete {
        records.remove(position);
        Value::Null
    } else {
        if let Some(record) = records[position].as_object_mut() {
            for (key, value) in &payload.args {
                record.insert(key.clone(), value.clone());
            }
        }
        records[position].clone()
    };
    write_records(path, &records)?;
    Ok(response)
}

fn is_empty_id(id: &Value) -> bool {
    match id {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

fn strict_ids(config: &JsonMap<String, Value>) -> bool {
    config.get(STRICT_IDS_KEY).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterSet;
    use serde_json::json;

    fn config_for(path: &Path) -> JsonMap<String, Value> {
        JsonMap::from_iter([(FULL_PATH_KEY.to_string(), json!(path.to_string_lossy()))])
    }

    fn seed(dir: &Path, records: Value) -> PathBuf {
        let path = dir.join("records.json");
        fs::write(&path, records.to_string()).expect("seed record file");
        path
    }

    fn args(value: Value) -> JsonMap<String, Value> {
        value.as_object().cloned().expect("object")
    }

    fn run(payload: Payload) -> Result<Value, PipelineError> {
        RecordFileConnector::new().process(payload).map(Payload::into_response)
    }

    #[test]
    fn path_resolution_prefers_full_path() {
        let config = args(json!({"fullPath": "/data/a.json", "basePath": "/ignored", "fileName": "b.json"}));
        assert_eq!(record_file_path(&config).expect("path"), PathBuf::from("/data/a.json"));

        let config = args(json!({"basePath": "/data", "fileName": "b.json"}));
        assert_eq!(record_file_path(&config).expect("path"), PathBuf::from("/data/b.json"));

        let error = record_file_path(&args(json!({"fileName": "b.json"}))).expect_err("no base path");
        assert!(matches!(error, PipelineError::Config(_)));
    }

    #[test]
    fn missing_file_reads_as_empty_collection() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_for(&temp.path().join("absent.json"));
        let many = run(Payload::resolve("user", JsonMap::new(), true).with_config(config.clone())).expect("resolve");
        assert_eq!(many, json!([]));
        let one = run(Payload::resolve("user", JsonMap::new(), false).with_config(config)).expect("resolve");
        assert_eq!(one, Value::Null);
    }

    #[test]
    fn pagination_counts_matching_records() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = seed(temp.path(), json!([{"id": 0}, {"id": 1}, {"id": 2}, {"id": 3}, {"id": 4}]));
        let mut params = PipelineParams::default();
        params.start = Some(2);
        params.limit = Some(2);
        let payload = Payload::resolve("item", JsonMap::new(), true).with_config(config_for(&path)).with_params(params);
        assert_eq!(run(payload).expect("resolve"), json!([{"id": 2}, {"id": 3}]));
    }

    #[test]
    fn equality_args_filter_before_the_window() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = seed(
            temp.path(),
            json!([{"id": 1, "team": "a"}, {"id": 2, "team": "b"}, {"id": 3, "team": "a"}, {"id": 4, "team": "a"}]),
        );
        let mut params = PipelineParams::default();
        params.start = Some(1);
        let payload = Payload::resolve("item", args(json!({"team": "a"})), true).with_config(config_for(&path)).with_params(params);
        assert_eq!(run(payload).expect("resolve"), json!([{"id": 3, "team": "a"}, {"id": 4, "team": "a"}]));

        let single = Payload::resolve("item", args(json!({"id": "2"})), false).with_config(config_for(&path));
        assert_eq!(run(single).expect("resolve"), json!({"id": 2, "team": "b"}));

        let none = Payload::resolve("item", args(json!({"id": 99})), false).with_config(config_for(&path));
        assert_eq!(run(none).expect("resolve"), Value::Null);
    }

    #[test]
    fn null_argument_matches_no_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = seed(temp.path(), json!([{"id": 1, "owner": false}, {"id": 2, "owner": "u1"}, {"id": 3}]));
        let payload = Payload::resolve("item", args(json!({"owner": null})), true).with_config(config_for(&path));
        assert_eq!(run(payload).expect("resolve"), json!([]));
    }

    #[test]
    fn sorting_uses_natural_order_and_direction() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = seed(temp.path(), json!([{"name": "file10"}, {"name": "file2"}, {}, {"name": "file1"}]));
        let mut params = PipelineParams::default();
        params.order_by = Some("name".into());
        let ascending = Payload::resolve("item", JsonMap::new(), true).with_config(config_for(&path)).with_params(params.clone());
        assert_eq!(run(ascending).expect("resolve"), json!([{}, {"name": "file1"}, {"name": "file2"}, {"name": "file10"}]));

        params.order_by_direction = SortDirection::Desc;
        let descending = Payload::resolve("item", JsonMap::new(), true).with_config(config_for(&path)).with_params(params);
        assert_eq!(run(descending).expect("resolve"), json!([{"name": "file10"}, {"name": "file2"}, {"name": "file1"}, {}]));
    }

    #[test]
    fn filters_narrow_the_collection() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = seed(temp.path(), json!([{"id": 1, "age": 20}, {"id": 2, "age": 35}, {"id": 3, "age": 50}]));
        let mut params = PipelineParams::default();
        params.filters = Some(FilterSet::from_value(&json!({"betweenFilters": [{"field": "age", "min": 30, "max": 60}]}), 0).expect("filters"));
        let payload = Payload::resolve("item", JsonMap::new(), true).with_config(config_for(&path)).with_params(params);
        assert_eq!(run(payload).expect("resolve"), json!([{"id": 2, "age": 35}, {"id": 3, "age": 50}]));
    }

    #[test]
    fn create_update_delete_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("posts.json");
        let config = config_for(&path);

        let created = run(Payload::mutate("post", args(json!({"id": "p1", "text": "draft"})), "create").with_config(config.clone())).expect("create");
        assert_eq!(created, json!({"id": "p1", "text": "draft"}));

        let updated = run(Payload::mutate("post", args(json!({"id": "p1", "text": "final"})), "update").with_config(config.clone())).expect("update");
        assert_eq!(updated, json!({"id": "p1", "text": "final"}));

        let deleted = run(Payload::mutate("post", args(json!({"id": "p1"})), "delete").with_config(config)).expect("delete");
        assert_eq!(deleted, Value::Null);

        let stored: Value = serde_json::from_str(&fs::read_to_string(&path).expect("file exists")).expect("valid json");
        assert_eq!(stored, json!([]));
    }

    #[test]
    fn update_merges_into_existing_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = seed(temp.path(), json!([{"id": 7, "text": "old", "likes": 3}]));
        let updated = run(Payload::mutate("post", args(json!({"id": "7", "text": "new"})), "update").with_config(config_for(&path))).expect("update");
        assert_eq!(updated, json!({"id": "7", "text": "new", "likes": 3}));
    }

    #[test]
    fn write_argument_and_method_checks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_for(&temp.path().join("x.json"));

        let missing_id = run(Payload::mutate("post", JsonMap::new(), "update").with_config(config.clone())).expect_err("id required");
        assert!(matches!(missing_id, PipelineError::Arguments(_)));

        let unknown = run(Payload::mutate("post", args(json!({"id": 1})), "upsert").with_config(config.clone())).expect_err("unsupported verb");
        assert!(matches!(unknown, PipelineError::Config(_)));

        let mut no_method = Payload::mutate("post", args(json!({"id": 1})), "create").with_config(config);
        no_method.method_name = None;
        assert!(matches!(run(no_method), Err(PipelineError::Config(_))));
    }

    #[test]
    fn unmatched_ids_are_silent_unless_strict() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = seed(temp.path(), json!([{"id": 1}]));
        let lenient = run(Payload::mutate("post", args(json!({"id": 2})), "delete").with_config(config_for(&path))).expect("no-op");
        assert_eq!(lenient, Value::Null);

        let mut strict_config = config_for(&path);
        strict_config.insert(STRICT_IDS_KEY.into(), json!(true));
        let strict = run(Payload::mutate("post", args(json!({"id": 2})), "delete").with_config(strict_config)).expect_err("strict ids");
        assert!(matches!(strict, PipelineError::Arguments(_)));
    }

    #[test]
    fn existing_response_passes_through() {
        let mut payload = Payload::resolve("user", JsonMap::new(), true);
        payload.response = Some(json!(["from cache"]));
        assert_eq!(run(payload).expect("pass through"), json!(["from cache"]));
    }
}
