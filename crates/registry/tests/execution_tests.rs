use std::{fs, path::Path};

use retort_engine::{Payload, PipelineError};
use retort_registry::{Retort, SchemaError, SharedContext};
use serde_json::{Value, json};
use tempfile::TempDir;

fn write_json(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent directory");
    }
    fs::write(path, serde_json::to_string_pretty(value).expect("serialize")).expect("write json file");
}

/// A config directory plus a data directory the `store` connector points at.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(models: Value) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().join("data");
        fs::create_dir_all(&data_dir).expect("data dir");
        write_json(
            &dir.path().join("config/connectors/store.json"),
            &json!({"store": {"connectorClass": "json", "configs": {"basePath": data_dir.to_string_lossy()}}}),
        );
        write_json(&dir.path().join("config/models/models.json"), &models);
        Self { dir }
    }

    fn seed(&self, file_name: &str, records: Value) -> &Self {
        write_json(&self.data_path(file_name), &records);
        self
    }

    fn data_path(&self, file_name: &str) -> std::path::PathBuf {
        self.dir.path().join("data").join(file_name)
    }

    fn config_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("config")
    }

    fn retort(&self) -> Retort {
        Retort::from_dir(self.config_dir()).expect("schema assembles")
    }
}

fn blog_models() -> Value {
    json!({
        "status": {"name": "Status", "modelType": "Enum", "values": ["DRAFT", "LIVE"]},
        "user": {
            "name": "User",
            "expose": true,
            "connector": {"type": "store", "configs": {"fileName": "users.json"}},
            "fields": {
                "id": {"type": "ID", "readOnly": true},
                "name": {"type": "String", "required": true},
                "age": {"type": "Int"},
                "posts": {"type": "post", "multivalued": true, "relation": {"userId": "id"}}
            },
            "singleEndpoint": {"name": "user"},
            "multiEndpoint": {"name": "users"},
            "mutations": {
                "createUser": {"type": "user", "methodName": "create"},
                "updateUser": {"type": "user", "methodName": "update", "args": {"id": {"type": "ID", "required": true}}},
                "deleteUser": {"type": "user", "methodName": "delete", "excludedArgs": ["all"], "args": {"id": {"type": "ID", "required": true}}}
            }
        },
        "post": {
            "name": "Post",
            "expose": true,
            "connector": {"type": "store", "configs": {"fileName": "posts.json"}},
            "fields": {
                "id": {"type": "ID"},
                "title": {"type": "String"},
                "status": {"type": "status"},
                "userId": {"type": "ID"},
                "author": {"type": "user", "relation": {"id": "userId"}}
            },
            "multiEndpoint": {"name": "posts"}
        }
    })
}

fn blog() -> Fixture {
    let fixture = Fixture::new(blog_models());
    fixture
        .seed(
            "users.json",
            json!([
                {"id": "u1", "name": "Ada", "age": 36},
                {"id": "u2", "name": "Bob", "age": 25},
                {"id": "u3", "name": "Cy", "age": 52},
                {"id": "u4", "name": "Di", "age": 41}
            ]),
        )
        .seed(
            "posts.json",
            json!([
                {"id": "p1", "title": "Hello", "status": "LIVE", "userId": "u1"},
                {"id": "p2", "title": "Draft", "status": "DRAFT", "userId": "u1"},
                {"id": "p3", "title": "Other", "status": "LIVE", "userId": "u2"}
            ]),
        );
    fixture
}

#[tokio::test]
async fn relations_resolve_through_parent_keys() {
    let fixture = blog();
    let retort = fixture.retort();
    let result = retort
        .execute(r#"{ users(orderBy: "name") { name posts(orderBy: "id") { title author { name } } } }"#, None, None)
        .await;

    assert!(result.is_ok(), "{:?}", result.errors);
    assert_eq!(
        result.data,
        Some(json!({
            "users": [
                {"name": "Ada", "posts": [{"title": "Hello", "author": {"name": "Ada"}}, {"title": "Draft", "author": {"name": "Ada"}}]},
                {"name": "Bob", "posts": [{"title": "Other", "author": {"name": "Bob"}}]},
                {"name": "Cy", "posts": []},
                {"name": "Di", "posts": []}
            ]
        }))
    );
}

#[tokio::test]
async fn start_and_limit_window_the_sorted_records() {
    let fixture = blog();
    let retort = fixture.retort();
    let result = retort
        .execute(r#"{ users(orderBy: "name", orderByDirection: "asc", start: 2, limit: 2) { name } }"#, None, None)
        .await;
    assert_eq!(result.data, Some(json!({"users": [{"name": "Cy"}, {"name": "Di"}]})));

    let descending = retort.execute(r#"{ users(orderBy: "age", orderByDirection: "desc", limit: 1) { name } }"#, None, None).await;
    assert_eq!(descending.data, Some(json!({"users": [{"name": "Cy"}]})));
}

#[tokio::test]
async fn single_reads_return_the_first_match_or_null() {
    let fixture = blog();
    let retort = fixture.retort();

    let found = retort.execute(r#"{ user(id: "u2") { name age } }"#, None, None).await;
    assert_eq!(found.data, Some(json!({"user": {"name": "Bob", "age": 25}})));

    let missing = retort.execute(r#"{ user(id: "nope") { name } }"#, None, None).await;
    assert!(missing.is_ok());
    assert_eq!(missing.data, Some(json!({"user": null})));
}

#[tokio::test]
async fn enum_arguments_and_results_round_trip() {
    let fixture = blog();
    let retort = fixture.retort();
    let result = retort.execute("{ posts(status: LIVE, orderBy: \"id\") { id status } }", None, None).await;
    assert_eq!(
        result.data,
        Some(json!({"posts": [{"id": "p1", "status": "LIVE"}, {"id": "p3", "status": "LIVE"}]}))
    );
}

#[tokio::test]
async fn mutations_write_through_the_record_file() {
    let fixture = blog();
    let retort = fixture.retort();

    let created = retort
        .execute(
            "mutation Create($name: String!) { createUser(name: $name, age: 30) { name age } }",
            Some(json!({"name": "Eve"})),
            Some("Create"),
        )
        .await;
    assert_eq!(created.data, Some(json!({"createUser": {"name": "Eve", "age": 30}})));

    let updated = retort.execute(r#"mutation { updateUser(id: "u2", age: 26) { name age } }"#, None, None).await;
    assert_eq!(updated.data, Some(json!({"updateUser": {"name": "Bob", "age": 26}})));

    let deleted = retort.execute(r#"mutation { deleteUser(id: "u3") { name } }"#, None, None).await;
    assert!(deleted.is_ok(), "{:?}", deleted.errors);
    assert_eq!(deleted.data, Some(json!({"deleteUser": null})));

    let listing = retort.execute(r#"{ users(orderBy: "name") { name age } }"#, None, None).await;
    assert_eq!(
        listing.data,
        Some(json!({"users": [
            {"name": "Ada", "age": 36},
            {"name": "Bob", "age": 26},
            {"name": "Di", "age": 41},
            {"name": "Eve", "age": 30}
        ]}))
    );

    let on_disk: Value = serde_json::from_str(&fs::read_to_string(fixture.data_path("users.json")).expect("read")).expect("decode");
    assert_eq!(on_disk.as_array().map(Vec::len), Some(4));
}

#[tokio::test]
async fn missing_required_mutation_arguments_are_rejected() {
    let fixture = blog();
    let retort = fixture.retort();
    let result = retort.execute("mutation { updateUser(age: 1) { name } }", None, None).await;
    assert!(!result.is_ok());
    assert!(result.data.is_none());
}

#[tokio::test]
async fn undefined_connectors_surface_as_field_errors() {
    let fixture = Fixture::new(json!({
        "ghost": {
            "name": "Ghost",
            "expose": true,
            "connector": {"type": "nowhere"},
            "fields": {"id": {"type": "ID"}},
            "multiEndpoint": {"name": "ghosts"}
        }
    }));
    let retort = fixture.retort();
    let result = retort.execute("{ ghosts { id } }", None, None).await;

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].message, "Undefined connector: nowhere");
    assert_eq!(result.errors[0].path, vec![json!("ghosts")]);
    assert_eq!(result.data, Some(json!({"ghosts": null})));
}

#[tokio::test]
async fn malformed_record_files_name_the_file() {
    let fixture = blog();
    fs::write(fixture.data_path("users.json"), "{not json").expect("corrupt file");
    let retort = fixture.retort();
    let result = retort.execute("{ users { name } }", None, None).await;

    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("users.json"), "{}", result.errors[0].message);
}

#[tokio::test]
async fn now_filters_compare_against_relative_timestamps() {
    let now = chrono::Utc::now().timestamp();
    let fixture = Fixture::new(json!({
        "event": {
            "name": "Event",
            "expose": true,
            "connector": {"type": "store", "configs": {"fileName": "events.json"}},
            "fields": {"title": {"type": "String"}, "created": {"type": "Float"}},
            "multiEndpoint": {"name": "events"}
        }
    }));
    fixture.seed(
        "events.json",
        json!([
            {"title": "old", "created": now - 10 * 86_400},
            {"title": "recent", "created": now - 86_400},
            {"title": "fresh", "created": now}
        ]),
    );
    let retort = fixture.retort();

    let recent = retort
        .execute(
            r#"{ events(filters: {scalarFilters: [{field: "created", operator: gt, value: "NOW(-3)"}]}) { title } }"#,
            None,
            None,
        )
        .await;
    assert_eq!(recent.data, Some(json!({"events": [{"title": "recent"}, {"title": "fresh"}]})));

    let either = retort
        .execute(
            r#"{ events(filters: {operator: or, scalarFilters: [{field: "title", value: "old"}], arrayFilters: [{field: "title", value: ["fresh"]}]}) { title } }"#,
            None,
            None,
        )
        .await;
    assert_eq!(either.data, Some(json!({"events": [{"title": "old"}, {"title": "fresh"}]})));

    let far_future = retort
        .execute(
            r#"{ events(filters: {scalarFilters: [{field: "created", operator: gt, value: "NOW(999999999999999)"}]}) { title } }"#,
            None,
            None,
        )
        .await;
    assert!(far_future.is_ok(), "{:?}", far_future.errors);
    assert_eq!(far_future.data, Some(json!({"events": []})));
}

#[tokio::test]
async fn union_fields_resolve_by_type_tag() {
    let fixture = Fixture::new(json!({
        "photo": {"name": "Photo", "fields": {"url": {"type": "String"}}},
        "note": {"name": "Note", "fields": {"body": {"type": "String"}}},
        "media": {"name": "Media", "modelType": "Union", "types": ["photo", "note"]},
        "card": {
            "name": "Card",
            "expose": true,
            "connector": {"type": "store", "configs": {"fileName": "cards.json"}},
            "fields": {"title": {"type": "String"}, "item": {"type": "media"}},
            "multiEndpoint": {"name": "cards"}
        }
    }));
    fixture.seed(
        "cards.json",
        json!([
            {"title": "a", "item": {"type": "photo", "url": "x.png"}},
            {"title": "b", "item": {"type": "note", "body": "hi"}}
        ]),
    );
    let retort = fixture.retort();
    let result = retort
        .execute("{ cards { title item { __typename ... on Photo { url } ... on Note { body } } } }", None, None)
        .await;
    assert!(result.is_ok(), "{:?}", result.errors);
    assert_eq!(
        result.data,
        Some(json!({"cards": [
            {"title": "a", "item": {"__typename": "Photo", "url": "x.png"}},
            {"title": "b", "item": {"__typename": "Note", "body": "hi"}}
        ]}))
    );
}

fn echo_stage() -> Box<dyn retort_engine::Stage> {
    Box::new(|mut payload: Payload| {
        if payload.has_response() {
            return Ok(payload);
        }
        let values = &payload.params.values;
        payload.response = Some(json!({
            "tenant": values.get("tenant"),
            "region": values.get("region"),
            "current": values.get("currentRequestString"),
            "parent": values.get("parentRequestString")
        }));
        Ok::<_, PipelineError>(payload)
    })
}

#[tokio::test]
async fn shared_context_and_lineage_reach_custom_stages() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_json(&dir.path().join("connectors/echo.json"), &json!({"echoer": {"connectorClass": "echo"}}));
    write_json(
        &dir.path().join("models/whoami.json"),
        &json!({
            "whoami": {
                "name": "WhoAmI",
                "expose": true,
                "connector": {"type": "echoer"},
                "fields": {
                    "tenant": {"type": "String"},
                    "region": {"type": "String"},
                    "current": {"type": "String"},
                    "parent": {"type": "String"}
                },
                "singleEndpoint": {"name": "whoami", "excludedArgs": ["all"], "pipelineParams": {"region": "eu"}}
            }
        }),
    );
    let mut retort = Retort::builder()
        .register_stage("echo", echo_stage)
        .build_from_dir(dir.path())
        .expect("schema assembles");

    let mut shared = SharedContext::default();
    shared.insert("tenant", json!("acme"));
    shared.insert("region", json!("us"));
    retort.set_shared_pipeline_context(shared);

    let query = "{ whoami { tenant region current parent } }";
    let result = retort.execute(query, None, None).await;
    assert_eq!(
        result.data,
        Some(json!({"whoami": {"tenant": "acme", "region": "eu", "current": "whoami", "parent": query}}))
    );
}

#[test]
fn option_arguments_are_appended_to_collection_endpoints() {
    let fixture = blog();
    let retort = fixture.retort();
    assert_eq!(
        retort.query_fields()["users"].arg_names(),
        vec!["id", "name", "age", "start", "limit", "orderBy", "orderByDirection", "filters"]
    );
    assert!(retort.query_fields()["user"].arg("filters").is_none());
    assert!(retort.sdl().contains("input Input_Post"));
}

#[test]
fn validate_data_checks_the_entity_input_shape() {
    let fixture = blog();
    let retort = fixture.retort();
    assert!(retort.validate_data(&json!({"name": "Zed", "age": 20}), "user").expect("user is known"));
    assert!(!retort.validate_data(&json!({"name": "Zed", "nickname": "z"}), "user").expect("user is known"));
    assert!(!retort.validate_data(&json!({"age": 20}), "user").expect("user is known"));
    assert!(matches!(retort.validate_data(&json!({}), "unicorn"), Err(SchemaError::UndefinedEntity(_))));
}

#[test]
fn broken_entities_are_skipped_unless_debug() {
    let mut models = blog_models();
    models["broken"] = json!({
        "name": "Broken",
        "expose": true,
        "fields": {"ghost": {"type": "phantom"}},
        "multiEndpoint": {"name": "brokens"}
    });
    let fixture = Fixture::new(models);

    let lenient = fixture.retort();
    assert_eq!(lenient.skipped_entities().len(), 1);
    assert!(!lenient.query_fields().contains_key("brokens"));
    assert!(lenient.query_fields().contains_key("users"));

    let strict = Retort::builder().debug(true).build_from_dir(fixture.config_dir());
    assert!(matches!(strict, Err(SchemaError::UnknownType { .. })));
}

#[test]
fn configurations_without_query_fields_are_rejected() {
    let fixture = Fixture::new(json!({"thing": {"name": "Thing", "fields": {"id": {"type": "ID"}}}}));
    assert!(matches!(Retort::from_dir(fixture.config_dir()), Err(SchemaError::NoQueryFields)));
}
