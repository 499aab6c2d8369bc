//! Dispatch of list resource and state store operations.

use hemmer_provider_testkit::diagnostic::diagnostics_from_proto;
use hemmer_provider_testkit::generated::{
    self, configure_state_store, delete_state, get_states, list_resource, lock_state,
    read_state_bytes, unlock_state, validate_list_resource_config, write_state_bytes,
};
use hemmer_provider_testkit::list_resource::ListResult;
use hemmer_provider_testkit::schema::IdentityAttribute;
use hemmer_provider_testkit::testing::{
    assert_error_contains, InMemoryStateStore, ListResourceDouble, ProviderDouble,
    ResourceDouble, StateStoreDouble,
};
use hemmer_provider_testkit::{
    codec, init_test_logging, Attribute, Diagnostic, IdentitySchema, ProviderServer, Registry,
    Schema, ServerOptions, Type, Value,
};

const THING: &str = "example_thing";
const STORE: &str = "example_store";

fn thing_schema() -> Schema {
    Schema::v0()
        .with_attribute("name", Attribute::required_string())
        .with_attribute("id", Attribute::computed_string())
}

fn identity_schema() -> IdentitySchema {
    IdentitySchema::v0().with_attribute("id", IdentityAttribute::required_for_import(Type::String))
}

fn list_schema() -> Schema {
    Schema::v0().with_attribute("prefix", Attribute::optional_string())
}

fn listed(id: &str) -> ListResult {
    ListResult {
        identity: Some(Value::object([("id", Value::string(id))])),
        display_name: format!("thing {}", id),
        resource_object: Some(Value::object([
            ("name", Value::string(format!("name-{}", id))),
            ("id", Value::string(id)),
        ])),
        diagnostics: Vec::new(),
    }
}

fn list_server(list: ListResourceDouble) -> ProviderServer {
    init_test_logging();
    let resource =
        ResourceDouble::with_schema(thing_schema()).with_identity_schema(identity_schema());
    ProviderServer::new(
        Registry::new(ProviderDouble::default())
            .with_resource(THING, resource)
            .with_list_resource(THING, list),
    )
}

fn list_request(include_resource_object: bool, limit: i64) -> list_resource::Request {
    let config = Value::object([("prefix", Value::string("thing"))]);
    list_resource::Request {
        type_name: THING.into(),
        config: Some(codec::encode(Some(&list_schema()), &config).unwrap()),
        include_resource_object,
        limit,
    }
}

#[tokio::test]
async fn test_list_honors_limit_and_resource_objects() {
    let list = ListResourceDouble::with_schema(list_schema())
        .with_results(vec![listed("a"), listed("b"), listed("c")]);
    let server = list_server(list);

    let events = server.list_resource_events(list_request(true, 2)).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].display_name, "thing a");
    let object = codec::decode(Some(&thing_schema()), events[1].resource_object.as_ref()).unwrap();
    assert_eq!(object.get_attribute("id").unwrap().as_str(), Some("b"));
    let identity =
        codec::decode_identity(Some(&identity_schema()), events[1].identity.as_ref()).unwrap();
    assert_eq!(identity, Some(Value::object([("id", Value::string("b"))])));

    let events = server.list_resource_events(list_request(false, 0)).await;
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.resource_object.is_none()));
}

#[tokio::test]
async fn test_list_stops_when_caller_declines() {
    let list = ListResourceDouble::with_schema(list_schema())
        .with_results(vec![listed("a"), listed("b"), listed("c")]);
    let server = list_server(list);

    let mut names = Vec::new();
    server
        .list_resource(list_request(false, 0), |event| {
            names.push(event.display_name);
            false
        })
        .await;
    assert_eq!(names, vec!["thing a"]);
}

#[tokio::test]
async fn test_list_encoding_failure_ends_the_stream() {
    let bad = ListResult {
        identity: Some(Value::string("not an object")),
        display_name: "bad".into(),
        ..Default::default()
    };
    let list = ListResourceDouble::with_schema(list_schema()).on_list(move |_req, push| {
        for result in [listed("a"), bad.clone(), listed("c")] {
            if !push(result) {
                return;
            }
        }
    });
    let server = list_server(list);

    let events = server.list_resource_events(list_request(false, 0)).await;
    assert_eq!(events.len(), 2);
    assert!(events[1].identity.is_none());
    assert_error_contains(
        &diagnostics_from_proto(events[1].diagnostic.clone()),
        "Error Encoding List Result Identity",
    );
}

#[tokio::test]
async fn test_list_without_managed_resource() {
    init_test_logging();
    let server = ProviderServer::new(
        Registry::new(ProviderDouble::default())
            .with_list_resource(THING, ListResourceDouble::with_schema(list_schema())),
    );

    let events = server.list_resource_events(list_request(false, 0)).await;
    assert_eq!(events.len(), 1);
    assert_error_contains(
        &diagnostics_from_proto(events[0].diagnostic.clone()),
        "Missing Resource Type",
    );
}

#[tokio::test]
async fn test_validate_list_config_sees_limit() {
    let list = ListResourceDouble::with_schema(list_schema()).on_validate_list_config(|req, resp| {
        if req.limit > 100 {
            resp.diagnostics.push(Diagnostic::error("Limit Too Large"));
        }
    });
    let server = list_server(list);
    let config = Value::object([("prefix", Value::null(Type::String))]);

    let resp = server
        .validate_list_resource_config(validate_list_resource_config::Request {
            type_name: THING.into(),
            config: Some(codec::encode(Some(&list_schema()), &config).unwrap()),
            include_resource_object: false,
            limit: 1000,
        })
        .await;
    assert_error_contains(&diagnostics_from_proto(resp.diagnostics), "Limit Too Large");
}

fn store_server(store: InMemoryStateStore) -> ProviderServer {
    init_test_logging();
    ProviderServer::new(Registry::new(ProviderDouble::default()).with_state_store(STORE, store))
}

fn upload(state_id: &str, bytes: &[u8], chunk_size: usize) -> Vec<write_state_bytes::RequestChunk> {
    bytes
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, chunk)| {
            let start = (i * chunk_size) as i64;
            write_state_bytes::RequestChunk {
                meta: (i == 0).then(|| write_state_bytes::RequestChunkMeta {
                    type_name: STORE.into(),
                    state_id: state_id.into(),
                }),
                bytes: chunk.to_vec(),
                total_length: bytes.len() as i64,
                range: Some(generated::StateRange {
                    start,
                    end: start + chunk.len() as i64,
                }),
            }
        })
        .collect()
}

#[tokio::test]
async fn test_state_bytes_round_trip_in_negotiated_chunks() {
    let store = InMemoryStateStore::new();
    let server = store_server(store.clone());

    let resp = server
        .configure_state_store(configure_state_store::Request {
            type_name: STORE.into(),
            config: Some(codec::encode(Some(&Schema::v0()), &Value::object::<String, _>([])).unwrap()),
            capabilities: Some(generated::StateStoreCapabilities { chunk_size: 4 }),
        })
        .await;
    assert!(resp.diagnostics.is_empty());
    assert_eq!(resp.capabilities.unwrap().chunk_size, 4);
    assert_eq!(store.chunk_size().await, 4);

    let resp = server
        .write_state_bytes(upload("default", b"0123456789", 4))
        .await;
    assert!(resp.diagnostics.is_empty());
    assert_eq!(store.state("default").await, Some(b"0123456789".to_vec()));

    let chunks = server
        .read_state_bytes(read_state_bytes::Request {
            type_name: STORE.into(),
            state_id: "default".into(),
        })
        .await;
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[2].bytes, b"89".to_vec());
    assert_eq!(chunks[2].range, Some(generated::StateRange { start: 8, end: 10 }));
    assert!(chunks.iter().all(|c| c.total_length == 10));
    let reassembled: Vec<u8> = chunks.iter().flat_map(|c| c.bytes.clone()).collect();
    assert_eq!(reassembled, b"0123456789".to_vec());

    let resp = server
        .get_states(get_states::Request {
            type_name: STORE.into(),
        })
        .await;
    assert_eq!(resp.state_id, vec!["default"]);
}

#[tokio::test]
async fn test_incomplete_upload_is_rejected() {
    let store = InMemoryStateStore::new();
    let server = store_server(store.clone());
    let mut chunks = upload("default", b"0123456789", 4);
    chunks.pop();

    let resp = server.write_state_bytes(chunks).await;
    assert_error_contains(&diagnostics_from_proto(resp.diagnostics), "Incomplete State Upload");
    assert!(store.state("default").await.is_none());

    let resp = server.write_state_bytes(Vec::new()).await;
    assert_error_contains(
        &diagnostics_from_proto(resp.diagnostics),
        "Missing State Chunk Metadata",
    );
}

#[tokio::test]
async fn test_locking_through_the_dispatcher() {
    let server = store_server(InMemoryStateStore::new().with_state("default", b"{}".to_vec()));

    let lock = server
        .lock_state(lock_state::Request {
            type_name: STORE.into(),
            state_id: "default".into(),
            operation: "apply".into(),
        })
        .await;
    assert!(lock.diagnostics.is_empty());
    assert_eq!(lock.lock_id, "lock-1");

    let resp = server
        .delete_state(delete_state::Request {
            type_name: STORE.into(),
            state_id: "default".into(),
        })
        .await;
    assert_error_contains(&diagnostics_from_proto(resp.diagnostics), "State Locked");

    let resp = server
        .unlock_state(unlock_state::Request {
            type_name: STORE.into(),
            state_id: "default".into(),
            lock_id: lock.lock_id,
        })
        .await;
    assert!(resp.diagnostics.is_empty());

    let resp = server
        .delete_state(delete_state::Request {
            type_name: STORE.into(),
            state_id: "default".into(),
        })
        .await;
    assert!(resp.diagnostics.is_empty());
}

#[tokio::test]
async fn test_read_state_bytes_uses_server_default_chunk_size() {
    init_test_logging();
    let store = StateStoreDouble::with_schema(Schema::v0()).on_read_state_bytes(|_req, resp| {
        resp.bytes = vec![7; 10];
    });
    let server = ProviderServer::with_options(
        Registry::new(ProviderDouble::default()).with_state_store(STORE, store),
        ServerOptions::new().with_state_chunk_size(6),
    );

    let chunks = server
        .read_state_bytes(read_state_bytes::Request {
            type_name: STORE.into(),
            state_id: "default".into(),
        })
        .await;
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].range, Some(generated::StateRange { start: 0, end: 6 }));
}

#[tokio::test]
async fn test_missing_state_store() {
    let server = store_server(InMemoryStateStore::new());

    let chunks = server
        .read_state_bytes(read_state_bytes::Request {
            type_name: "nope_store".into(),
            state_id: "default".into(),
        })
        .await;
    assert_eq!(chunks.len(), 1);
    assert_error_contains(
        &diagnostics_from_proto(chunks[0].diagnostics.clone()),
        "Missing StateStore Type",
    );
}
