//! End-to-end dispatch of managed resource and data source operations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hemmer_provider_testkit::diagnostic::diagnostics_from_proto;
use hemmer_provider_testkit::generated::{
    self, apply_resource_change, configure_provider, get_metadata, get_provider_schema,
    get_resource_identity_schemas, import_resource_state, plan_resource_change, read_data_source,
    read_resource, stop_provider, upgrade_resource_state,
};
use hemmer_provider_testkit::provider::SchemaResponse;
use hemmer_provider_testkit::schema::IdentityAttribute;
use hemmer_provider_testkit::testing::{
    assert_error_contains, assert_no_errors, Behavior, DataSourceDouble, ProviderDouble,
    ResourceDouble,
};
use hemmer_provider_testkit::{
    codec, init_test_logging, Attribute, Block, Diagnostic, IdentitySchema, NestedBlock,
    ProviderServer, Registry, Schema, Type, Value,
};

const THING: &str = "example_thing";

fn thing_schema() -> Schema {
    Schema::v0()
        .with_attribute("name", Attribute::required_string())
        .with_attribute("id", Attribute::computed_string())
}

fn thing(name: &str, id: Option<&str>) -> Value {
    Value::object([
        ("name", Value::string(name)),
        (
            "id",
            id.map(Value::string)
                .unwrap_or_else(|| Value::null(Type::String)),
        ),
    ])
}

fn null_thing() -> Value {
    Value::null(thing_schema().value_type())
}

fn wire(value: &Value) -> Option<generated::DynamicValue> {
    Some(codec::encode(Some(&thing_schema()), value).unwrap())
}

fn unwire(value: Option<&generated::DynamicValue>) -> Value {
    codec::decode(Some(&thing_schema()), value).unwrap()
}

fn server(resource: ResourceDouble) -> ProviderServer {
    init_test_logging();
    ProviderServer::new(Registry::new(ProviderDouble::default()).with_resource(THING, resource))
}

#[derive(Clone, Default)]
struct Calls {
    create: Arc<AtomicUsize>,
    update: Arc<AtomicUsize>,
    delete: Arc<AtomicUsize>,
}

impl Calls {
    fn counts(&self) -> (usize, usize, usize) {
        (
            self.create.load(Ordering::SeqCst),
            self.update.load(Ordering::SeqCst),
            self.delete.load(Ordering::SeqCst),
        )
    }
}

fn counting_resource(calls: &Calls) -> ResourceDouble {
    let (create, update, delete) = (
        calls.create.clone(),
        calls.update.clone(),
        calls.delete.clone(),
    );
    ResourceDouble::with_schema(thing_schema())
        .on_create(move |_req, resp| {
            create.fetch_add(1, Ordering::SeqCst);
            resp.new_state
                .set_attribute("id", Value::string("abc-123"))
                .unwrap();
        })
        .on_update(move |_req, _resp| {
            update.fetch_add(1, Ordering::SeqCst);
        })
        .on_delete(move |_req, _resp| {
            delete.fetch_add(1, Ordering::SeqCst);
        })
}

#[tokio::test]
async fn test_plan_create_marks_computed_unknown() {
    let server = server(ResourceDouble::with_schema(thing_schema()));
    let config = thing("web", None);

    let resp = server
        .plan_resource_change(plan_resource_change::Request {
            type_name: THING.into(),
            prior_state: wire(&null_thing()),
            proposed_new_state: wire(&config),
            config: wire(&config),
            ..Default::default()
        })
        .await;

    assert!(resp.diagnostics.is_empty());
    let planned = unwire(resp.planned_state.as_ref());
    assert!(planned.get_attribute("id").unwrap().is_unknown());
    assert_eq!(planned.get_attribute("name").unwrap().as_str(), Some("web"));
}

#[tokio::test]
async fn test_plan_keeps_configured_values_in_set_blocks() {
    let schema = Schema::v0()
        .with_attribute("name", Attribute::required_string())
        .with_block(
            "rule",
            NestedBlock::set(
                Block::new()
                    .with_attribute("zone", Attribute::optional_computed(Type::String))
                    .with_attribute("rule_id", Attribute::computed_string()),
            ),
        );
    let rule_type = Type::object([("zone", Type::String), ("rule_id", Type::String)]);
    let state = |name: &str, rule_id: Value| {
        Value::object([
            ("name", Value::string(name)),
            (
                "rule",
                Value::set(
                    rule_type.clone(),
                    [Value::object([("zone", Value::string("a")), ("rule_id", rule_id)])],
                )
                .unwrap(),
            ),
        ])
    };
    let encode = |value: &Value| Some(codec::encode(Some(&schema), value).unwrap());

    init_test_logging();
    let server = ProviderServer::new(
        Registry::new(ProviderDouble::default())
            .with_resource(THING, ResourceDouble::with_schema(schema.clone())),
    );
    let proposed = state("renamed", Value::string("r-1"));

    let resp = server
        .plan_resource_change(plan_resource_change::Request {
            type_name: THING.into(),
            prior_state: encode(&state("web", Value::string("r-1"))),
            proposed_new_state: encode(&proposed),
            config: encode(&state("renamed", Value::null(Type::String))),
            ..Default::default()
        })
        .await;

    assert!(resp.diagnostics.is_empty());
    let planned = codec::decode(Some(&schema), resp.planned_state.as_ref()).unwrap();
    let rule = &planned.get_attribute("rule").unwrap().elements().unwrap()[0];
    assert_eq!(rule.get_attribute("zone").unwrap().as_str(), Some("a"));
    assert_eq!(rule.get_attribute("rule_id").unwrap().as_str(), Some("r-1"));
}

#[tokio::test]
async fn test_plan_without_changes_keeps_proposed_state() {
    let server = server(ResourceDouble::with_schema(thing_schema()));
    let prior = thing("web", Some("abc-123"));
    let config = thing("web", None);

    let resp = server
        .plan_resource_change(plan_resource_change::Request {
            type_name: THING.into(),
            prior_state: wire(&prior),
            proposed_new_state: wire(&prior),
            config: wire(&config),
            prior_private: b"private".to_vec(),
            ..Default::default()
        })
        .await;

    assert!(resp.diagnostics.is_empty());
    assert_eq!(unwire(resp.planned_state.as_ref()), prior);
    assert_eq!(resp.planned_private, b"private".to_vec());
}

#[tokio::test]
async fn test_plan_reports_requires_replace() {
    let resource = ResourceDouble::with_schema(thing_schema()).on_plan_change(|req, resp| {
        let prior_name = req.prior_state.get_attribute("name").cloned();
        let proposed_name = req.proposed_new_state.get_attribute("name").cloned();
        if prior_name != proposed_name {
            resp.requires_replace
                .push(hemmer_provider_testkit::AttributePath::root().with_attribute_name("name"));
        }
    });
    let server = server(resource);

    let resp = server
        .plan_resource_change(plan_resource_change::Request {
            type_name: THING.into(),
            prior_state: wire(&thing("old", Some("abc-123"))),
            proposed_new_state: wire(&thing("new", Some("abc-123"))),
            config: wire(&thing("new", None)),
            ..Default::default()
        })
        .await;

    assert!(resp.diagnostics.is_empty());
    assert_eq!(resp.requires_replace.len(), 1);
    // id is computed and null in config
    let planned = unwire(resp.planned_state.as_ref());
    assert!(planned.get_attribute("id").unwrap().is_unknown());
}

#[tokio::test]
async fn test_apply_with_null_prior_creates() {
    let calls = Calls::default();
    let server = server(counting_resource(&calls));
    let config = thing("web", None);
    let planned = Value::object([
        ("name", Value::string("web")),
        ("id", Value::unknown(Type::String)),
    ]);

    let resp = server
        .apply_resource_change(apply_resource_change::Request {
            type_name: THING.into(),
            prior_state: wire(&null_thing()),
            planned_state: wire(&planned),
            config: wire(&config),
            planned_private: b"p".to_vec(),
            ..Default::default()
        })
        .await;

    assert!(resp.diagnostics.is_empty());
    assert_eq!(calls.counts(), (1, 0, 0));
    assert_eq!(unwire(resp.new_state.as_ref()), thing("web", Some("abc-123")));
    assert_eq!(resp.private, b"p".to_vec());
}

#[tokio::test]
async fn test_apply_with_both_states_updates() {
    let calls = Calls::default();
    let server = server(counting_resource(&calls));
    let prior = thing("old", Some("abc-123"));
    let planned = thing("new", Some("abc-123"));

    let resp = server
        .apply_resource_change(apply_resource_change::Request {
            type_name: THING.into(),
            prior_state: wire(&prior),
            planned_state: wire(&planned),
            config: wire(&thing("new", None)),
            ..Default::default()
        })
        .await;

    assert!(resp.diagnostics.is_empty());
    assert_eq!(calls.counts(), (0, 1, 0));
    // the update hook left the default in place
    assert_eq!(unwire(resp.new_state.as_ref()), planned);
}

#[tokio::test]
async fn test_apply_with_null_planned_deletes() {
    let calls = Calls::default();
    let server = server(counting_resource(&calls));
    let planned_null = wire(&null_thing());

    let resp = server
        .apply_resource_change(apply_resource_change::Request {
            type_name: THING.into(),
            prior_state: wire(&thing("web", Some("abc-123"))),
            planned_state: planned_null.clone(),
            config: wire(&null_thing()),
            ..Default::default()
        })
        .await;

    assert!(resp.diagnostics.is_empty());
    assert_eq!(calls.counts(), (0, 0, 1));
    assert_eq!(resp.new_state, planned_null);
    assert!(unwire(resp.new_state.as_ref()).is_null());
}

#[tokio::test]
async fn test_handler_error_halts_encoding() {
    let resource = ResourceDouble::with_schema(thing_schema()).on_create(|_req, resp| {
        resp.diagnostics.push(Diagnostic::warning("slow API"));
        resp.diagnostics
            .push(Diagnostic::error("Quota Exceeded").with_detail("no more things"));
    });
    let server = server(resource);

    let resp = server
        .apply_resource_change(apply_resource_change::Request {
            type_name: THING.into(),
            prior_state: wire(&null_thing()),
            planned_state: wire(&thing("web", None)),
            config: wire(&thing("web", None)),
            ..Default::default()
        })
        .await;

    assert!(resp.new_state.is_none());
    let diagnostics = diagnostics_from_proto(resp.diagnostics);
    assert_eq!(diagnostics.len(), 2);
    assert_error_contains(&diagnostics, "Quota Exceeded");
}

#[tokio::test]
async fn test_missing_resource_type() {
    let calls = Calls::default();
    let server = server(counting_resource(&calls));

    let resp = server
        .read_resource(read_resource::Request {
            type_name: "nope_thing".into(),
            current_state: wire(&thing("web", Some("abc-123"))),
            ..Default::default()
        })
        .await;

    assert!(resp.new_state.is_none());
    let diagnostics = diagnostics_from_proto(resp.diagnostics);
    assert_eq!(diagnostics.len(), 1);
    assert_error_contains(&diagnostics, "Missing Resource Type");
    assert_error_contains(&diagnostics, "nope_thing");
    assert_eq!(calls.counts(), (0, 0, 0));
}

#[tokio::test]
async fn test_schema_diagnostics_short_circuit() {
    let resource = ResourceDouble {
        schema: Some(Behavior::respond(SchemaResponse {
            schema: Some(thing_schema()),
            diagnostics: vec![Diagnostic::warning("schema is deprecated")],
        })),
        ..Default::default()
    };
    let server = server(resource);

    let resp = server
        .read_resource(read_resource::Request {
            type_name: THING.into(),
            current_state: wire(&thing("web", Some("abc-123"))),
            ..Default::default()
        })
        .await;

    assert!(resp.new_state.is_none());
    assert_eq!(resp.diagnostics.len(), 1);
    assert_eq!(resp.diagnostics[0].summary, "schema is deprecated");
}

#[tokio::test]
async fn test_read_defaults_to_current_state() {
    let server = server(ResourceDouble::with_schema(thing_schema()));
    let current = thing("web", Some("abc-123"));

    let resp = server
        .read_resource(read_resource::Request {
            type_name: THING.into(),
            current_state: wire(&current),
            private: b"p".to_vec(),
            ..Default::default()
        })
        .await;

    assert!(resp.diagnostics.is_empty());
    assert_eq!(unwire(resp.new_state.as_ref()), current);
    assert_eq!(resp.private, b"p".to_vec());
}

#[tokio::test]
async fn test_undecodable_state_is_a_diagnostic() {
    let server = server(ResourceDouble::with_schema(thing_schema()));

    let resp = server
        .read_resource(read_resource::Request {
            type_name: THING.into(),
            current_state: Some(generated::DynamicValue {
                msgpack: Vec::new(),
                json: br#"{"name": "web", "colour": "red"}"#.to_vec(),
            }),
            ..Default::default()
        })
        .await;

    assert!(resp.new_state.is_none());
    let diagnostics = diagnostics_from_proto(resp.diagnostics);
    assert_error_contains(&diagnostics, "Error Decoding Current State");
}

#[tokio::test]
async fn test_import_null_state_imports_nothing() {
    let server = server(ResourceDouble::with_schema(thing_schema()));

    let resp = server
        .import_resource_state(import_resource_state::Request {
            type_name: THING.into(),
            id: "abc-123".into(),
            identity: None,
        })
        .await;

    assert!(resp.imported_resources.is_empty());
    assert!(resp.diagnostics.is_empty());
}

#[tokio::test]
async fn test_import_by_identity() {
    let identity_schema =
        IdentitySchema::v0().with_attribute("id", IdentityAttribute::required_for_import(Type::String));
    let resource = ResourceDouble::with_schema(thing_schema())
        .with_identity_schema(identity_schema.clone())
        .on_import_state(|req, resp| {
            let id = req
                .identity
                .as_ref()
                .and_then(|identity| identity.get_attribute("id"))
                .and_then(Value::as_str)
                .unwrap_or(req.id.as_str())
                .to_string();
            resp.state = thing("imported", Some(&id));
        });
    let server = server(resource);
    let identity = Value::object([("id", Value::string("abc-123"))]);

    let resp = server
        .import_resource_state(import_resource_state::Request {
            type_name: THING.into(),
            id: String::new(),
            identity: codec::encode_identity(Some(&identity_schema), Some(&identity)).unwrap(),
        })
        .await;

    assert!(resp.diagnostics.is_empty());
    assert_eq!(resp.imported_resources.len(), 1);
    let imported = &resp.imported_resources[0];
    assert_eq!(imported.type_name, THING);
    assert_eq!(
        unwire(imported.state.as_ref()),
        thing("imported", Some("abc-123"))
    );
    let echoed =
        codec::decode_identity(Some(&identity_schema), imported.identity.as_ref()).unwrap();
    assert_eq!(echoed, Some(identity));
}

#[tokio::test]
async fn test_upgrade_at_current_version_skips_hook() {
    let called = Arc::new(AtomicUsize::new(0));
    let counter = called.clone();
    let resource = ResourceDouble::with_schema(thing_schema()).on_upgrade_state(move |_req, _resp| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let server = server(resource);

    let resp = server
        .upgrade_resource_state(upgrade_resource_state::Request {
            type_name: THING.into(),
            version: 0,
            raw_state: Some(generated::RawState {
                json: br#"{"name": "web", "id": "abc-123"}"#.to_vec(),
                ..Default::default()
            }),
        })
        .await;

    assert!(resp.diagnostics.is_empty());
    assert_eq!(called.load(Ordering::SeqCst), 0);
    assert_eq!(
        unwire(resp.upgraded_state.as_ref()),
        thing("web", Some("abc-123"))
    );
}

#[tokio::test]
async fn test_upgrade_from_older_version_calls_hook() {
    let schema = Schema::new(2)
        .with_attribute("name", Attribute::required_string())
        .with_attribute("id", Attribute::computed_string());
    let resource = ResourceDouble::with_schema(schema.clone()).on_upgrade_state(|req, resp| {
        assert_eq!(req.version, 1);
        let old: hemmer_provider_testkit::serde_json::Value =
            hemmer_provider_testkit::serde_json::from_slice(&req.raw_state.json).unwrap();
        resp.upgraded_state = thing(
            old["title"].as_str().unwrap_or_default(),
            old["id"].as_str(),
        );
    });
    let server = server(resource);

    let resp = server
        .upgrade_resource_state(upgrade_resource_state::Request {
            type_name: THING.into(),
            version: 1,
            raw_state: Some(generated::RawState {
                json: br#"{"title": "web", "id": "abc-123"}"#.to_vec(),
                ..Default::default()
            }),
        })
        .await;

    assert!(resp.diagnostics.is_empty());
    let upgraded = codec::decode(Some(&schema), resp.upgraded_state.as_ref()).unwrap();
    assert_eq!(upgraded, thing("web", Some("abc-123")));
}

#[tokio::test]
async fn test_upgrade_of_unreadable_state() {
    let server = server(ResourceDouble::with_schema(thing_schema()));

    let resp = server
        .upgrade_resource_state(upgrade_resource_state::Request {
            type_name: THING.into(),
            version: 0,
            raw_state: Some(generated::RawState {
                json: br#"{"name": 42}"#.to_vec(),
                ..Default::default()
            }),
        })
        .await;

    assert!(resp.upgraded_state.is_none());
    assert_error_contains(
        &diagnostics_from_proto(resp.diagnostics),
        "Unable to Read Previously Saved State",
    );
}

#[tokio::test]
async fn test_read_data_source_defaults_to_config() {
    let schema = Schema::v0()
        .with_attribute("name", Attribute::required_string())
        .with_attribute("arn", Attribute::computed_string());
    let data_source = DataSourceDouble::with_schema(schema.clone());
    let server = ProviderServer::new(
        Registry::new(ProviderDouble::default()).with_data_source("example_lookup", data_source),
    );
    let config = Value::object([
        ("name", Value::string("web")),
        ("arn", Value::null(Type::String)),
    ]);

    let resp = server
        .read_data_source(read_data_source::Request {
            type_name: "example_lookup".into(),
            config: Some(codec::encode(Some(&schema), &config).unwrap()),
        })
        .await;

    assert_no_errors(&diagnostics_from_proto(resp.diagnostics));
    let state = codec::decode(Some(&schema), resp.state.as_ref()).unwrap();
    assert_eq!(state, config);
}

#[tokio::test]
async fn test_get_provider_schema() {
    let registry = Registry::new(ProviderDouble::default())
        .with_resource(THING, ResourceDouble::with_schema(thing_schema()))
        .with_resource("schemaless_thing", ResourceDouble::default())
        .with_data_source(
            "example_lookup",
            DataSourceDouble::with_schema(Schema::v0()),
        );
    let server = ProviderServer::new(registry);

    let resp = server
        .get_provider_schema(get_provider_schema::Request {})
        .await;

    assert!(resp.diagnostics.is_empty());
    assert!(resp.provider.is_some());
    assert!(resp.resource_schemas.contains_key(THING));
    assert!(!resp.resource_schemas.contains_key("schemaless_thing"));
    assert!(resp.data_source_schemas.contains_key("example_lookup"));
    assert!(resp.server_capabilities.unwrap().plan_destroy);

    let schema = Schema::try_from(resp.resource_schemas[THING].clone()).unwrap();
    assert_eq!(schema.value_type(), thing_schema().value_type());
}

#[tokio::test]
async fn test_get_metadata_lists_type_names() {
    let registry = Registry::new(ProviderDouble::default())
        .with_resource("b_thing", ResourceDouble::default())
        .with_resource("a_thing", ResourceDouble::default())
        .with_data_source("a_lookup", DataSourceDouble::default());
    let server = ProviderServer::new(registry);

    let resp = server.get_metadata(get_metadata::Request {}).await;

    assert_eq!(resp.resources, vec!["a_thing", "b_thing"]);
    assert_eq!(resp.data_sources, vec!["a_lookup"]);
    assert!(resp.list_resources.is_empty());
}

#[tokio::test]
async fn test_configure_provider_decodes_config() {
    init_test_logging();
    let seen = Arc::new(std::sync::Mutex::new(None));
    let captured = seen.clone();
    let provider_schema = Schema::v0().with_attribute("region", Attribute::optional_string());
    let provider = ProviderDouble::with_schema(provider_schema.clone())
        .on_configure(move |req, _resp| {
            let region = req.config.get_attribute("region").and_then(Value::as_str);
            *captured.lock().unwrap() = region.map(str::to_string);
        })
        .on_stop(|_req, resp| resp.error = Some("still busy".into()));
    let server = ProviderServer::new(Registry::new(provider));

    let config = Value::object([("region", Value::string("eu-west-1"))]);
    let resp = server
        .configure_provider(configure_provider::Request {
            client_version: "1.0.0".into(),
            config: Some(codec::encode(Some(&provider_schema), &config).unwrap()),
        })
        .await;
    assert!(resp.diagnostics.is_empty());
    assert_eq!(seen.lock().unwrap().as_deref(), Some("eu-west-1"));

    let resp = server.stop_provider(stop_provider::Request {}).await;
    assert_eq!(resp.error, "still busy");
}

#[tokio::test]
async fn test_identity_schemas_only_for_resources_that_declare_one() {
    init_test_logging();
    let identity =
        IdentitySchema::v0().with_attribute("id", IdentityAttribute::required_for_import(Type::String));
    let server = ProviderServer::new(
        Registry::new(ProviderDouble::default())
            .with_resource(
                THING,
                ResourceDouble::with_schema(thing_schema()).with_identity_schema(identity),
            )
            .with_resource("example_other", ResourceDouble::with_schema(thing_schema())),
    );

    let resp = server
        .get_resource_identity_schemas(get_resource_identity_schemas::Request {})
        .await;
    assert!(resp.diagnostics.is_empty());
    assert_eq!(resp.identity_schemas.len(), 1);
    assert_eq!(resp.identity_schemas[THING].identity_attributes.len(), 1);
}
