//! Hemmer Provider Testkit
//!
//! A schema-driven test double for the Hemmer provider protocol. Tests build
//! a [`Registry`] of scriptable stand-ins, wrap it in a [`ProviderServer`],
//! and call wire operations directly with protocol messages, without
//! spawning a plugin process or opening a socket.
//!
//! # Overview
//!
//! The testkit provides:
//!
//! - **Value tree**: [`Value`] and [`Type`], with null and unknown markers
//! - **Schemas**: [`Schema`] and [`IdentitySchema`], with attribute lookup by
//!   path
//! - **Codec**: msgpack and JSON conversion between [`Value`] and
//!   `DynamicValue`
//! - **Dispatcher**: [`ProviderServer`], which infers create, update and
//!   delete from an apply request and plans computed attributes as unknown
//! - **Stand-ins**: the [`testing`] module, with one double per capability
//! - **Logging**: `tracing` spans per operation and subscriber helpers
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_provider_testkit::generated::plan_resource_change;
//! use hemmer_provider_testkit::schema::{Attribute, Schema};
//! use hemmer_provider_testkit::testing::{ProviderDouble, ResourceDouble};
//! use hemmer_provider_testkit::{codec, ProviderServer, Registry, Value};
//!
//! #[tokio::test]
//! async fn test_plan_create() {
//!     let schema = Schema::v0()
//!         .with_attribute("name", Attribute::required_string())
//!         .with_attribute("id", Attribute::computed_string());
//!
//!     let server = ProviderServer::new(
//!         Registry::new(ProviderDouble::default())
//!             .with_resource("example_thing", ResourceDouble::with_schema(schema.clone())),
//!     );
//!
//!     let config = Value::object([
//!         ("name", Value::string("web")),
//!         ("id", Value::null(hemmer_provider_testkit::Type::String)),
//!     ]);
//!     let resp = server
//!         .plan_resource_change(plan_resource_change::Request {
//!             type_name: "example_thing".into(),
//!             prior_state: Some(codec::encode(Some(&schema), &Value::null(schema.value_type())).unwrap()),
//!             proposed_new_state: Some(codec::encode(Some(&schema), &config).unwrap()),
//!             config: Some(codec::encode(Some(&schema), &config).unwrap()),
//!             ..Default::default()
//!         })
//!         .await;
//!
//!     let planned = codec::decode(Some(&schema), resp.planned_state.as_ref()).unwrap();
//!     assert!(planned.get_attribute("id").unwrap().is_unknown());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod data_source;
pub mod diagnostic;
pub mod error;
pub mod list_resource;
pub mod logging;
pub mod path;
pub mod provider;
pub mod registry;
pub mod resource;
pub mod schema;
pub mod server;
pub mod state_store;
pub mod testing;
pub mod types;
pub mod value;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

// Re-export main types at crate root
pub use data_source::DataSource;
pub use diagnostic::{Diagnostic, DiagnosticSeverity};
pub use error::ProviderError;
pub use list_resource::ListResource;
pub use logging::{init_logging, init_logging_with_default, init_test_logging, try_init_logging};
pub use path::{AttributePath, PathStep};
pub use provider::Provider;
pub use registry::Registry;
pub use resource::Resource;
pub use schema::{Attribute, Block, IdentitySchema, NestedBlock, Schema};
pub use server::{ProviderServer, ServerOptions, DEFAULT_STATE_CHUNK_SIZE};
pub use state_store::StateStore;
pub use types::Type;
pub use value::Value;

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
