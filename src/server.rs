//! The lifecycle dispatcher.
//!
//! [`ProviderServer`] has one method per wire operation. Every method follows
//! the same steps:
//!
//! 1. Resolve the implementation for the request's type name.
//! 2. Fetch its schema through the implementation's own `schema` sub-call.
//!    Any diagnostic from that sub-call ends the operation.
//! 3. Decode value-bearing request fields against the schema.
//! 4. Run the operation logic and hand the implementation a pre-populated
//!    response.
//! 5. Encode the results. An error diagnostic from the implementation ends
//!    the operation without encoding anything; warnings are returned.
//!
//! Methods return responses, never `Result`: every expected failure is a
//! diagnostic in an otherwise empty response.

use tracing::{debug, info, instrument, warn};

use crate::codec::{self, RawState};
use crate::data_source::{DataSource, ReadDataSourceRequest, ReadDataSourceResponse};
use crate::diagnostic::{diagnostics_to_proto, has_errors, Diagnostic};
use crate::error::ProviderError;
use crate::generated;
use crate::list_resource::{ListRequest, ListResource, ListResult, ValidateListConfigRequest};
use crate::provider::{
    ConfigureRequest, ConfigureResponse, Provider, SchemaResponse, StopResponse,
    ValidateConfigRequest, ValidateConfigResponse,
};
use crate::registry::Registry;
use crate::resource::{
    CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, IdentitySchemaResponse,
    ImportStateRequest, ImportStateResponse, PlanChangeRequest, PlanChangeResponse, ReadRequest,
    ReadResponse, Resource, UpdateRequest, UpdateResponse, UpgradeStateRequest,
    UpgradeStateResponse,
};
use crate::schema::{IdentitySchema, Schema};
use crate::state_store::{
    ConfigureStateStoreRequest, ConfigureStateStoreResponse, DeleteStateRequest,
    GetStatesResponse, LockStateRequest, LockStateResponse, ReadStateBytesRequest,
    ReadStateBytesResponse, StateStore, StateStoreResponse, UnlockStateRequest,
    WriteStateBytesRequest,
};
use crate::value::{Value, Walk};

/// Default chunk size for streaming state bytes: 8 MiB.
pub const DEFAULT_STATE_CHUNK_SIZE: i64 = 8 * 1024 * 1024;

/// Options for configuring the dispatcher.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Chunk size used for state bytes when a state store does not
    /// negotiate one. Default: 8 MiB.
    pub state_chunk_size: i64,
    /// Advertised `get_provider_schema_optional` capability. Default: false.
    pub get_provider_schema_optional: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            state_chunk_size: DEFAULT_STATE_CHUNK_SIZE,
            get_provider_schema_optional: false,
        }
    }
}

impl ServerOptions {
    /// Create new server options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default state chunk size.
    pub fn with_state_chunk_size(mut self, size: i64) -> Self {
        self.state_chunk_size = size;
        self
    }

    /// Set the advertised `get_provider_schema_optional` capability.
    pub fn with_get_provider_schema_optional(mut self, optional: bool) -> Self {
        self.get_provider_schema_optional = optional;
        self
    }

    fn chunk_size(&self) -> i64 {
        if self.state_chunk_size > 0 {
            self.state_chunk_size
        } else {
            DEFAULT_STATE_CHUNK_SIZE
        }
    }
}

/// An operation ended early with these diagnostics.
struct Halt(Vec<Diagnostic>);

impl From<Diagnostic> for Halt {
    fn from(diagnostic: Diagnostic) -> Self {
        Halt(vec![diagnostic])
    }
}

fn check(diagnostics: &[Diagnostic]) -> Result<(), Halt> {
    if has_errors(diagnostics) {
        Err(Halt(diagnostics.to_vec()))
    } else {
        Ok(())
    }
}

/// Wire responses carrying a diagnostics list.
trait DiagnosticResponse: Default {
    fn set_diagnostics(&mut self, diagnostics: Vec<generated::Diagnostic>);
    fn diagnostics(&self) -> &[generated::Diagnostic];
}

macro_rules! diagnostic_response {
    ($($ty:path),* $(,)?) => {
        $(
            impl DiagnosticResponse for $ty {
                fn set_diagnostics(&mut self, diagnostics: Vec<generated::Diagnostic>) {
                    self.diagnostics = diagnostics;
                }

                fn diagnostics(&self) -> &[generated::Diagnostic] {
                    &self.diagnostics
                }
            }
        )*
    };
}

diagnostic_response!(
    generated::get_metadata::Response,
    generated::get_provider_schema::Response,
    generated::get_resource_identity_schemas::Response,
    generated::validate_provider_config::Response,
    generated::configure_provider::Response,
    generated::validate_resource_config::Response,
    generated::upgrade_resource_state::Response,
    generated::read_resource::Response,
    generated::plan_resource_change::Response,
    generated::apply_resource_change::Response,
    generated::import_resource_state::Response,
    generated::validate_data_resource_config::Response,
    generated::read_data_source::Response,
    generated::validate_list_resource_config::Response,
    generated::validate_state_store_config::Response,
    generated::configure_state_store::Response,
    generated::get_states::Response,
    generated::delete_state::Response,
    generated::lock_state::Response,
    generated::unlock_state::Response,
    generated::read_state_bytes::Response,
    generated::write_state_bytes::Response,
);

fn error_count(diagnostics: &[generated::Diagnostic]) -> usize {
    diagnostics
        .iter()
        .filter(|d| d.severity == generated::diagnostic::Severity::Error as i32)
        .count()
}

fn finish<R: DiagnosticResponse>(op: &str, result: Result<R, Halt>) -> R {
    let resp = result.unwrap_or_else(|Halt(diagnostics)| {
        let mut resp = R::default();
        resp.set_diagnostics(diagnostics_to_proto(&diagnostics));
        resp
    });
    let errors = error_count(resp.diagnostics());
    if errors > 0 {
        warn!(
            errors,
            diagnostics = resp.diagnostics().len(),
            "{} completed with errors",
            op
        );
    } else {
        info!(diagnostics = resp.diagnostics().len(), "{} completed", op);
    }
    resp
}

fn decode(
    schema: Option<&Schema>,
    value: Option<&generated::DynamicValue>,
    what: &str,
) -> Result<Value, Halt> {
    codec::decode(schema, value)
        .map_err(|e| Halt::from(Diagnostic::from_error(format!("Error Decoding {}", what), &e)))
}

fn encode(
    schema: Option<&Schema>,
    value: &Value,
    what: &str,
) -> Result<generated::DynamicValue, Halt> {
    codec::encode(schema, value)
        .map_err(|e| Halt::from(Diagnostic::from_error(format!("Error Encoding {}", what), &e)))
}

fn decode_identity(
    schema: Option<&IdentitySchema>,
    data: Option<&generated::ResourceIdentityData>,
    what: &str,
) -> Result<Option<Value>, Halt> {
    codec::decode_identity(schema, data)
        .map_err(|e| Halt::from(Diagnostic::from_error(format!("Error Decoding {}", what), &e)))
}

fn encode_identity(
    schema: Option<&IdentitySchema>,
    value: Option<&Value>,
    what: &str,
) -> Result<Option<generated::ResourceIdentityData>, Halt> {
    codec::encode_identity(schema, value)
        .map_err(|e| Halt::from(Diagnostic::from_error(format!("Error Encoding {}", what), &e)))
}

fn schema_or_halt(resp: SchemaResponse) -> Result<Option<Schema>, Halt> {
    if resp.diagnostics.is_empty() {
        Ok(resp.schema)
    } else {
        Err(Halt(resp.diagnostics))
    }
}

async fn provider_schema(provider: &dyn Provider) -> Result<Schema, Halt> {
    let mut resp = SchemaResponse::default();
    provider.schema(&mut resp).await;
    Ok(schema_or_halt(resp)?.unwrap_or_default())
}

async fn resource_schema(resource: &dyn Resource) -> Result<Option<Schema>, Halt> {
    let mut resp = SchemaResponse::default();
    resource.schema(&mut resp).await;
    schema_or_halt(resp)
}

async fn resource_identity_schema(resource: &dyn Resource) -> Result<Option<IdentitySchema>, Halt> {
    let mut resp = IdentitySchemaResponse::default();
    resource.identity_schema(&mut resp).await;
    if resp.diagnostics.is_empty() {
        Ok(resp.identity_schema)
    } else {
        Err(Halt(resp.diagnostics))
    }
}

async fn data_source_schema(data_source: &dyn DataSource) -> Result<Option<Schema>, Halt> {
    let mut resp = SchemaResponse::default();
    data_source.schema(&mut resp).await;
    schema_or_halt(resp)
}

async fn list_resource_schema(list_resource: &dyn ListResource) -> Result<Option<Schema>, Halt> {
    let mut resp = SchemaResponse::default();
    list_resource.schema(&mut resp).await;
    schema_or_halt(resp)
}

async fn state_store_schema(state_store: &dyn StateStore) -> Result<Option<Schema>, Halt> {
    let mut resp = SchemaResponse::default();
    state_store.schema(&mut resp).await;
    schema_or_halt(resp)
}

/// Mark every computed attribute that is null in `config` as unknown.
///
/// A path blocked by a null or unknown value in `config` counts as null. A
/// path whose list index, map key or set element is absent from `config`
/// keeps its proposed value. The root is never rewritten.
pub fn mark_computed_unknown(
    schema: &Schema,
    config: &Value,
    proposed: Value,
) -> Result<Value, ProviderError> {
    proposed.transform(|path, value| {
        if path.is_root() {
            return Ok(value);
        }
        let config_is_null = match config.walk_deepest(path)? {
            Walk::Reached(found) => found.is_null(),
            Walk::Blocked(_) => true,
            Walk::Missing(_) => false,
        };
        if !config_is_null {
            return Ok(value);
        }
        match schema.attribute_at_path(path) {
            Some(attr) if attr.is_computed() => Ok(Value::unknown(value.ty().clone())),
            _ => Ok(value),
        }
    })
}

fn list_event(
    result: ListResult,
    include_resource_object: bool,
    schema: Option<&Schema>,
    identity_schema: Option<&IdentitySchema>,
) -> Result<generated::list_resource::Event, Halt> {
    let identity = encode_identity(identity_schema, result.identity.as_ref(), "List Result Identity")?;
    let resource_object = match (include_resource_object, result.resource_object.as_ref()) {
        (true, Some(object)) => Some(encode(schema, object, "List Result Resource Object")?),
        _ => None,
    };
    Ok(generated::list_resource::Event {
        identity,
        display_name: result.display_name,
        resource_object,
        diagnostic: diagnostics_to_proto(&result.diagnostics),
    })
}

fn type_names<'a, T>(entries: impl Iterator<Item = (&'a str, T)>) -> Vec<String> {
    entries.map(|(name, _)| name.to_string()).collect()
}

/// Split a state blob into wire chunks with `[start, end)` byte ranges.
///
/// An empty blob is a single empty chunk. Diagnostics ride on the first
/// chunk.
fn chunk_state(
    bytes: &[u8],
    chunk_size: i64,
    diagnostics: Vec<generated::Diagnostic>,
) -> Vec<generated::read_state_bytes::Response> {
    let total_length = bytes.len() as i64;
    let size = usize::try_from(chunk_size).unwrap_or(usize::MAX).max(1);

    if bytes.is_empty() {
        return vec![generated::read_state_bytes::Response {
            bytes: Vec::new(),
            total_length,
            range: Some(generated::StateRange { start: 0, end: 0 }),
            diagnostics,
        }];
    }

    let mut diagnostics = Some(diagnostics);
    bytes
        .chunks(size)
        .enumerate()
        .map(|(i, chunk)| {
            let start = (i * size) as i64;
            generated::read_state_bytes::Response {
                bytes: chunk.to_vec(),
                total_length,
                range: Some(generated::StateRange {
                    start,
                    end: start + chunk.len() as i64,
                }),
                diagnostics: diagnostics.take().unwrap_or_default(),
            }
        })
        .collect()
}

/// Dispatches wire operations to the implementations in a [`Registry`].
///
/// # Example
///
/// ```ignore
/// use hemmer_provider_testkit::{ProviderServer, Registry};
/// use hemmer_provider_testkit::testing::{ProviderDouble, ResourceDouble};
///
/// let server = ProviderServer::new(
///     Registry::new(ProviderDouble::default())
///         .with_resource("example_thing", ResourceDouble::with_schema(schema)),
/// );
/// let resp = server.plan_resource_change(request).await;
/// ```
#[derive(Clone)]
pub struct ProviderServer {
    registry: Registry,
    options: ServerOptions,
}

impl ProviderServer {
    /// Create a dispatcher with default options.
    pub fn new(registry: Registry) -> Self {
        Self::with_options(registry, ServerOptions::default())
    }

    /// Create a dispatcher with the given options.
    pub fn with_options(registry: Registry, options: ServerOptions) -> Self {
        Self { registry, options }
    }

    /// The registry this dispatcher serves.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The dispatcher options.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    fn server_capabilities(&self) -> generated::ServerCapabilities {
        generated::ServerCapabilities {
            plan_destroy: true,
            get_provider_schema_optional: self.options.get_provider_schema_optional,
        }
    }

    // =========================================================================
    // Provider
    // =========================================================================

    /// Report registered type names and server capabilities.
    #[instrument(skip_all, name = "rpc.get_metadata")]
    pub async fn get_metadata(
        &self,
        _req: generated::get_metadata::Request,
    ) -> generated::get_metadata::Response {
        debug!("GetMetadata called");
        let resp = generated::get_metadata::Response {
            server_capabilities: Some(self.server_capabilities()),
            diagnostics: Vec::new(),
            resources: type_names(self.registry.resources()),
            data_sources: type_names(self.registry.data_sources()),
            list_resources: type_names(self.registry.list_resources()),
            state_stores: type_names(self.registry.state_stores()),
        };
        finish("GetMetadata", Ok(resp))
    }

    /// Collect the schema of the provider and of every registered type.
    ///
    /// Diagnostics from all schema sub-calls are concatenated. Types without
    /// a schema are left out; a missing provider schema is served as an
    /// empty one.
    #[instrument(skip_all, name = "rpc.get_provider_schema")]
    pub async fn get_provider_schema(
        &self,
        _req: generated::get_provider_schema::Request,
    ) -> generated::get_provider_schema::Response {
        debug!("GetProviderSchema called");
        let mut diagnostics = Vec::new();
        let mut resp = generated::get_provider_schema::Response {
            server_capabilities: Some(self.server_capabilities()),
            ..Default::default()
        };

        let mut schema_resp = SchemaResponse::default();
        self.registry.provider().schema(&mut schema_resp).await;
        diagnostics.extend(schema_resp.diagnostics);
        let provider = schema_resp.schema.unwrap_or_default();
        resp.provider = Some(generated::Schema::from(&provider));

        for (name, resource) in self.registry.resources() {
            let mut schema_resp = SchemaResponse::default();
            resource.schema(&mut schema_resp).await;
            diagnostics.extend(schema_resp.diagnostics);
            if let Some(schema) = schema_resp.schema {
                resp.resource_schemas
                    .insert(name.to_string(), generated::Schema::from(&schema));
            }
        }

        for (name, data_source) in self.registry.data_sources() {
            let mut schema_resp = SchemaResponse::default();
            data_source.schema(&mut schema_resp).await;
            diagnostics.extend(schema_resp.diagnostics);
            if let Some(schema) = schema_resp.schema {
                resp.data_source_schemas
                    .insert(name.to_string(), generated::Schema::from(&schema));
            }
        }

        for (name, list_resource) in self.registry.list_resources() {
            let mut schema_resp = SchemaResponse::default();
            list_resource.schema(&mut schema_resp).await;
            diagnostics.extend(schema_resp.diagnostics);
            if let Some(schema) = schema_resp.schema {
                resp.list_resource_schemas
                    .insert(name.to_string(), generated::Schema::from(&schema));
            }
        }

        for (name, state_store) in self.registry.state_stores() {
            let mut schema_resp = SchemaResponse::default();
            state_store.schema(&mut schema_resp).await;
            diagnostics.extend(schema_resp.diagnostics);
            if let Some(schema) = schema_resp.schema {
                resp.state_store_schemas
                    .insert(name.to_string(), generated::Schema::from(&schema));
            }
        }

        resp.diagnostics = diagnostics_to_proto(&diagnostics);
        finish("GetProviderSchema", Ok(resp))
    }

    /// Collect the identity schema of every resource that declares one.
    #[instrument(skip_all, name = "rpc.get_resource_identity_schemas")]
    pub async fn get_resource_identity_schemas(
        &self,
        _req: generated::get_resource_identity_schemas::Request,
    ) -> generated::get_resource_identity_schemas::Response {
        debug!("GetResourceIdentitySchemas called");
        let mut diagnostics = Vec::new();
        let mut resp = generated::get_resource_identity_schemas::Response::default();

        for (name, resource) in self.registry.resources() {
            let mut identity_resp = IdentitySchemaResponse::default();
            resource.identity_schema(&mut identity_resp).await;
            diagnostics.extend(identity_resp.diagnostics);
            if let Some(schema) = identity_resp.identity_schema {
                resp.identity_schemas.insert(
                    name.to_string(),
                    generated::ResourceIdentitySchema::from(&schema),
                );
            }
        }

        resp.diagnostics = diagnostics_to_proto(&diagnostics);
        finish("GetResourceIdentitySchemas", Ok(resp))
    }

    /// Validate the provider configuration.
    #[instrument(skip_all, name = "rpc.validate_provider_config")]
    pub async fn validate_provider_config(
        &self,
        req: generated::validate_provider_config::Request,
    ) -> generated::validate_provider_config::Response {
        debug!("ValidateProviderConfig called");
        finish(
            "ValidateProviderConfig",
            self.try_validate_provider_config(req).await,
        )
    }

    async fn try_validate_provider_config(
        &self,
        req: generated::validate_provider_config::Request,
    ) -> Result<generated::validate_provider_config::Response, Halt> {
        let provider = self.registry.provider();
        let schema = provider_schema(provider.as_ref()).await?;
        let config = decode(Some(&schema), req.config.as_ref(), "Provider Config")?;

        let mut resp = ValidateConfigResponse::default();
        provider
            .validate_config(ValidateConfigRequest { config }, &mut resp)
            .await;

        Ok(generated::validate_provider_config::Response {
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
        })
    }

    /// Configure the provider.
    #[instrument(skip_all, name = "rpc.configure_provider")]
    pub async fn configure_provider(
        &self,
        req: generated::configure_provider::Request,
    ) -> generated::configure_provider::Response {
        debug!(client_version = %req.client_version, "ConfigureProvider called");
        finish("ConfigureProvider", self.try_configure_provider(req).await)
    }

    async fn try_configure_provider(
        &self,
        req: generated::configure_provider::Request,
    ) -> Result<generated::configure_provider::Response, Halt> {
        let provider = self.registry.provider();
        let schema = provider_schema(provider.as_ref()).await?;
        let config = decode(Some(&schema), req.config.as_ref(), "Provider Config")?;

        let mut resp = ConfigureResponse::default();
        provider
            .configure(
                ConfigureRequest {
                    client_version: req.client_version,
                    config,
                },
                &mut resp,
            )
            .await;

        Ok(generated::configure_provider::Response {
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
        })
    }

    /// Stop the provider.
    #[instrument(skip_all, name = "rpc.stop_provider")]
    pub async fn stop_provider(
        &self,
        _req: generated::stop_provider::Request,
    ) -> generated::stop_provider::Response {
        debug!("StopProvider called");
        let mut resp = StopResponse::default();
        self.registry.provider().stop(&mut resp).await;
        match resp.error {
            Some(error) => {
                warn!(error = %error, "StopProvider failed");
                generated::stop_provider::Response { error }
            }
            None => {
                info!("StopProvider completed");
                generated::stop_provider::Response::default()
            }
        }
    }

    // =========================================================================
    // Managed resources
    // =========================================================================

    /// Validate a resource configuration.
    #[instrument(skip_all, name = "rpc.validate_resource_config", fields(type_name = %req.type_name))]
    pub async fn validate_resource_config(
        &self,
        req: generated::validate_resource_config::Request,
    ) -> generated::validate_resource_config::Response {
        debug!("ValidateResourceConfig called");
        finish(
            "ValidateResourceConfig",
            self.try_validate_resource_config(req).await,
        )
    }

    async fn try_validate_resource_config(
        &self,
        req: generated::validate_resource_config::Request,
    ) -> Result<generated::validate_resource_config::Response, Halt> {
        let resource = self.registry.resource(&req.type_name)?;
        let schema = resource_schema(resource.as_ref()).await?;
        let config = decode(schema.as_ref(), req.config.as_ref(), "Config")?;

        let mut resp = ValidateConfigResponse::default();
        resource
            .validate_config(ValidateConfigRequest { config }, &mut resp)
            .await;

        Ok(generated::validate_resource_config::Response {
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
        })
    }

    /// Upgrade stored state to the current schema version.
    ///
    /// State already at the current version is decoded and re-encoded
    /// without calling the resource's upgrade handler.
    #[instrument(skip_all, name = "rpc.upgrade_resource_state", fields(type_name = %req.type_name))]
    pub async fn upgrade_resource_state(
        &self,
        req: generated::upgrade_resource_state::Request,
    ) -> generated::upgrade_resource_state::Response {
        debug!(version = req.version, "UpgradeResourceState called");
        finish(
            "UpgradeResourceState",
            self.try_upgrade_resource_state(req).await,
        )
    }

    async fn try_upgrade_resource_state(
        &self,
        req: generated::upgrade_resource_state::Request,
    ) -> Result<generated::upgrade_resource_state::Response, Halt> {
        let resource = self.registry.resource(&req.type_name)?;
        let schema = resource_schema(resource.as_ref()).await?;
        let raw_state = req.raw_state.map(RawState::from).unwrap_or_default();
        let null_state = decode(schema.as_ref(), None, "Upgraded State")?;
        let current_version = schema.as_ref().map(|s| s.version).unwrap_or_default();

        if req.version == current_version {
            debug!(version = req.version, "state already at the current schema version");
            let state = raw_state.unmarshal(null_state.ty()).map_err(|e| {
                Halt::from(Diagnostic::from_error(
                    "Unable to Read Previously Saved State",
                    &e,
                ))
            })?;
            return Ok(generated::upgrade_resource_state::Response {
                upgraded_state: Some(encode(schema.as_ref(), &state, "Upgraded State")?),
                diagnostics: Vec::new(),
            });
        }

        let mut resp = UpgradeStateResponse {
            upgraded_state: null_state,
            diagnostics: Vec::new(),
        };
        resource
            .upgrade_state(
                UpgradeStateRequest {
                    version: req.version,
                    raw_state,
                },
                &mut resp,
            )
            .await;
        check(&resp.diagnostics)?;

        Ok(generated::upgrade_resource_state::Response {
            upgraded_state: Some(encode(
                schema.as_ref(),
                &resp.upgraded_state,
                "Upgraded State",
            )?),
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
        })
    }

    /// Refresh a resource. The new state defaults to the current state.
    #[instrument(skip_all, name = "rpc.read_resource", fields(type_name = %req.type_name))]
    pub async fn read_resource(
        &self,
        req: generated::read_resource::Request,
    ) -> generated::read_resource::Response {
        debug!("ReadResource called");
        finish("ReadResource", self.try_read_resource(req).await)
    }

    async fn try_read_resource(
        &self,
        req: generated::read_resource::Request,
    ) -> Result<generated::read_resource::Response, Halt> {
        let resource = self.registry.resource(&req.type_name)?;
        let schema = resource_schema(resource.as_ref()).await?;
        let identity_schema = resource_identity_schema(resource.as_ref()).await?;
        let current_state = decode(schema.as_ref(), req.current_state.as_ref(), "Current State")?;
        let current_identity = decode_identity(
            identity_schema.as_ref(),
            req.current_identity.as_ref(),
            "Current Identity",
        )?;

        let mut resp = ReadResponse {
            new_state: current_state.clone(),
            new_identity: current_identity.clone(),
            private: req.private.clone(),
            diagnostics: Vec::new(),
        };
        resource
            .read(
                ReadRequest {
                    current_state,
                    private: req.private,
                    current_identity,
                },
                &mut resp,
            )
            .await;
        check(&resp.diagnostics)?;

        Ok(generated::read_resource::Response {
            new_state: Some(encode(schema.as_ref(), &resp.new_state, "New State")?),
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
            private: resp.private,
            new_identity: encode_identity(
                identity_schema.as_ref(),
                resp.new_identity.as_ref(),
                "New Identity",
            )?,
        })
    }

    /// Plan a change.
    ///
    /// When the proposed state differs from the prior state, computed
    /// attributes that are null in configuration are planned as unknown
    /// before the resource sees the plan.
    #[instrument(skip_all, name = "rpc.plan_resource_change", fields(type_name = %req.type_name))]
    pub async fn plan_resource_change(
        &self,
        req: generated::plan_resource_change::Request,
    ) -> generated::plan_resource_change::Response {
        debug!("PlanResourceChange called");
        finish(
            "PlanResourceChange",
            self.try_plan_resource_change(req).await,
        )
    }

    async fn try_plan_resource_change(
        &self,
        req: generated::plan_resource_change::Request,
    ) -> Result<generated::plan_resource_change::Response, Halt> {
        let resource = self.registry.resource(&req.type_name)?;
        let schema = resource_schema(resource.as_ref()).await?;
        let identity_schema = resource_identity_schema(resource.as_ref()).await?;
        let prior_state = decode(schema.as_ref(), req.prior_state.as_ref(), "Prior State")?;
        let proposed_new_state = decode(
            schema.as_ref(),
            req.proposed_new_state.as_ref(),
            "Proposed New State",
        )?;
        let config = decode(schema.as_ref(), req.config.as_ref(), "Config")?;
        let prior_identity = decode_identity(
            identity_schema.as_ref(),
            req.prior_identity.as_ref(),
            "Prior Identity",
        )?;

        let planned_state = match schema.as_ref() {
            Some(schema)
                if !proposed_new_state.is_null() && !proposed_new_state.equal(&prior_state) =>
            {
                mark_computed_unknown(schema, &config, proposed_new_state.clone()).map_err(
                    |e| {
                        Halt::from(Diagnostic::from_error(
                            "Error Modifying Proposed New State",
                            &e,
                        ))
                    },
                )?
            }
            _ => proposed_new_state.clone(),
        };

        let mut resp = PlanChangeResponse {
            planned_state,
            requires_replace: Vec::new(),
            planned_private: req.prior_private.clone(),
            planned_identity: prior_identity.clone(),
            diagnostics: Vec::new(),
        };
        resource
            .plan_change(
                PlanChangeRequest {
                    config,
                    prior_state,
                    proposed_new_state,
                    prior_private: req.prior_private,
                    prior_identity,
                },
                &mut resp,
            )
            .await;
        check(&resp.diagnostics)?;

        Ok(generated::plan_resource_change::Response {
            planned_state: Some(encode(
                schema.as_ref(),
                &resp.planned_state,
                "Planned State",
            )?),
            requires_replace: resp
                .requires_replace
                .iter()
                .map(generated::AttributePath::from)
                .collect(),
            planned_private: resp.planned_private,
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
            planned_identity: encode_identity(
                identity_schema.as_ref(),
                resp.planned_identity.as_ref(),
                "Planned Identity",
            )?,
        })
    }

    /// Apply a planned change.
    ///
    /// A null prior state creates, a null planned state deletes, anything
    /// else updates.
    #[instrument(skip_all, name = "rpc.apply_resource_change", fields(type_name = %req.type_name))]
    pub async fn apply_resource_change(
        &self,
        req: generated::apply_resource_change::Request,
    ) -> generated::apply_resource_change::Response {
        debug!("ApplyResourceChange called");
        finish(
            "ApplyResourceChange",
            self.try_apply_resource_change(req).await,
        )
    }

    async fn try_apply_resource_change(
        &self,
        req: generated::apply_resource_change::Request,
    ) -> Result<generated::apply_resource_change::Response, Halt> {
        let resource = self.registry.resource(&req.type_name)?;
        let schema = resource_schema(resource.as_ref()).await?;
        let identity_schema = resource_identity_schema(resource.as_ref()).await?;
        let prior_state = decode(schema.as_ref(), req.prior_state.as_ref(), "Prior State")?;
        let planned_state = decode(schema.as_ref(), req.planned_state.as_ref(), "Planned State")?;
        let config = decode(schema.as_ref(), req.config.as_ref(), "Config")?;
        let planned_identity = decode_identity(
            identity_schema.as_ref(),
            req.planned_identity.as_ref(),
            "Planned Identity",
        )?;

        if prior_state.is_null() {
            debug!("prior state is null, creating");
            let mut resp = CreateResponse {
                new_state: config.clone(),
                new_identity: planned_identity.clone(),
                private: req.planned_private.clone(),
                diagnostics: Vec::new(),
            };
            resource
                .create(
                    CreateRequest {
                        config,
                        planned_state,
                        planned_private: req.planned_private,
                        planned_identity,
                    },
                    &mut resp,
                )
                .await;
            check(&resp.diagnostics)?;

            return Ok(generated::apply_resource_change::Response {
                new_state: Some(encode(schema.as_ref(), &resp.new_state, "New State")?),
                private: resp.private,
                diagnostics: diagnostics_to_proto(&resp.diagnostics),
                new_identity: encode_identity(
                    identity_schema.as_ref(),
                    resp.new_identity.as_ref(),
                    "New Identity",
                )?,
            });
        }

        if planned_state.is_null() {
            debug!("planned state is null, deleting");
            let mut resp = DeleteResponse::default();
            resource
                .delete(
                    DeleteRequest {
                        prior_state,
                        prior_identity: planned_identity,
                    },
                    &mut resp,
                )
                .await;
            check(&resp.diagnostics)?;

            return Ok(generated::apply_resource_change::Response {
                new_state: req.planned_state,
                private: req.planned_private,
                diagnostics: diagnostics_to_proto(&resp.diagnostics),
                new_identity: None,
            });
        }

        debug!("updating");
        let mut resp = UpdateResponse {
            new_state: planned_state.clone(),
            new_identity: planned_identity.clone(),
            private: req.planned_private.clone(),
            diagnostics: Vec::new(),
        };
        resource
            .update(
                UpdateRequest {
                    config,
                    planned_state,
                    prior_state,
                    planned_private: req.planned_private,
                    planned_identity,
                },
                &mut resp,
            )
            .await;
        check(&resp.diagnostics)?;

        Ok(generated::apply_resource_change::Response {
            new_state: Some(encode(schema.as_ref(), &resp.new_state, "New State")?),
            private: resp.private,
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
            new_identity: encode_identity(
                identity_schema.as_ref(),
                resp.new_identity.as_ref(),
                "New Identity",
            )?,
        })
    }

    /// Import an existing resource.
    ///
    /// A null imported state yields no records; otherwise exactly one record
    /// tagged with the requested type name.
    #[instrument(skip_all, name = "rpc.import_resource_state", fields(type_name = %req.type_name))]
    pub async fn import_resource_state(
        &self,
        req: generated::import_resource_state::Request,
    ) -> generated::import_resource_state::Response {
        debug!(id = %req.id, "ImportResourceState called");
        finish(
            "ImportResourceState",
            self.try_import_resource_state(req).await,
        )
    }

    async fn try_import_resource_state(
        &self,
        req: generated::import_resource_state::Request,
    ) -> Result<generated::import_resource_state::Response, Halt> {
        let resource = self.registry.resource(&req.type_name)?;
        let schema = resource_schema(resource.as_ref()).await?;
        let identity_schema = resource_identity_schema(resource.as_ref()).await?;
        let identity = decode_identity(identity_schema.as_ref(), req.identity.as_ref(), "Identity")?;
        let state = decode(schema.as_ref(), None, "Imported State")?;

        let mut resp = ImportStateResponse {
            state,
            identity: identity.clone(),
            private: Vec::new(),
            diagnostics: Vec::new(),
        };
        resource
            .import_state(
                ImportStateRequest {
                    id: req.id,
                    identity,
                },
                &mut resp,
            )
            .await;
        check(&resp.diagnostics)?;

        if resp.state.is_null() {
            debug!("imported state is null, nothing imported");
            return Ok(generated::import_resource_state::Response {
                imported_resources: Vec::new(),
                diagnostics: diagnostics_to_proto(&resp.diagnostics),
            });
        }

        let imported = generated::import_resource_state::ImportedResource {
            type_name: req.type_name,
            state: Some(encode(schema.as_ref(), &resp.state, "Imported State")?),
            private: resp.private,
            identity: encode_identity(
                identity_schema.as_ref(),
                resp.identity.as_ref(),
                "Imported Identity",
            )?,
        };
        Ok(generated::import_resource_state::Response {
            imported_resources: vec![imported],
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
        })
    }

    // =========================================================================
    // Data sources
    // =========================================================================

    /// Validate a data source configuration.
    #[instrument(skip_all, name = "rpc.validate_data_resource_config", fields(type_name = %req.type_name))]
    pub async fn validate_data_resource_config(
        &self,
        req: generated::validate_data_resource_config::Request,
    ) -> generated::validate_data_resource_config::Response {
        debug!("ValidateDataResourceConfig called");
        finish(
            "ValidateDataResourceConfig",
            self.try_validate_data_resource_config(req).await,
        )
    }

    async fn try_validate_data_resource_config(
        &self,
        req: generated::validate_data_resource_config::Request,
    ) -> Result<generated::validate_data_resource_config::Response, Halt> {
        let data_source = self.registry.data_source(&req.type_name)?;
        let schema = data_source_schema(data_source.as_ref()).await?;
        let config = decode(schema.as_ref(), req.config.as_ref(), "Config")?;

        let mut resp = ValidateConfigResponse::default();
        data_source
            .validate_config(ValidateConfigRequest { config }, &mut resp)
            .await;

        Ok(generated::validate_data_resource_config::Response {
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
        })
    }

    /// Read a data source. The state defaults to the configuration.
    #[instrument(skip_all, name = "rpc.read_data_source", fields(type_name = %req.type_name))]
    pub async fn read_data_source(
        &self,
        req: generated::read_data_source::Request,
    ) -> generated::read_data_source::Response {
        debug!("ReadDataSource called");
        finish("ReadDataSource", self.try_read_data_source(req).await)
    }

    async fn try_read_data_source(
        &self,
        req: generated::read_data_source::Request,
    ) -> Result<generated::read_data_source::Response, Halt> {
        let data_source = self.registry.data_source(&req.type_name)?;
        let schema = data_source_schema(data_source.as_ref()).await?;
        let config = decode(schema.as_ref(), req.config.as_ref(), "Config")?;

        let mut resp = ReadDataSourceResponse {
            state: config.clone(),
            diagnostics: Vec::new(),
        };
        data_source
            .read(ReadDataSourceRequest { config }, &mut resp)
            .await;
        check(&resp.diagnostics)?;

        Ok(generated::read_data_source::Response {
            state: Some(encode(schema.as_ref(), &resp.state, "State")?),
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
        })
    }

    // =========================================================================
    // List resources
    // =========================================================================

    /// Validate a list configuration.
    #[instrument(skip_all, name = "rpc.validate_list_resource_config", fields(type_name = %req.type_name))]
    pub async fn validate_list_resource_config(
        &self,
        req: generated::validate_list_resource_config::Request,
    ) -> generated::validate_list_resource_config::Response {
        debug!("ValidateListResourceConfig called");
        finish(
            "ValidateListResourceConfig",
            self.try_validate_list_resource_config(req).await,
        )
    }

    async fn try_validate_list_resource_config(
        &self,
        req: generated::validate_list_resource_config::Request,
    ) -> Result<generated::validate_list_resource_config::Response, Halt> {
        let list_resource = self.registry.list_resource(&req.type_name)?;
        let schema = list_resource_schema(list_resource.as_ref()).await?;
        let config = decode(schema.as_ref(), req.config.as_ref(), "Config")?;

        let mut resp = ValidateConfigResponse::default();
        list_resource
            .validate_list_config(
                ValidateListConfigRequest {
                    config,
                    include_resource_object: req.include_resource_object,
                    limit: req.limit,
                },
                &mut resp,
            )
            .await;

        Ok(generated::validate_list_resource_config::Response {
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
        })
    }

    /// List resources, emitting one event per result.
    ///
    /// `emit` returns `false` to stop the listing. A positive `limit` caps
    /// the number of results. A failure before or during the listing is
    /// emitted as a single event carrying only diagnostics, after which no
    /// more events follow.
    #[instrument(skip_all, name = "rpc.list_resource", fields(type_name = %req.type_name))]
    pub async fn list_resource<F>(&self, req: generated::list_resource::Request, mut emit: F)
    where
        F: FnMut(generated::list_resource::Event) -> bool + Send,
    {
        debug!(
            limit = req.limit,
            include_resource_object = req.include_resource_object,
            "ListResource called"
        );
        match self.try_list_resource(req, &mut emit).await {
            Ok(results) => info!(results, "ListResource completed"),
            Err(Halt(diagnostics)) => {
                warn!(
                    diagnostics = diagnostics.len(),
                    "ListResource completed with errors"
                );
                emit(generated::list_resource::Event {
                    diagnostic: diagnostics_to_proto(&diagnostics),
                    ..Default::default()
                });
            }
        }
    }

    /// List resources and collect every event.
    pub async fn list_resource_events(
        &self,
        req: generated::list_resource::Request,
    ) -> Vec<generated::list_resource::Event> {
        let mut events = Vec::new();
        self.list_resource(req, |event| {
            events.push(event);
            true
        })
        .await;
        events
    }

    async fn try_list_resource<F>(
        &self,
        req: generated::list_resource::Request,
        emit: &mut F,
    ) -> Result<usize, Halt>
    where
        F: FnMut(generated::list_resource::Event) -> bool + Send,
    {
        let list_resource = self.registry.list_resource(&req.type_name)?;
        let resource = self.registry.resource(&req.type_name)?;
        let list_schema = list_resource_schema(list_resource.as_ref()).await?;
        let schema = resource_schema(resource.as_ref()).await?;
        let identity_schema = resource_identity_schema(resource.as_ref()).await?;
        let config = decode(list_schema.as_ref(), req.config.as_ref(), "Config")?;

        let include_resource_object = req.include_resource_object;
        let limit = req.limit;
        let mut results = 0usize;
        let mut failure: Option<Vec<Diagnostic>> = None;
        let mut done = false;

        let mut push = |result: ListResult| -> bool {
            if done {
                return false;
            }
            match list_event(
                result,
                include_resource_object,
                schema.as_ref(),
                identity_schema.as_ref(),
            ) {
                Ok(event) => {
                    results += 1;
                    let more = emit(event);
                    done = !more || (limit > 0 && results as i64 >= limit);
                }
                Err(Halt(diagnostics)) => {
                    failure = Some(diagnostics);
                    done = true;
                }
            }
            !done
        };
        list_resource
            .list(
                ListRequest {
                    config,
                    include_resource_object,
                    limit,
                },
                &mut push,
            )
            .await;

        match failure {
            Some(diagnostics) => Err(Halt(diagnostics)),
            None => Ok(results),
        }
    }

    // =========================================================================
    // State stores
    // =========================================================================

    /// Validate a state store configuration.
    #[instrument(skip_all, name = "rpc.validate_state_store_config", fields(type_name = %req.type_name))]
    pub async fn validate_state_store_config(
        &self,
        req: generated::validate_state_store_config::Request,
    ) -> generated::validate_state_store_config::Response {
        debug!("ValidateStateStoreConfig called");
        finish(
            "ValidateStateStoreConfig",
            self.try_validate_state_store_config(req).await,
        )
    }

    async fn try_validate_state_store_config(
        &self,
        req: generated::validate_state_store_config::Request,
    ) -> Result<generated::validate_state_store_config::Response, Halt> {
        let state_store = self.registry.state_store(&req.type_name)?;
        let schema = state_store_schema(state_store.as_ref()).await?;
        let config = decode(schema.as_ref(), req.config.as_ref(), "Config")?;

        let mut resp = ValidateConfigResponse::default();
        state_store
            .validate_config(ValidateConfigRequest { config }, &mut resp)
            .await;

        Ok(generated::validate_state_store_config::Response {
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
        })
    }

    /// Configure a state store and negotiate the chunk size.
    #[instrument(skip_all, name = "rpc.configure_state_store", fields(type_name = %req.type_name))]
    pub async fn configure_state_store(
        &self,
        req: generated::configure_state_store::Request,
    ) -> generated::configure_state_store::Response {
        debug!("ConfigureStateStore called");
        finish(
            "ConfigureStateStore",
            self.try_configure_state_store(req).await,
        )
    }

    async fn try_configure_state_store(
        &self,
        req: generated::configure_state_store::Request,
    ) -> Result<generated::configure_state_store::Response, Halt> {
        let state_store = self.registry.state_store(&req.type_name)?;
        let schema = state_store_schema(state_store.as_ref()).await?;
        let config = decode(schema.as_ref(), req.config.as_ref(), "Config")?;
        let client_chunk_size = req.capabilities.map(|c| c.chunk_size).unwrap_or_default();

        let mut resp = ConfigureStateStoreResponse {
            chunk_size: if client_chunk_size > 0 {
                client_chunk_size
            } else {
                self.options.chunk_size()
            },
            diagnostics: Vec::new(),
        };
        state_store
            .configure(
                ConfigureStateStoreRequest {
                    config,
                    chunk_size: client_chunk_size,
                },
                &mut resp,
            )
            .await;
        check(&resp.diagnostics)?;
        debug!(chunk_size = resp.chunk_size, "negotiated state chunk size");

        Ok(generated::configure_state_store::Response {
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
            capabilities: Some(generated::StateStoreCapabilities {
                chunk_size: resp.chunk_size,
            }),
        })
    }

    /// List the states held by a store.
    #[instrument(skip_all, name = "rpc.get_states", fields(type_name = %req.type_name))]
    pub async fn get_states(
        &self,
        req: generated::get_states::Request,
    ) -> generated::get_states::Response {
        debug!("GetStates called");
        finish("GetStates", self.try_get_states(req).await)
    }

    async fn try_get_states(
        &self,
        req: generated::get_states::Request,
    ) -> Result<generated::get_states::Response, Halt> {
        let state_store = self.registry.state_store(&req.type_name)?;
        let mut resp = GetStatesResponse::default();
        state_store.get_states(&mut resp).await;
        check(&resp.diagnostics)?;

        Ok(generated::get_states::Response {
            state_id: resp.state_ids,
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
        })
    }

    /// Delete a state from a store.
    #[instrument(skip_all, name = "rpc.delete_state", fields(type_name = %req.type_name))]
    pub async fn delete_state(
        &self,
        req: generated::delete_state::Request,
    ) -> generated::delete_state::Response {
        debug!(state_id = %req.state_id, "DeleteState called");
        finish("DeleteState", self.try_delete_state(req).await)
    }

    async fn try_delete_state(
        &self,
        req: generated::delete_state::Request,
    ) -> Result<generated::delete_state::Response, Halt> {
        let state_store = self.registry.state_store(&req.type_name)?;
        let mut resp = StateStoreResponse::default();
        state_store
            .delete_state(
                DeleteStateRequest {
                    state_id: req.state_id,
                },
                &mut resp,
            )
            .await;

        Ok(generated::delete_state::Response {
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
        })
    }

    /// Lock a state.
    #[instrument(skip_all, name = "rpc.lock_state", fields(type_name = %req.type_name))]
    pub async fn lock_state(
        &self,
        req: generated::lock_state::Request,
    ) -> generated::lock_state::Response {
        debug!(state_id = %req.state_id, operation = %req.operation, "LockState called");
        finish("LockState", self.try_lock_state(req).await)
    }

    async fn try_lock_state(
        &self,
        req: generated::lock_state::Request,
    ) -> Result<generated::lock_state::Response, Halt> {
        let state_store = self.registry.state_store(&req.type_name)?;
        let mut resp = LockStateResponse::default();
        state_store
            .lock_state(
                LockStateRequest {
                    state_id: req.state_id,
                    operation: req.operation,
                },
                &mut resp,
            )
            .await;
        check(&resp.diagnostics)?;

        Ok(generated::lock_state::Response {
            lock_id: resp.lock_id,
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
        })
    }

    /// Unlock a state.
    #[instrument(skip_all, name = "rpc.unlock_state", fields(type_name = %req.type_name))]
    pub async fn unlock_state(
        &self,
        req: generated::unlock_state::Request,
    ) -> generated::unlock_state::Response {
        debug!(state_id = %req.state_id, lock_id = %req.lock_id, "UnlockState called");
        finish("UnlockState", self.try_unlock_state(req).await)
    }

    async fn try_unlock_state(
        &self,
        req: generated::unlock_state::Request,
    ) -> Result<generated::unlock_state::Response, Halt> {
        let state_store = self.registry.state_store(&req.type_name)?;
        let mut resp = StateStoreResponse::default();
        state_store
            .unlock_state(
                UnlockStateRequest {
                    state_id: req.state_id,
                    lock_id: req.lock_id,
                },
                &mut resp,
            )
            .await;

        Ok(generated::unlock_state::Response {
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
        })
    }

    /// Read a state blob as a sequence of chunks.
    #[instrument(skip_all, name = "rpc.read_state_bytes", fields(type_name = %req.type_name))]
    pub async fn read_state_bytes(
        &self,
        req: generated::read_state_bytes::Request,
    ) -> Vec<generated::read_state_bytes::Response> {
        debug!(state_id = %req.state_id, "ReadStateBytes called");
        match self.try_read_state_bytes(req).await {
            Ok(chunks) => {
                info!(chunks = chunks.len(), "ReadStateBytes completed");
                chunks
            }
            Err(Halt(diagnostics)) => {
                warn!(
                    diagnostics = diagnostics.len(),
                    "ReadStateBytes completed with errors"
                );
                vec![generated::read_state_bytes::Response {
                    diagnostics: diagnostics_to_proto(&diagnostics),
                    ..Default::default()
                }]
            }
        }
    }

    async fn try_read_state_bytes(
        &self,
        req: generated::read_state_bytes::Request,
    ) -> Result<Vec<generated::read_state_bytes::Response>, Halt> {
        let state_store = self.registry.state_store(&req.type_name)?;
        let mut resp = ReadStateBytesResponse {
            bytes: Vec::new(),
            chunk_size: self.options.chunk_size(),
            diagnostics: Vec::new(),
        };
        state_store
            .read_state_bytes(
                ReadStateBytesRequest {
                    state_id: req.state_id,
                },
                &mut resp,
            )
            .await;
        check(&resp.diagnostics)?;

        let chunk_size = if resp.chunk_size > 0 {
            resp.chunk_size
        } else {
            self.options.chunk_size()
        };
        Ok(chunk_state(
            &resp.bytes,
            chunk_size,
            diagnostics_to_proto(&resp.diagnostics),
        ))
    }

    /// Reassemble an uploaded state blob and write it to a store.
    ///
    /// The first chunk must carry the metadata naming the store and state.
    /// Chunk ranges, when present, must be contiguous, and the reassembled
    /// length must match the declared total length.
    #[instrument(skip_all, name = "rpc.write_state_bytes")]
    pub async fn write_state_bytes(
        &self,
        chunks: Vec<generated::write_state_bytes::RequestChunk>,
    ) -> generated::write_state_bytes::Response {
        debug!(chunks = chunks.len(), "WriteStateBytes called");
        finish("WriteStateBytes", self.try_write_state_bytes(chunks).await)
    }

    async fn try_write_state_bytes(
        &self,
        chunks: Vec<generated::write_state_bytes::RequestChunk>,
    ) -> Result<generated::write_state_bytes::Response, Halt> {
        let first = chunks.first().ok_or_else(|| {
            Diagnostic::error("Missing State Chunk Metadata")
                .with_detail("A state upload must contain at least one chunk.")
        })?;
        let meta = first.meta.clone().ok_or_else(|| {
            Diagnostic::error("Missing State Chunk Metadata").with_detail(
                "The first chunk of a state upload must name the state store type and state id.",
            )
        })?;
        let declared_length = first.total_length;
        debug!(type_name = %meta.type_name, state_id = %meta.state_id, "state upload started");
        let state_store = self.registry.state_store(&meta.type_name)?;

        let mut bytes = Vec::new();
        for chunk in &chunks {
            if let Some(range) = chunk.range {
                if range.start != bytes.len() as i64 {
                    return Err(Diagnostic::error("Out of Order State Chunk")
                        .with_detail(format!(
                            "Expected a chunk starting at byte {}, got one starting at byte {}.",
                            bytes.len(),
                            range.start
                        ))
                        .into());
                }
            }
            bytes.extend_from_slice(&chunk.bytes);
        }
        if declared_length != bytes.len() as i64 {
            return Err(Diagnostic::error("Incomplete State Upload")
                .with_detail(format!(
                    "Declared {} bytes, received {}.",
                    declared_length,
                    bytes.len()
                ))
                .into());
        }

        let mut resp = StateStoreResponse::default();
        state_store
            .write_state_bytes(
                WriteStateBytesRequest {
                    state_id: meta.state_id,
                    bytes,
                },
                &mut resp,
            )
            .await;

        Ok(generated::write_state_bytes::Response {
            diagnostics: diagnostics_to_proto(&resp.diagnostics),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Block, NestedBlock};
    use crate::types::Type;

    #[test]
    fn test_server_options() {
        let options = ServerOptions::default();
        assert_eq!(options.state_chunk_size, 8 * 1024 * 1024);
        assert!(!options.get_provider_schema_optional);

        let options = ServerOptions::new()
            .with_state_chunk_size(0)
            .with_get_provider_schema_optional(true);
        assert_eq!(options.chunk_size(), DEFAULT_STATE_CHUNK_SIZE);
        assert!(options.get_provider_schema_optional);
    }

    #[test]
    fn test_chunk_state() {
        let chunks = chunk_state(b"abcdefg", 3, vec![]);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].bytes, b"abc".to_vec());
        assert_eq!(chunks[2].bytes, b"g".to_vec());
        assert_eq!(chunks[2].range, Some(generated::StateRange { start: 6, end: 7 }));
        assert!(chunks.iter().all(|c| c.total_length == 7));

        let empty = chunk_state(b"", 3, vec![]);
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].total_length, 0);
    }

    #[test]
    fn test_mark_computed_unknown() {
        let schema = Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("zone", Attribute::optional_computed(Type::String))
            .with_block(
                "rule",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("port", Attribute::required_number())
                        .with_attribute("rule_id", Attribute::computed_string()),
                ),
            );
        let rule_type = Type::object([("port", Type::Number), ("rule_id", Type::String)]);
        let rule = |port: i64| {
            Value::object([
                ("port", Value::number(port)),
                ("rule_id", Value::null(Type::String)),
            ])
        };
        let config = Value::object([
            ("name", Value::string("web")),
            ("id", Value::null(Type::String)),
            ("zone", Value::string("a")),
            ("rule", Value::list(rule_type.clone(), [rule(80)]).unwrap()),
        ]);
        let proposed = Value::object([
            ("name", Value::string("web")),
            ("id", Value::null(Type::String)),
            ("zone", Value::string("a")),
            ("rule", Value::list(rule_type, [rule(80), rule(443)]).unwrap()),
        ]);

        let planned = mark_computed_unknown(&schema, &config, proposed).unwrap();
        assert!(planned.get_attribute("id").unwrap().is_unknown());
        assert_eq!(planned.get_attribute("zone").unwrap().as_str(), Some("a"));
        assert_eq!(planned.get_attribute("name").unwrap().as_str(), Some("web"));

        let rules = planned.get_attribute("rule").unwrap().elements().unwrap();
        assert!(rules[0].get_attribute("rule_id").unwrap().is_unknown());
        // index 1 is absent from config
        assert!(rules[1].get_attribute("rule_id").unwrap().is_null());
        assert!(rules[1].get_attribute("port").unwrap().is_known());
    }

    #[test]
    fn test_mark_computed_unknown_keeps_set_block_values() {
        let schema = Schema::v0().with_block(
            "rule",
            NestedBlock::set(
                Block::new()
                    .with_attribute("zone", Attribute::optional_computed(Type::String))
                    .with_attribute("rule_id", Attribute::computed_string()),
            ),
        );
        let rule_type = Type::object([("zone", Type::String), ("rule_id", Type::String)]);
        let rule = |rule_id: Value| {
            Value::object([("zone", Value::string("a")), ("rule_id", rule_id)])
        };
        let config = Value::object([(
            "rule",
            Value::set(rule_type.clone(), [rule(Value::null(Type::String))]).unwrap(),
        )]);
        let proposed = Value::object([(
            "rule",
            Value::set(rule_type, [rule(Value::string("r-1"))]).unwrap(),
        )]);

        let planned = mark_computed_unknown(&schema, &config, proposed.clone()).unwrap();
        assert_eq!(planned, proposed);
    }

    #[test]
    fn test_mark_computed_unknown_under_null_block() {
        let schema = Schema::v0().with_block(
            "rule",
            NestedBlock::list(Block::new().with_attribute("rule_id", Attribute::computed_string())),
        );
        let rule_type = Type::object([("rule_id", Type::String)]);
        let config = Value::object([("rule", Value::null(Type::list(rule_type.clone())))]);
        let proposed = Value::object([(
            "rule",
            Value::list(
                rule_type,
                [Value::object([("rule_id", Value::string("r-1"))])],
            )
            .unwrap(),
        )]);

        let planned = mark_computed_unknown(&schema, &config, proposed).unwrap();
        let rules = planned.get_attribute("rule").unwrap().elements().unwrap();
        assert!(rules[0].get_attribute("rule_id").unwrap().is_unknown());
    }
}
