//! The provider capability and the request/response types shared by every
//! capability.
//!
//! Handlers receive a request by value and a response the dispatcher has
//! already filled with sensible defaults. A handler that does nothing leaves
//! that default in place, so every method except `schema` has a no-op
//! default body.

use async_trait::async_trait;

use crate::diagnostic::Diagnostic;
use crate::schema::Schema;
use crate::value::Value;

/// Response of a `schema` sub-call.
///
/// Any diagnostic reported here, warnings included, aborts the operation
/// that asked for the schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaResponse {
    /// The schema, if the implementation has one.
    pub schema: Option<Schema>,
    /// Diagnostics raised while producing the schema.
    pub diagnostics: Vec<Diagnostic>,
}

/// Request to validate a configuration.
#[derive(Debug, Clone)]
pub struct ValidateConfigRequest {
    /// The configuration, decoded against the implementation's schema.
    pub config: Value,
}

/// Response to a configuration validation.
#[derive(Debug, Clone, Default)]
pub struct ValidateConfigResponse {
    /// Validation diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Request to configure the provider.
#[derive(Debug, Clone)]
pub struct ConfigureRequest {
    /// Version string of the calling client.
    pub client_version: String,
    /// The provider configuration.
    pub config: Value,
}

/// Response to provider configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigureResponse {
    /// Configuration diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Response to a stop request.
#[derive(Debug, Clone, Default)]
pub struct StopResponse {
    /// Set when the provider failed to stop cleanly.
    pub error: Option<String>,
}

/// Provider-level capability.
///
/// # Example
///
/// ```ignore
/// use hemmer_provider_testkit::provider::{Provider, SchemaResponse};
/// use hemmer_provider_testkit::schema::{Attribute, Schema};
///
/// struct MyProvider;
///
/// #[async_trait::async_trait]
/// impl Provider for MyProvider {
///     async fn schema(&self, resp: &mut SchemaResponse) {
///         resp.schema = Some(Schema::v0().with_attribute("region", Attribute::optional_string()));
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Report the provider configuration schema. `None` is served as an
    /// empty schema.
    async fn schema(&self, resp: &mut SchemaResponse);

    /// Validate the provider configuration.
    async fn validate_config(&self, _req: ValidateConfigRequest, _resp: &mut ValidateConfigResponse) {}

    /// Configure the provider.
    async fn configure(&self, _req: ConfigureRequest, _resp: &mut ConfigureResponse) {}

    /// Stop the provider.
    async fn stop(&self, _resp: &mut StopResponse) {}
}
