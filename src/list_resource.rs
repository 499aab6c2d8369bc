//! The list resource capability.
//!
//! A list resource enumerates existing instances of the managed resource of
//! the same type name. Results are pushed one at a time into a sink; the sink
//! returns `false` once the caller wants no more, and the implementation must
//! stop pushing.

use async_trait::async_trait;

use crate::diagnostic::Diagnostic;
use crate::provider::{SchemaResponse, ValidateConfigResponse};
use crate::value::Value;

/// Request to validate list configuration.
#[derive(Debug, Clone)]
pub struct ValidateListConfigRequest {
    /// List configuration.
    pub config: Value,
    /// Whether full resource objects were requested.
    pub include_resource_object: bool,
    /// Maximum number of results, 0 for unlimited.
    pub limit: i64,
}

/// Request to list resources.
#[derive(Debug, Clone)]
pub struct ListRequest {
    /// List configuration.
    pub config: Value,
    /// Whether full resource objects were requested.
    pub include_resource_object: bool,
    /// Maximum number of results, 0 for unlimited.
    pub limit: i64,
}

/// One listed resource.
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    /// Identity of the resource, typed by the managed resource's identity
    /// schema.
    pub identity: Option<Value>,
    /// Human-readable name.
    pub display_name: String,
    /// Full resource object, typed by the managed resource's schema.
    pub resource_object: Option<Value>,
    /// Diagnostics for this result.
    pub diagnostics: Vec<Diagnostic>,
}

/// Sink receiving listed resources. Returns `false` to stop the listing.
pub type ListSink<'a> = dyn FnMut(ListResult) -> bool + Send + 'a;

/// List resource capability.
#[async_trait]
pub trait ListResource: Send + Sync {
    /// Report the list configuration schema.
    async fn schema(&self, resp: &mut SchemaResponse);

    /// Validate list configuration.
    async fn validate_list_config(
        &self,
        _req: ValidateListConfigRequest,
        _resp: &mut ValidateConfigResponse,
    ) {}

    /// Push results into `push` until done or until it returns `false`.
    async fn list(&self, _req: ListRequest, _push: &mut ListSink<'_>) {}
}
