//! The data source capability.

use async_trait::async_trait;

use crate::diagnostic::Diagnostic;
use crate::provider::{SchemaResponse, ValidateConfigRequest, ValidateConfigResponse};
use crate::value::Value;

/// Data source read request.
#[derive(Debug, Clone)]
pub struct ReadDataSourceRequest {
    /// Data source configuration.
    pub config: Value,
}

/// Data source read response. `state` starts as a copy of the config.
#[derive(Debug, Clone)]
pub struct ReadDataSourceResponse {
    /// The read state.
    pub state: Value,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Data source capability.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Report the data source schema.
    async fn schema(&self, resp: &mut SchemaResponse);

    /// Validate data source configuration.
    async fn validate_config(&self, _req: ValidateConfigRequest, _resp: &mut ValidateConfigResponse) {}

    /// Read the data source.
    async fn read(&self, _req: ReadDataSourceRequest, _resp: &mut ReadDataSourceResponse) {}
}
