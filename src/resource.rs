//! The managed resource capability.
//!
//! The dispatcher decides which lifecycle handler to call from the
//! nullability of the apply request: a null prior state means create, a null
//! planned state means delete, anything else is an update. Handlers never see
//! wire bytes, only values decoded against the resource schema.

use async_trait::async_trait;

use crate::codec::RawState;
use crate::diagnostic::Diagnostic;
use crate::path::AttributePath;
use crate::provider::{SchemaResponse, ValidateConfigRequest, ValidateConfigResponse};
use crate::schema::IdentitySchema;
use crate::value::Value;

/// Response of an identity schema sub-call.
#[derive(Debug, Clone, Default)]
pub struct IdentitySchemaResponse {
    /// The identity schema, if the resource has one.
    pub identity_schema: Option<IdentitySchema>,
    /// Diagnostics raised while producing the identity schema.
    pub diagnostics: Vec<Diagnostic>,
}

/// Create request: the prior state was null.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Resource configuration.
    pub config: Value,
    /// State planned for the new resource.
    pub planned_state: Value,
    /// Private bytes from the plan.
    pub planned_private: Vec<u8>,
    /// Identity planned for the new resource.
    pub planned_identity: Option<Value>,
}

/// Create response. `new_state` starts as a copy of the config and
/// `new_identity` as the planned identity.
#[derive(Debug, Clone)]
pub struct CreateResponse {
    /// State of the created resource.
    pub new_state: Value,
    /// Identity of the created resource.
    pub new_identity: Option<Value>,
    /// Private bytes to store with the state.
    pub private: Vec<u8>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Read request.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    /// The stored state.
    pub current_state: Value,
    /// Stored private bytes.
    pub private: Vec<u8>,
    /// The stored identity.
    pub current_identity: Option<Value>,
}

/// Read response. Starts as a copy of the request.
#[derive(Debug, Clone)]
pub struct ReadResponse {
    /// Refreshed state.
    pub new_state: Value,
    /// Refreshed identity.
    pub new_identity: Option<Value>,
    /// Private bytes.
    pub private: Vec<u8>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Update request: neither prior nor planned state was null.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    /// Resource configuration.
    pub config: Value,
    /// The planned state.
    pub planned_state: Value,
    /// The prior state.
    pub prior_state: Value,
    /// Private bytes from the plan.
    pub planned_private: Vec<u8>,
    /// The planned identity.
    pub planned_identity: Option<Value>,
}

/// Update response. `new_state` starts as a copy of the planned state.
#[derive(Debug, Clone)]
pub struct UpdateResponse {
    /// State after the update.
    pub new_state: Value,
    /// Identity after the update.
    pub new_identity: Option<Value>,
    /// Private bytes to store with the state.
    pub private: Vec<u8>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Delete request: the planned state was null.
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    /// State of the resource being deleted.
    pub prior_state: Value,
    /// Identity of the resource being deleted.
    pub prior_identity: Option<Value>,
}

/// Delete response.
#[derive(Debug, Clone, Default)]
pub struct DeleteResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Plan request.
#[derive(Debug, Clone)]
pub struct PlanChangeRequest {
    /// Resource configuration.
    pub config: Value,
    /// The prior state, null on create.
    pub prior_state: Value,
    /// The client's proposal, null on destroy.
    pub proposed_new_state: Value,
    /// Private bytes from the prior state.
    pub prior_private: Vec<u8>,
    /// The prior identity.
    pub prior_identity: Option<Value>,
}

/// Plan response.
///
/// `planned_state` starts as the proposed state with every computed
/// attribute that is null in configuration marked unknown.
#[derive(Debug, Clone)]
pub struct PlanChangeResponse {
    /// The planned state.
    pub planned_state: Value,
    /// Attributes whose change forces replacement.
    pub requires_replace: Vec<AttributePath>,
    /// Private bytes for apply.
    pub planned_private: Vec<u8>,
    /// The planned identity.
    pub planned_identity: Option<Value>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Import request.
#[derive(Debug, Clone)]
pub struct ImportStateRequest {
    /// Import id supplied by the user.
    pub id: String,
    /// Identity supplied by the user, when importing by identity.
    pub identity: Option<Value>,
}

/// Import response. A null `state` imports nothing.
#[derive(Debug, Clone)]
pub struct ImportStateResponse {
    /// Imported state.
    pub state: Value,
    /// Imported identity.
    pub identity: Option<Value>,
    /// Private bytes to store with the state.
    pub private: Vec<u8>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// State upgrade request.
#[derive(Debug, Clone)]
pub struct UpgradeStateRequest {
    /// Schema version the raw state was written with.
    pub version: i64,
    /// The stored state.
    pub raw_state: RawState,
}

/// State upgrade response. `upgraded_state` starts null.
#[derive(Debug, Clone)]
pub struct UpgradeStateResponse {
    /// State conforming to the current schema.
    pub upgraded_state: Value,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Managed resource capability.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Report the resource schema.
    async fn schema(&self, resp: &mut SchemaResponse);

    /// Report the identity schema. Resources without identity leave it `None`.
    async fn identity_schema(&self, _resp: &mut IdentitySchemaResponse) {}

    /// Validate resource configuration.
    async fn validate_config(&self, _req: ValidateConfigRequest, _resp: &mut ValidateConfigResponse) {}

    /// Create the resource.
    async fn create(&self, _req: CreateRequest, _resp: &mut CreateResponse) {}

    /// Refresh the resource state.
    async fn read(&self, _req: ReadRequest, _resp: &mut ReadResponse) {}

    /// Update the resource in place.
    async fn update(&self, _req: UpdateRequest, _resp: &mut UpdateResponse) {}

    /// Delete the resource.
    async fn delete(&self, _req: DeleteRequest, _resp: &mut DeleteResponse) {}

    /// Adjust the plan.
    async fn plan_change(&self, _req: PlanChangeRequest, _resp: &mut PlanChangeResponse) {}

    /// Import an existing resource.
    async fn import_state(&self, _req: ImportStateRequest, _resp: &mut ImportStateResponse) {}

    /// Upgrade state written by an older schema version.
    async fn upgrade_state(&self, _req: UpgradeStateRequest, _resp: &mut UpgradeStateResponse) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Schema};

    struct SchemaOnly;

    #[async_trait]
    impl Resource for SchemaOnly {
        async fn schema(&self, resp: &mut SchemaResponse) {
            resp.schema = Some(Schema::v0().with_attribute("name", Attribute::required_string()));
        }
    }

    #[tokio::test]
    async fn test_default_handlers_leave_responses_untouched() {
        let config = Value::object([("name", Value::string("web"))]);
        let mut resp = CreateResponse {
            new_state: config.clone(),
            new_identity: None,
            private: b"p".to_vec(),
            diagnostics: Vec::new(),
        };
        SchemaOnly
            .create(
                CreateRequest {
                    config: config.clone(),
                    planned_state: config.clone(),
                    planned_private: Vec::new(),
                    planned_identity: None,
                },
                &mut resp,
            )
            .await;
        assert_eq!(resp.new_state, config);
        assert_eq!(resp.private, b"p".to_vec());
        assert!(resp.diagnostics.is_empty());

        let mut identity = IdentitySchemaResponse::default();
        SchemaOnly.identity_schema(&mut identity).await;
        assert!(identity.identity_schema.is_none());

        let mut validate = ValidateConfigResponse::default();
        SchemaOnly
            .validate_config(ValidateConfigRequest { config }, &mut validate)
            .await;
        assert!(validate.diagnostics.is_empty());
    }
}
