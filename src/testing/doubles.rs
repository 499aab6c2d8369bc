use std::sync::Arc;

use async_trait::async_trait;

use super::{run, Behavior};
use crate::data_source::{DataSource, ReadDataSourceRequest, ReadDataSourceResponse};
use crate::list_resource::{
    ListRequest, ListResource, ListResult, ListSink, ValidateListConfigRequest,
};
use crate::provider::{
    ConfigureRequest, ConfigureResponse, Provider, SchemaResponse, StopResponse,
    ValidateConfigRequest, ValidateConfigResponse,
};
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

fn schema_behavior(schema: Schema) -> Option<Behavior<(), SchemaResponse>> {
    Some(Behavior::Respond(SchemaResponse {
        schema: Some(schema),
        diagnostics: Vec::new(),
    }))
}

// =========================================================================
// Provider
// =========================================================================

/// Stand-in for [`Provider`].
#[derive(Clone, Default)]
pub struct ProviderDouble {
    /// Schema sub-call. `None` serves an empty provider schema.
    pub schema: Option<Behavior<(), SchemaResponse>>,
    /// Configuration validation.
    pub validate_config: Option<Behavior<ValidateConfigRequest, ValidateConfigResponse>>,
    /// Provider configuration.
    pub configure: Option<Behavior<ConfigureRequest, ConfigureResponse>>,
    /// Stop.
    pub stop: Option<Behavior<(), StopResponse>>,
}

impl ProviderDouble {
    /// A provider double reporting `schema`.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema: schema_behavior(schema),
            ..Default::default()
        }
    }

    /// Set the configuration validation hook.
    pub fn on_validate_config(
        mut self,
        f: impl Fn(&ValidateConfigRequest, &mut ValidateConfigResponse) + Send + Sync + 'static,
    ) -> Self {
        self.validate_config = Some(Behavior::hook(f));
        self
    }

    /// Set the configure hook.
    pub fn on_configure(
        mut self,
        f: impl Fn(&ConfigureRequest, &mut ConfigureResponse) + Send + Sync + 'static,
    ) -> Self {
        self.configure = Some(Behavior::hook(f));
        self
    }

    /// Set the stop hook.
    pub fn on_stop(mut self, f: impl Fn(&(), &mut StopResponse) + Send + Sync + 'static) -> Self {
        self.stop = Some(Behavior::hook(f));
        self
    }
}

#[async_trait]
impl Provider for ProviderDouble {
    async fn schema(&self, resp: &mut SchemaResponse) {
        run(&self.schema, &(), resp);
    }

    async fn validate_config(&self, req: ValidateConfigRequest, resp: &mut ValidateConfigResponse) {
        run(&self.validate_config, &req, resp);
    }

    async fn configure(&self, req: ConfigureRequest, resp: &mut ConfigureResponse) {
        run(&self.configure, &req, resp);
    }

    async fn stop(&self, resp: &mut StopResponse) {
        run(&self.stop, &(), resp);
    }
}

// =========================================================================
// Managed resources
// =========================================================================

/// Stand-in for [`Resource`].
#[derive(Clone, Default)]
pub struct ResourceDouble {
    /// Schema sub-call.
    pub schema: Option<Behavior<(), SchemaResponse>>,
    /// Identity schema sub-call.
    pub identity_schema: Option<Behavior<(), IdentitySchemaResponse>>,
    /// Configuration validation.
    pub validate_config: Option<Behavior<ValidateConfigRequest, ValidateConfigResponse>>,
    /// Create.
    pub create: Option<Behavior<CreateRequest, CreateResponse>>,
    /// Read.
    pub read: Option<Behavior<ReadRequest, ReadResponse>>,
    /// Update.
    pub update: Option<Behavior<UpdateRequest, UpdateResponse>>,
    /// Delete.
    pub delete: Option<Behavior<DeleteRequest, DeleteResponse>>,
    /// Plan.
    pub plan_change: Option<Behavior<PlanChangeRequest, PlanChangeResponse>>,
    /// Import.
    pub import_state: Option<Behavior<ImportStateRequest, ImportStateResponse>>,
    /// State upgrade.
    pub upgrade_state: Option<Behavior<UpgradeStateRequest, UpgradeStateResponse>>,
}

impl ResourceDouble {
    /// A resource double reporting `schema`.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema: schema_behavior(schema),
            ..Default::default()
        }
    }

    /// Report `identity_schema` from the identity schema sub-call.
    pub fn with_identity_schema(mut self, identity_schema: IdentitySchema) -> Self {
        self.identity_schema = Some(Behavior::Respond(IdentitySchemaResponse {
            identity_schema: Some(identity_schema),
            diagnostics: Vec::new(),
        }));
        self
    }

    /// Set the configuration validation hook.
    pub fn on_validate_config(
        mut self,
        f: impl Fn(&ValidateConfigRequest, &mut ValidateConfigResponse) + Send + Sync + 'static,
    ) -> Self {
        self.validate_config = Some(Behavior::hook(f));
        self
    }

    /// Set the create hook.
    pub fn on_create(
        mut self,
        f: impl Fn(&CreateRequest, &mut CreateResponse) + Send + Sync + 'static,
    ) -> Self {
        self.create = Some(Behavior::hook(f));
        self
    }

    /// Set the read hook.
    pub fn on_read(
        mut self,
        f: impl Fn(&ReadRequest, &mut ReadResponse) + Send + Sync + 'static,
    ) -> Self {
        self.read = Some(Behavior::hook(f));
        self
    }

    /// Set the update hook.
    pub fn on_update(
        mut self,
        f: impl Fn(&UpdateRequest, &mut UpdateResponse) + Send + Sync + 'static,
    ) -> Self {
        self.update = Some(Behavior::hook(f));
        self
    }

    /// Set the delete hook.
    pub fn on_delete(
        mut self,
        f: impl Fn(&DeleteRequest, &mut DeleteResponse) + Send + Sync + 'static,
    ) -> Self {
        self.delete = Some(Behavior::hook(f));
        self
    }

    /// Set the plan hook.
    pub fn on_plan_change(
        mut self,
        f: impl Fn(&PlanChangeRequest, &mut PlanChangeResponse) + Send + Sync + 'static,
    ) -> Self {
        self.plan_change = Some(Behavior::hook(f));
        self
    }

    /// Set the import hook.
    pub fn on_import_state(
        mut self,
        f: impl Fn(&ImportStateRequest, &mut ImportStateResponse) + Send + Sync + 'static,
    ) -> Self {
        self.import_state = Some(Behavior::hook(f));
        self
    }

    /// Set the state upgrade hook.
    pub fn on_upgrade_state(
        mut self,
        f: impl Fn(&UpgradeStateRequest, &mut UpgradeStateResponse) + Send + Sync + 'static,
    ) -> Self {
        self.upgrade_state = Some(Behavior::hook(f));
        self
    }
}

#[async_trait]
impl Resource for ResourceDouble {
    async fn schema(&self, resp: &mut SchemaResponse) {
        run(&self.schema, &(), resp);
    }

    async fn identity_schema(&self, resp: &mut IdentitySchemaResponse) {
        run(&self.identity_schema, &(), resp);
    }

    async fn validate_config(&self, req: ValidateConfigRequest, resp: &mut ValidateConfigResponse) {
        run(&self.validate_config, &req, resp);
    }

    async fn create(&self, req: CreateRequest, resp: &mut CreateResponse) {
        run(&self.create, &req, resp);
    }

    async fn read(&self, req: ReadRequest, resp: &mut ReadResponse) {
        run(&self.read, &req, resp);
    }

    async fn update(&self, req: UpdateRequest, resp: &mut UpdateResponse) {
        run(&self.update, &req, resp);
    }

    async fn delete(&self, req: DeleteRequest, resp: &mut DeleteResponse) {
        run(&self.delete, &req, resp);
    }

    async fn plan_change(&self, req: PlanChangeRequest, resp: &mut PlanChangeResponse) {
        run(&self.plan_change, &req, resp);
    }

    async fn import_state(&self, req: ImportStateRequest, resp: &mut ImportStateResponse) {
        run(&self.import_state, &req, resp);
    }

    async fn upgrade_state(&self, req: UpgradeStateRequest, resp: &mut UpgradeStateResponse) {
        run(&self.upgrade_state, &req, resp);
    }
}

// =========================================================================
// Data sources
// =========================================================================

/// Stand-in for [`DataSource`].
#[derive(Clone, Default)]
pub struct DataSourceDouble {
    /// Schema sub-call.
    pub schema: Option<Behavior<(), SchemaResponse>>,
    /// Configuration validation.
    pub validate_config: Option<Behavior<ValidateConfigRequest, ValidateConfigResponse>>,
    /// Read.
    pub read: Option<Behavior<ReadDataSourceRequest, ReadDataSourceResponse>>,
}

impl DataSourceDouble {
    /// A data source double reporting `schema`.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema: schema_behavior(schema),
            ..Default::default()
        }
    }

    /// Set the configuration validation hook.
    pub fn on_validate_config(
        mut self,
        f: impl Fn(&ValidateConfigRequest, &mut ValidateConfigResponse) + Send + Sync + 'static,
    ) -> Self {
        self.validate_config = Some(Behavior::hook(f));
        self
    }

    /// Set the read hook.
    pub fn on_read(
        mut self,
        f: impl Fn(&ReadDataSourceRequest, &mut ReadDataSourceResponse) + Send + Sync + 'static,
    ) -> Self {
        self.read = Some(Behavior::hook(f));
        self
    }
}

#[async_trait]
impl DataSource for DataSourceDouble {
    async fn schema(&self, resp: &mut SchemaResponse) {
        run(&self.schema, &(), resp);
    }

    async fn validate_config(&self, req: ValidateConfigRequest, resp: &mut ValidateConfigResponse) {
        run(&self.validate_config, &req, resp);
    }

    async fn read(&self, req: ReadDataSourceRequest, resp: &mut ReadDataSourceResponse) {
        run(&self.read, &req, resp);
    }
}

// =========================================================================
// List resources
// =========================================================================

/// Push closure type of [`ListBehavior::Hook`].
pub type ListHookFn = dyn for<'a> Fn(&ListRequest, &mut ListSink<'a>) + Send + Sync;

/// How a [`ListResourceDouble`] produces results.
#[derive(Clone)]
pub enum ListBehavior {
    /// Push clones of these results in order.
    Results(Vec<ListResult>),
    /// Push results from a closure.
    Hook(Arc<ListHookFn>),
}

/// Stand-in for [`ListResource`].
#[derive(Clone, Default)]
pub struct ListResourceDouble {
    /// Schema sub-call.
    pub schema: Option<Behavior<(), SchemaResponse>>,
    /// List configuration validation.
    pub validate_list_config:
        Option<Behavior<ValidateListConfigRequest, ValidateConfigResponse>>,
    /// Listing.
    pub list: Option<ListBehavior>,
}

impl ListResourceDouble {
    /// A list resource double reporting `schema`.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema: schema_behavior(schema),
            ..Default::default()
        }
    }

    /// Push these results on every listing.
    pub fn with_results(mut self, results: Vec<ListResult>) -> Self {
        self.list = Some(ListBehavior::Results(results));
        self
    }

    /// Set the list configuration validation hook.
    pub fn on_validate_list_config(
        mut self,
        f: impl Fn(&ValidateListConfigRequest, &mut ValidateConfigResponse) + Send + Sync + 'static,
    ) -> Self {
        self.validate_list_config = Some(Behavior::hook(f));
        self
    }

    /// Set the listing hook.
    pub fn on_list(
        mut self,
        f: impl for<'a> Fn(&ListRequest, &mut ListSink<'a>) + Send + Sync + 'static,
    ) -> Self {
        self.list = Some(ListBehavior::Hook(Arc::new(f)));
        self
    }
}

#[async_trait]
impl ListResource for ListResourceDouble {
    async fn schema(&self, resp: &mut SchemaResponse) {
        run(&self.schema, &(), resp);
    }

    async fn validate_list_config(
        &self,
        req: ValidateListConfigRequest,
        resp: &mut ValidateConfigResponse,
    ) {
        run(&self.validate_list_config, &req, resp);
    }

    async fn list(&self, req: ListRequest, push: &mut ListSink<'_>) {
        match &self.list {
            Some(ListBehavior::Results(results)) => {
                for result in results {
                    if !push(result.clone()) {
                        break;
                    }
                }
            }
            Some(ListBehavior::Hook(f)) => f(&req, push),
            None => {}
        }
    }
}

// =========================================================================
// State stores
// =========================================================================

/// Stand-in for [`StateStore`].
#[derive(Clone, Default)]
pub struct StateStoreDouble {
    /// Schema sub-call.
    pub schema: Option<Behavior<(), SchemaResponse>>,
    /// Configuration validation.
    pub validate_config: Option<Behavior<ValidateConfigRequest, ValidateConfigResponse>>,
    /// Store configuration.
    pub configure: Option<Behavior<ConfigureStateStoreRequest, ConfigureStateStoreResponse>>,
    /// State listing.
    pub get_states: Option<Behavior<(), GetStatesResponse>>,
    /// State deletion.
    pub delete_state: Option<Behavior<DeleteStateRequest, StateStoreResponse>>,
    /// Locking.
    pub lock_state: Option<Behavior<LockStateRequest, LockStateResponse>>,
    /// Unlocking.
    pub unlock_state: Option<Behavior<UnlockStateRequest, StateStoreResponse>>,
    /// Blob reads.
    pub read_state_bytes: Option<Behavior<ReadStateBytesRequest, ReadStateBytesResponse>>,
    /// Blob writes.
    pub write_state_bytes: Option<Behavior<WriteStateBytesRequest, StateStoreResponse>>,
}

impl StateStoreDouble {
    /// A state store double reporting `schema`.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema: schema_behavior(schema),
            ..Default::default()
        }
    }

    /// Set the configuration validation hook.
    pub fn on_validate_config(
        mut self,
        f: impl Fn(&ValidateConfigRequest, &mut ValidateConfigResponse) + Send + Sync + 'static,
    ) -> Self {
        self.validate_config = Some(Behavior::hook(f));
        self
    }

    /// Set the configure hook.
    pub fn on_configure(
        mut self,
        f: impl Fn(&ConfigureStateStoreRequest, &mut ConfigureStateStoreResponse)
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.configure = Some(Behavior::hook(f));
        self
    }

    /// Set the state listing hook.
    pub fn on_get_states(
        mut self,
        f: impl Fn(&(), &mut GetStatesResponse) + Send + Sync + 'static,
    ) -> Self {
        self.get_states = Some(Behavior::hook(f));
        self
    }

    /// Set the deletion hook.
    pub fn on_delete_state(
        mut self,
        f: impl Fn(&DeleteStateRequest, &mut StateStoreResponse) + Send + Sync + 'static,
    ) -> Self {
        self.delete_state = Some(Behavior::hook(f));
        self
    }

    /// Set the lock hook.
    pub fn on_lock_state(
        mut self,
        f: impl Fn(&LockStateRequest, &mut LockStateResponse) + Send + Sync + 'static,
    ) -> Self {
        self.lock_state = Some(Behavior::hook(f));
        self
    }

    /// Set the unlock hook.
    pub fn on_unlock_state(
        mut self,
        f: impl Fn(&UnlockStateRequest, &mut StateStoreResponse) + Send + Sync + 'static,
    ) -> Self {
        self.unlock_state = Some(Behavior::hook(f));
        self
    }

    /// Set the blob read hook.
    pub fn on_read_state_bytes(
        mut self,
        f: impl Fn(&ReadStateBytesRequest, &mut ReadStateBytesResponse) + Send + Sync + 'static,
    ) -> Self {
        self.read_state_bytes = Some(Behavior::hook(f));
        self
    }

    /// Set the blob write hook.
    pub fn on_write_state_bytes(
        mut self,
        f: impl Fn(&WriteStateBytesRequest, &mut StateStoreResponse) + Send + Sync + 'static,
    ) -> Self {
        self.write_state_bytes = Some(Behavior::hook(f));
        self
    }
}

#[async_trait]
impl StateStore for StateStoreDouble {
    async fn schema(&self, resp: &mut SchemaResponse) {
        run(&self.schema, &(), resp);
    }

    async fn validate_config(&self, req: ValidateConfigRequest, resp: &mut ValidateConfigResponse) {
        run(&self.validate_config, &req, resp);
    }

    async fn configure(
        &self,
        req: ConfigureStateStoreRequest,
        resp: &mut ConfigureStateStoreResponse,
    ) {
        run(&self.configure, &req, resp);
    }

    async fn get_states(&self, resp: &mut GetStatesResponse) {
        run(&self.get_states, &(), resp);
    }

    async fn delete_state(&self, req: DeleteStateRequest, resp: &mut StateStoreResponse) {
        run(&self.delete_state, &req, resp);
    }

    async fn lock_state(&self, req: LockStateRequest, resp: &mut LockStateResponse) {
        run(&self.lock_state, &req, resp);
    }

    async fn unlock_state(&self, req: UnlockStateRequest, resp: &mut StateStoreResponse) {
        run(&self.unlock_state, &req, resp);
    }

    async fn read_state_bytes(&self, req: ReadStateBytesRequest, resp: &mut ReadStateBytesResponse) {
        run(&self.read_state_bytes, &req, resp);
    }

    async fn write_state_bytes(&self, req: WriteStateBytesRequest, resp: &mut StateStoreResponse) {
        run(&self.write_state_bytes, &req, resp);
    }
}
