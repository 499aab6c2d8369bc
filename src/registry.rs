//! Registry of capability implementations, keyed by type name.
//!
//! One registry stands for one provider. The dispatcher resolves every
//! request's type name here; an unregistered name becomes a single error
//! diagnostic instead of a failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::data_source::DataSource;
use crate::diagnostic::Diagnostic;
use crate::list_resource::ListResource;
use crate::provider::Provider;
use crate::resource::Resource;
use crate::state_store::StateStore;

/// Per-provider maps from type name to implementation.
///
/// # Example
///
/// ```ignore
/// use hemmer_provider_testkit::registry::Registry;
/// use hemmer_provider_testkit::testing::{ProviderDouble, ResourceDouble};
///
/// let registry = Registry::new(ProviderDouble::default())
///     .with_resource("example_thing", ResourceDouble::with_schema(schema));
/// ```
#[derive(Clone)]
pub struct Registry {
    provider: Arc<dyn Provider>,
    resources: BTreeMap<String, Arc<dyn Resource>>,
    data_sources: BTreeMap<String, Arc<dyn DataSource>>,
    list_resources: BTreeMap<String, Arc<dyn ListResource>>,
    state_stores: BTreeMap<String, Arc<dyn StateStore>>,
}

fn missing(kind: &str, type_name: &str) -> Diagnostic {
    Diagnostic::error(format!("Missing {} Type", kind)).with_detail(format!(
        "No {} named {:?} is registered with this provider.",
        kind, type_name
    ))
}

impl Registry {
    /// Create a registry for the given provider implementation.
    pub fn new(provider: impl Provider + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
            resources: BTreeMap::new(),
            data_sources: BTreeMap::new(),
            list_resources: BTreeMap::new(),
            state_stores: BTreeMap::new(),
        }
    }

    /// Register a managed resource.
    pub fn with_resource(
        mut self,
        type_name: impl Into<String>,
        resource: impl Resource + 'static,
    ) -> Self {
        self.resources.insert(type_name.into(), Arc::new(resource));
        self
    }

    /// Register a data source.
    pub fn with_data_source(
        mut self,
        type_name: impl Into<String>,
        data_source: impl DataSource + 'static,
    ) -> Self {
        self.data_sources
            .insert(type_name.into(), Arc::new(data_source));
        self
    }

    /// Register a list resource. Its identities and resource objects are
    /// typed by the managed resource registered under the same name.
    pub fn with_list_resource(
        mut self,
        type_name: impl Into<String>,
        list_resource: impl ListResource + 'static,
    ) -> Self {
        self.list_resources
            .insert(type_name.into(), Arc::new(list_resource));
        self
    }

    /// Register a state store.
    pub fn with_state_store(
        mut self,
        type_name: impl Into<String>,
        state_store: impl StateStore + 'static,
    ) -> Self {
        self.state_stores
            .insert(type_name.into(), Arc::new(state_store));
        self
    }

    /// The provider implementation.
    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Resolve a managed resource.
    pub fn resource(&self, type_name: &str) -> Result<&Arc<dyn Resource>, Diagnostic> {
        self.resources
            .get(type_name)
            .ok_or_else(|| missing("Resource", type_name))
    }

    /// Resolve a data source.
    pub fn data_source(&self, type_name: &str) -> Result<&Arc<dyn DataSource>, Diagnostic> {
        self.data_sources
            .get(type_name)
            .ok_or_else(|| missing("DataSource", type_name))
    }

    /// Resolve a list resource.
    pub fn list_resource(&self, type_name: &str) -> Result<&Arc<dyn ListResource>, Diagnostic> {
        self.list_resources
            .get(type_name)
            .ok_or_else(|| missing("ListResource", type_name))
    }

    /// Resolve a state store.
    pub fn state_store(&self, type_name: &str) -> Result<&Arc<dyn StateStore>, Diagnostic> {
        self.state_stores
            .get(type_name)
            .ok_or_else(|| missing("StateStore", type_name))
    }

    /// Registered resources in name order.
    pub fn resources(&self) -> impl Iterator<Item = (&str, &Arc<dyn Resource>)> {
        self.resources.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Registered data sources in name order.
    pub fn data_sources(&self) -> impl Iterator<Item = (&str, &Arc<dyn DataSource>)> {
        self.data_sources.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Registered list resources in name order.
    pub fn list_resources(&self) -> impl Iterator<Item = (&str, &Arc<dyn ListResource>)> {
        self.list_resources.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Registered state stores in name order.
    pub fn state_stores(&self) -> impl Iterator<Item = (&str, &Arc<dyn StateStore>)> {
        self.state_stores.iter().map(|(k, v)| (k.as_str(), v))
    }
}
