//! Per-scope interop state.
//!
//! A `Scope` pairs the process-global class registry and structural
//! metadata cache with scope-local policy: name remapping, the class
//! access gate, enhanced access to non-public members, custom type
//! wrappers, and the message catalog. Member tables and scripted-object
//! adapters are cached per scope because policy shapes both.

use std::sync::Arc;

use dashmap::DashMap;

use stoat_object::{Catalog, MessageId, ObjectRef, ScriptError, ScriptResult, Value};

use crate::coerce::ScriptedAdapter;
use crate::host::{
    ClassAccessFilter, ClassId, HostClassRegistry, HostInstance, HostValue, IdentityRemapper,
    NameRemapper, TypeWrapperRegistry,
};
use crate::metadata::{ClassMembers, MetadataCache, build_members};
use crate::wrap;

/// Scope-local interop state and caches.
pub struct Scope {
    host: Arc<HostClassRegistry>,
    metadata: Arc<MetadataCache>,
    remapper: Arc<dyn NameRemapper>,
    wrappers: TypeWrapperRegistry,
    members: DashMap<ClassId, Arc<ClassMembers>>,
    adapters: DashMap<(usize, ClassId), HostInstance>,
    access: Option<Arc<dyn ClassAccessFilter>>,
    enhanced_access: bool,
    catalog: Catalog,
}

impl Scope {
    /// A scope with default policy over a registry.
    pub fn new(host: Arc<HostClassRegistry>) -> Arc<Self> {
        Self::builder(host).build()
    }

    /// Start configuring a scope.
    pub fn builder(host: Arc<HostClassRegistry>) -> ScopeBuilder {
        ScopeBuilder {
            host,
            metadata: None,
            remapper: None,
            access: None,
            enhanced_access: false,
            catalog: None,
        }
    }

    /// The host class registry.
    pub fn host(&self) -> &HostClassRegistry {
        &self.host
    }

    /// The custom type-wrapper registry of this scope.
    pub fn wrappers(&self) -> &TypeWrapperRegistry {
        &self.wrappers
    }

    /// The message catalog used to format errors for this scope.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Whether non-public members and host failure details are exposed.
    pub fn enhanced_access(&self) -> bool {
        self.enhanced_access
    }

    /// The member tables of a class under this scope's policy.
    ///
    /// Unknown ids and classes rejected by the access filter resolve to
    /// the shared empty table, so their instances carry no members.
    pub fn members_of(&self, class: ClassId) -> Arc<ClassMembers> {
        if let Some(members) = self.members.get(&class) {
            return members.clone();
        }
        let Some(info) = self.metadata.info(&self.host, class) else {
            return ClassMembers::empty();
        };
        if !self.class_visible(&info.name) {
            return ClassMembers::empty();
        }
        tracing::debug!(class = %info.name, "building member tables");
        let members = build_members(&info, self.remapper.as_ref(), self.enhanced_access);
        self.members.insert(class, members.clone());
        members
    }

    /// Look up a class by name and wrap it as a class object.
    ///
    /// Unregistered names and names rejected by the access filter raise
    /// the same error, so scripts cannot probe for filtered classes.
    pub fn lookup_class(self: &Arc<Self>, name: &str) -> ScriptResult<Value> {
        if !self.class_visible(name) {
            return Err(ScriptError::eval_error(
                MessageId::ClassNotVisible,
                [name.to_string()],
            ));
        }
        match self.host.find(name) {
            Some(class) => Ok(wrap::class_value(self, class)),
            None => Err(ScriptError::eval_error(
                MessageId::ClassNotVisible,
                [name.to_string()],
            )),
        }
    }

    fn class_visible(&self, name: &str) -> bool {
        self.access.as_ref().is_none_or(|filter| filter.visible(name))
    }

    /// Box a host value into its dynamic representation under this scope.
    pub fn wrap_host(self: &Arc<Self>, value: HostValue) -> Value {
        wrap::wrap_host(self, value)
    }

    /// The adapter instance implementing `interface` from a scripted
    /// object, created once per (object, interface) pair so host-side
    /// identity comparisons hold.
    pub fn adapter_for(self: &Arc<Self>, object: &ObjectRef, interface: ClassId) -> HostInstance {
        let key = (Arc::as_ptr(object) as *const () as usize, interface);
        if let Some(adapter) = self.adapters.get(&key) {
            return adapter.clone();
        }
        let adapter = HostInstance::new(
            interface,
            ScriptedAdapter::new(interface, object.clone(), self.clone()),
        );
        self.adapters.insert(key, adapter.clone());
        adapter
    }
}

/// Builder for [`Scope`].
pub struct ScopeBuilder {
    host: Arc<HostClassRegistry>,
    metadata: Option<Arc<MetadataCache>>,
    remapper: Option<Arc<dyn NameRemapper>>,
    access: Option<Arc<dyn ClassAccessFilter>>,
    enhanced_access: bool,
    catalog: Option<Catalog>,
}

impl ScopeBuilder {
    /// Share a structural metadata cache with other scopes.
    pub fn metadata(mut self, metadata: Arc<MetadataCache>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Install a member name remapper.
    pub fn remapper(mut self, remapper: Arc<dyn NameRemapper>) -> Self {
        self.remapper = Some(remapper);
        self
    }

    /// Install a class access filter.
    pub fn access_filter(mut self, filter: Arc<dyn ClassAccessFilter>) -> Self {
        self.access = Some(filter);
        self
    }

    /// Expose non-public members and host failure details.
    pub fn enhanced_access(mut self, enabled: bool) -> Self {
        self.enhanced_access = enabled;
        self
    }

    /// Use a localized message catalog.
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Finish the scope.
    pub fn build(self) -> Arc<Scope> {
        Arc::new(Scope {
            host: self.host,
            metadata: self.metadata.unwrap_or_default(),
            remapper: self.remapper.unwrap_or_else(|| Arc::new(IdentityRemapper)),
            wrappers: TypeWrapperRegistry::default(),
            members: DashMap::new(),
            adapters: DashMap::new(),
            access: self.access,
            enhanced_access: self.enhanced_access,
            catalog: self.catalog.unwrap_or_default(),
        })
    }
}
