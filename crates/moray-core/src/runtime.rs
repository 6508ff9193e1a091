//! The runtime service
//!
//! [`Runtime`] bundles the class registry, the options and the host
//! collaborator. Everything that needs shared state takes a `&Runtime`, so
//! tests build a fresh one per case. Embedders that want a process-wide
//! instance install one with [`Runtime::install_global`].

use crate::bootstrap;
use crate::class::ClassRef;
use crate::descriptor::ClassDescriptor;
use crate::error::{RuntimeError, RuntimeResult};
use crate::host::{Host, HostHandle, NullHost};
use crate::introspect::ClassInfo;
use crate::object::Obj;
use crate::options::RuntimeOptions;
use crate::refcount::{self, Lifetime};
use crate::registry::ClassRegistry;
use crate::subclass;
use once_cell::race::OnceBox;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

static GLOBAL: OnceCell<Runtime> = OnceCell::new();

/// Object-model runtime
pub struct Runtime {
    options: RuntimeOptions,
    host: Arc<dyn Host>,
    registry: OnceBox<ClassRegistry>,
}

impl Runtime {
    /// Create a runtime with default options
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self::with_options(host, RuntimeOptions::default())
    }

    /// Create a runtime with custom options
    pub fn with_options(host: Arc<dyn Host>, options: RuntimeOptions) -> Self {
        Self {
            options,
            host,
            registry: OnceBox::new(),
        }
    }

    /// Runtime with no host language
    pub fn standalone() -> Self {
        Self::new(Arc::new(NullHost))
    }

    /// Install `runtime` as the process-wide instance.
    ///
    /// Only the first install succeeds; later ones get their runtime back.
    pub fn install_global(runtime: Runtime) -> Result<&'static Runtime, Runtime> {
        GLOBAL.try_insert(runtime).map_err(|(_, rejected)| rejected)
    }

    /// The process-wide instance, if one was installed
    pub fn global() -> Option<&'static Runtime> {
        GLOBAL.get()
    }

    /// Runtime options
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Host collaborator
    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    /// Class registry, created on first use.
    ///
    /// Concurrent first callers race to install it; losers drop their copy
    /// and use the winner's.
    pub fn registry(&self) -> &ClassRegistry {
        self.registry.get_or_init(|| {
            tracing::debug!(buckets = self.options.registry_buckets, "creating class registry");
            Box::new(ClassRegistry::with_buckets(self.options.registry_buckets))
        })
    }

    /// Bootstrap one parcel of class descriptors
    pub fn bootstrap(&self, descriptors: &[ClassDescriptor]) -> Vec<ClassRef> {
        bootstrap::bootstrap_parcel(self, descriptors)
    }

    /// Registered class, if any
    pub fn fetch_class(&self, name: &str) -> Option<ClassRef> {
        self.registry().fetch(name)
    }

    /// Registered class, or `UnknownClass`
    pub fn class(&self, name: &str) -> RuntimeResult<ClassRef> {
        self.fetch_class(name).ok_or_else(|| RuntimeError::UnknownClass {
            class: name.to_string(),
        })
    }

    /// Register a class under its name; `false` if the name is taken
    pub fn add_to_registry(&self, class: &ClassRef) -> bool {
        self.registry().insert_class(class)
    }

    /// Register a class under an extra name; `false` if the name is taken
    pub fn add_alias_to_registry(&self, class: &ClassRef, alias: &str) -> bool {
        self.registry().insert_alias(class, alias)
    }

    /// Fetch or create the class `name`, see [`subclass::singleton`]
    pub fn singleton(&self, name: &str, parent: Option<&ClassRef>) -> RuntimeResult<ClassRef> {
        subclass::singleton(self, name, parent.cloned())
    }

    /// New instance of `class` with a native count of 1
    pub fn make_obj(&self, class: &ClassRef) -> Obj {
        Obj::new(class)
    }

    /// New instance of `class` whose lifetime the host object `handle` owns
    pub fn foster_obj(&self, class: &ClassRef, handle: HostHandle) -> RuntimeResult<Obj> {
        Obj::foster(self.host(), class, handle)
    }

    /// Take a reference
    pub fn retain<T: Lifetime + ?Sized>(&self, target: &T) {
        refcount::retain(self.host(), target)
    }

    /// Drop a reference, returning the remaining count
    pub fn release<T: Lifetime + ?Sized>(&self, target: &T) -> u32 {
        refcount::release(self.host(), target)
    }

    /// Current count
    pub fn refcount<T: Lifetime + ?Sized>(&self, target: &T) -> u32 {
        refcount::refcount(self.host(), target)
    }

    /// Hand `obj` to the host, see [`refcount::to_host`]
    pub fn to_host(&self, obj: &Obj) -> RuntimeResult<HostHandle> {
        refcount::to_host(self.host(), obj)
    }

    /// Object carried by a host handle
    pub fn from_host(&self, handle: HostHandle) -> RuntimeResult<Obj> {
        refcount::from_host(self.host(), handle)
    }

    /// Introspection snapshot of a registered class
    pub fn describe(&self, name: &str) -> Option<ClassInfo> {
        self.fetch_class(name)
            .map(|class| ClassInfo::from_class(&class))
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("options", &self.options)
            .field("registry", &self.registry.get())
            .finish()
    }
}
