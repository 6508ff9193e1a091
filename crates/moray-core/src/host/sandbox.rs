//! In-process reference host
//!
//! `SandboxHost` plays the part of a host language without embedding one:
//! host classes are declared up front with their parent and overridden
//! methods, host objects live in a handle table, and every collaborator call
//! is recorded so embedders and tests can observe the protocol.

use super::{Host, HostHandle};
use crate::class::ClassRef;
use crate::error::{HostError, RuntimeResult};
use crate::method::Method;
use crate::object::Obj;
use crate::refcount::Lifetime;
use crate::value::Value;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Host-side method implementation
pub type HostMethodFn = Arc<dyn Fn(&Obj, &[Value]) -> Result<Value, HostError> + Send + Sync>;

struct HostClass {
    parent: String,
    overrides: Vec<String>,
}

struct HostObject {
    obj: Option<Obj>,
    refcount: u32,
}

/// Reference host backed by in-memory tables
pub struct SandboxHost {
    classes: DashMap<String, HostClass>,
    methods: DashMap<(String, String), HostMethodFn>,
    objects: DashMap<u64, HostObject>,
    host_types: DashMap<u64, usize>,
    next_handle: AtomicU64,
    registrations: Mutex<Vec<(String, String)>>,
    failures: DashMap<&'static str, String>,
    hook_calls: AtomicUsize,
    adopted: AtomicUsize,
    defused: AtomicUsize,
    destroyed: AtomicUsize,
    lowercase_names: AtomicBool,
    host_type_skew: AtomicUsize,
}

impl SandboxHost {
    /// Create an empty host
    pub fn new() -> Self {
        Self {
            classes: DashMap::new(),
            methods: DashMap::new(),
            objects: DashMap::new(),
            host_types: DashMap::new(),
            next_handle: AtomicU64::new(1),
            registrations: Mutex::new(Vec::new()),
            failures: DashMap::new(),
            hook_calls: AtomicUsize::new(0),
            adopted: AtomicUsize::new(0),
            defused: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            lowercase_names: AtomicBool::new(false),
            host_type_skew: AtomicUsize::new(0),
        }
    }

    /// Name host methods by lowercasing (aliases still take precedence)
    pub fn with_lowercase_names(self) -> Self {
        self.lowercase_names.store(true, Ordering::Relaxed);
        self
    }

    /// Declare a host class
    pub fn declare_class(&self, name: &str, parent: &str) {
        self.classes.insert(
            name.to_string(),
            HostClass {
                parent: parent.to_string(),
                overrides: Vec::new(),
            },
        );
    }

    /// Implement `method` in the host class `class`
    pub fn override_method<F>(&self, class: &str, method: &str, func: F)
    where
        F: Fn(&Obj, &[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        if let Some(mut declared) = self.classes.get_mut(class) {
            if !declared.overrides.iter().any(|name| name == method) {
                declared.overrides.push(method.to_string());
            }
        }
        self.methods
            .insert((class.to_string(), method.to_string()), Arc::new(func));
    }

    /// Make the named collaborator operation fail with `message`
    pub fn fail(&self, operation: &'static str, message: &str) {
        self.failures.insert(operation, message.to_string());
    }

    /// Stop failing the named operation
    pub fn heal(&self, operation: &'static str) {
        self.failures.remove(operation);
    }

    fn check(&self, operation: &'static str) -> Result<(), HostError> {
        match self.failures.get(operation) {
            Some(message) => Err(HostError::Failed(message.clone())),
            None => Ok(()),
        }
    }

    /// Prepare host types `bytes` larger than the classes they stand for
    pub fn skew_host_type_sizes(&self, bytes: usize) {
        self.host_type_skew.store(bytes, Ordering::Relaxed);
    }

    fn next_handle(&self) -> HostHandle {
        HostHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Create an empty host object holding one reference, ready to be bound
    /// with [`Obj::foster`]
    pub fn new_host_object(&self) -> HostHandle {
        let handle = self.next_handle();
        self.objects.insert(
            handle.as_u64(),
            HostObject {
                obj: None,
                refcount: 1,
            },
        );
        handle
    }

    /// `(class, parent)` pairs passed to `register_with_host`, in call order
    pub fn registrations(&self) -> Vec<(String, String)> {
        self.registrations.lock().clone()
    }

    /// Number of bootstrap hook invocations
    pub fn hook_calls(&self) -> usize {
        self.hook_calls.load(Ordering::SeqCst)
    }

    /// Number of host objects created by `adopt`
    pub fn adopted(&self) -> usize {
        self.adopted.load(Ordering::SeqCst)
    }

    /// Number of host objects disposed of by `defuse`
    pub fn defused(&self) -> usize {
        self.defused.load(Ordering::SeqCst)
    }

    /// Number of objects destroyed because their host count hit zero
    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Number of live host objects
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }
}

impl Default for SandboxHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SandboxHost {
    fn find_parent_class(&self, class_name: &str) -> Result<Option<String>, HostError> {
        self.check("find_parent_class")?;
        Ok(self
            .classes
            .get(class_name)
            .map(|declared| declared.parent.clone()))
    }

    fn fresh_host_methods(&self, class_name: &str) -> Result<Vec<String>, HostError> {
        self.check("fresh_host_methods")?;
        Ok(self
            .classes
            .get(class_name)
            .map(|declared| declared.overrides.clone())
            .unwrap_or_default())
    }

    fn register_with_host(&self, class: &ClassRef, parent: &ClassRef) -> Result<(), HostError> {
        self.check("register_with_host")?;
        self.registrations
            .lock()
            .push((class.name().to_string(), parent.name().to_string()));
        Ok(())
    }

    fn bootstrap_hook(&self, class: &ClassRef) -> Result<(), HostError> {
        self.check("bootstrap_hook")?;
        self.hook_calls.fetch_add(1, Ordering::SeqCst);
        let host_type = self.next_handle();
        let size = class.instance_alloc_size() + self.host_type_skew.load(Ordering::Relaxed);
        self.host_types.insert(host_type.as_u64(), size);
        if class.associate_host_type(host_type).is_err() {
            self.host_types.remove(&host_type.as_u64());
        }
        Ok(())
    }

    fn host_type_size(&self, host_type: HostHandle) -> Option<usize> {
        self.host_types.get(&host_type.as_u64()).map(|size| *size)
    }

    fn method_host_name(&self, method: &Method) -> RuntimeResult<String> {
        if self.lowercase_names.load(Ordering::Relaxed) {
            return method.lowercase_host_name();
        }
        Ok(method
            .host_alias()
            .unwrap_or_else(|| method.name().to_string()))
    }

    fn adopt(&self, obj: &Obj, refcount: u32) -> Result<HostHandle, HostError> {
        self.check("adopt")?;
        self.adopted.fetch_add(1, Ordering::SeqCst);
        let handle = self.next_handle();
        self.objects.insert(
            handle.as_u64(),
            HostObject {
                obj: Some(obj.clone()),
                refcount,
            },
        );
        Ok(handle)
    }

    fn defuse(&self, handle: HostHandle) {
        if self.objects.remove(&handle.as_u64()).is_some() {
            self.defused.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn bind(&self, handle: HostHandle, obj: &Obj) -> Result<(), HostError> {
        match self.objects.get_mut(&handle.as_u64()) {
            Some(mut entry) => {
                entry.obj = Some(obj.clone());
                Ok(())
            }
            None => Err(HostError::UnknownHandle(handle)),
        }
    }

    fn lookup(&self, handle: HostHandle) -> Option<Obj> {
        self.objects
            .get(&handle.as_u64())
            .and_then(|entry| entry.obj.clone())
    }

    fn retain(&self, handle: HostHandle) {
        if let Some(mut entry) = self.objects.get_mut(&handle.as_u64()) {
            entry.refcount += 1;
        }
    }

    fn release(&self, handle: HostHandle) -> u32 {
        let remaining = match self.objects.get_mut(&handle.as_u64()) {
            Some(mut entry) => {
                entry.refcount = entry.refcount.saturating_sub(1);
                entry.refcount
            }
            None => return 0,
        };
        if remaining > 0 {
            return remaining;
        }
        // Destroy outside the shard lock; destructors may call back in
        let removed = self
            .objects
            .remove_if(&handle.as_u64(), |_, entry| entry.refcount == 0);
        if let Some((_, HostObject { obj: Some(obj), .. })) = removed {
            obj.destroy();
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
        0
    }

    fn refcount(&self, handle: HostHandle) -> u32 {
        self.objects
            .get(&handle.as_u64())
            .map_or(0, |entry| entry.refcount)
    }

    fn call_method(&self, handle: HostHandle, method: &str, args: &[Value]) -> Result<Value, HostError> {
        self.check("call_method")?;
        let obj = self.lookup(handle).ok_or(HostError::UnknownHandle(handle))?;
        let func = obj
            .class()
            .ancestors()
            .find_map(|class| {
                self.methods
                    .get(&(class.name().to_string(), method.to_string()))
                    .map(|func| func.value().clone())
            })
            .ok_or_else(|| {
                HostError::Failed(format!(
                    "No host implementation of '{}' for class '{}'",
                    method,
                    obj.class().name()
                ))
            })?;
        func(&obj, args)
    }
}

impl fmt::Debug for SandboxHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxHost")
            .field("classes", &self.classes.len())
            .field("objects", &self.objects.len())
            .field("hook_calls", &self.hook_calls())
            .finish()
    }
}
