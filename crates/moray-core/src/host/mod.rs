//! Host-language collaborators
//!
//! A host is the runtime of another language sharing objects with this one.
//! The core asks it three kinds of questions:
//!
//! - class discovery for dynamic subclassing (`find_parent_class`,
//!   `fresh_host_methods`, `register_with_host`, and the optional
//!   `bootstrap_hook`)
//! - the object bridge (`adopt`, `defuse`, `bind`, `lookup`) backing
//!   [`to_host`](crate::refcount::to_host) / [`from_host`](crate::refcount::from_host)
//! - refcount forwarding for delegated objects (`retain`, `release`,
//!   `refcount`)
//!
//! Hosts may call back into the core from any of these (to allocate an
//! object, say). Ancestor chains are resolved completely before any method is
//! dispatched, which keeps that mutual recursion finite.

pub mod sandbox;

use crate::class::ClassRef;
use crate::error::{HostError, RuntimeResult};
use crate::method::Method;
use crate::object::Obj;
use crate::value::Value;

pub use sandbox::SandboxHost;

/// Opaque reference to a host-language object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(u64);

impl HostHandle {
    /// Wrap a raw host handle
    pub const fn new(raw: u64) -> Self {
        HostHandle(raw)
    }

    /// Get the raw handle value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Host-language runtime collaborating with the object model
pub trait Host: Send + Sync {
    /// Resolve the declared parent of a host-defined class
    fn find_parent_class(&self, class_name: &str) -> Result<Option<String>, HostError>;

    /// Names of the inherited methods a host subclass has overridden
    fn fresh_host_methods(&self, class_name: &str) -> Result<Vec<String>, HostError>;

    /// A new dynamic subclass exists
    fn register_with_host(&self, class: &ClassRef, parent: &ClassRef) -> Result<(), HostError>;

    /// Called once per bootstrapped class, after the class record is
    /// addressable and before it is named or registered.
    fn bootstrap_hook(&self, _class: &ClassRef) -> Result<(), HostError> {
        Ok(())
    }

    /// Instance size a host type object was prepared with, if it knows
    fn host_type_size(&self, _host_type: HostHandle) -> Option<usize> {
        None
    }

    /// Name under which `method` is visible to this host
    fn method_host_name(&self, method: &Method) -> RuntimeResult<String> {
        Ok(method
            .host_alias()
            .unwrap_or_else(|| method.name().to_string()))
    }

    /// Create a host object taking over `obj`'s lifetime, with `refcount`
    /// references already held.
    fn adopt(&self, obj: &Obj, refcount: u32) -> Result<HostHandle, HostError>;

    /// Dispose of a host object created by a losing [`adopt`](Host::adopt)
    /// without running the object's destructor.
    fn defuse(&self, handle: HostHandle);

    /// Attach `obj` to an existing host object that already owns its lifetime
    fn bind(&self, _handle: HostHandle, _obj: &Obj) -> Result<(), HostError> {
        Err(HostError::unsupported("bind"))
    }

    /// Object carried by a host handle
    fn lookup(&self, handle: HostHandle) -> Option<Obj>;

    /// Increment a host object's count
    fn retain(&self, handle: HostHandle);

    /// Decrement a host object's count, returning the count left
    fn release(&self, handle: HostHandle) -> u32;

    /// A host object's count
    fn refcount(&self, handle: HostHandle) -> u32;

    /// Invoke a host-language method implementation
    fn call_method(
        &self,
        _handle: HostHandle,
        _method: &str,
        _args: &[Value],
    ) -> Result<Value, HostError> {
        Err(HostError::unsupported("call_method"))
    }
}

/// Host for a process with no second language.
///
/// Knows no host classes and cannot adopt objects, so every object stays in
/// native mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl Host for NullHost {
    fn find_parent_class(&self, _class_name: &str) -> Result<Option<String>, HostError> {
        Ok(None)
    }

    fn fresh_host_methods(&self, _class_name: &str) -> Result<Vec<String>, HostError> {
        Ok(Vec::new())
    }

    fn register_with_host(&self, _class: &ClassRef, _parent: &ClassRef) -> Result<(), HostError> {
        Ok(())
    }

    fn adopt(&self, _obj: &Obj, _refcount: u32) -> Result<HostHandle, HostError> {
        Err(HostError::unsupported("adopt"))
    }

    fn defuse(&self, _handle: HostHandle) {}

    fn lookup(&self, _handle: HostHandle) -> Option<Obj> {
        None
    }

    fn retain(&self, _handle: HostHandle) {}

    fn release(&self, _handle: HostHandle) -> u32 {
        0
    }

    fn refcount(&self, _handle: HostHandle) -> u32 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::SlotOffset;

    #[test]
    fn test_handle_roundtrip() {
        assert_eq!(HostHandle::new(17).as_u64(), 17);
    }

    #[test]
    fn test_null_host_knows_nothing() {
        let host = NullHost;
        assert_eq!(host.find_parent_class("Martian").unwrap(), None);
        assert!(host.fresh_host_methods("Martian").unwrap().is_empty());
        assert!(host.lookup(HostHandle::new(1)).is_none());
        assert_eq!(host.refcount(HostHandle::new(1)), 0);
    }

    #[test]
    fn test_default_method_host_name() {
        let host = NullHost;
        let method = Method::new("Get_Name", None, SlotOffset::from_index(0));
        assert_eq!(host.method_host_name(&method).unwrap(), "Get_Name");
        method.set_host_alias("name");
        assert_eq!(host.method_host_name(&method).unwrap(), "name");
    }
}
