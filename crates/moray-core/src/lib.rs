//! Moray object-model runtime
//!
//! This crate provides the core shared by every language binding:
//! - Class bootstrapping from static descriptors (parcels, vtables, offsets)
//! - A lock-free, insert-once class registry
//! - Dynamic subclassing on behalf of a host language
//! - Dual-mode reference counting (native counts or host-delegated lifetime)
//! - The `Host` collaborator seam, with an in-process reference host

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bootstrap;
pub mod class;
pub mod descriptor;
pub mod error;
pub mod host;
pub mod introspect;
pub mod method;
pub mod object;
pub mod options;
pub mod refcount;
pub mod registry;
pub mod runtime;
pub mod subclass;
pub mod value;
pub mod vtable;

pub use bootstrap::ParcelId;
pub use class::{Class, ClassFlags, ClassRef, DestroyFn};
pub use descriptor::{ClassDescriptor, ClassSlot, IvarsOffsetSlot, OffsetSlot, Slot};
pub use error::{HostError, RuntimeError, RuntimeResult};
pub use host::{Host, HostHandle, NullHost, SandboxHost};
pub use introspect::{ClassInfo, MethodInfo};
pub use method::{Method, MethodFn, SlotOffset, CLASS_HEADER_SIZE, SLOT_SIZE};
pub use object::{Invocation, Obj, OBJ_HEADER_SIZE};
pub use options::RuntimeOptions;
pub use refcount::{Lifetime, RefState};
pub use registry::ClassRegistry;
pub use runtime::Runtime;
pub use value::Value;
pub use vtable::Vtable;

#[doc(hidden)]
pub mod __private {
    pub use tracing;
}
