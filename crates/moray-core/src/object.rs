//! Object instances
//!
//! An [`Obj`] is a cheap, clonable handle to one instance. Cloning the handle
//! does not touch the logical refcount kept in the instance header; that is
//! driven explicitly through [`retain`](crate::refcount::retain) and
//! [`release`](crate::refcount::release).
//!
//! Each instance owns `instance_alloc_size` zeroed bytes. The first
//! [`OBJ_HEADER_SIZE`] bytes stand for the header words (class pointer and
//! refcount) and cannot be addressed as instance variables.

use crate::class::{ClassFlags, ClassRef};
use crate::error::{RuntimeError, RuntimeResult};
use crate::host::{Host, HostHandle};
use crate::method::SlotOffset;
use crate::refcount::{self, Lifetime, ObjHeader, RefState};
use crate::runtime::Runtime;
use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Bytes reserved at the front of every instance
pub const OBJ_HEADER_SIZE: usize = 2 * std::mem::size_of::<usize>();

struct ObjInner {
    class: ClassRef,
    header: ObjHeader,
    ivars: Mutex<Option<Box<[u8]>>>,
}

/// Handle to a runtime object
#[derive(Clone)]
pub struct Obj(Arc<ObjInner>);

impl Obj {
    /// Allocate a zeroed instance of `class` in native mode with a count of 1
    pub fn new(class: &ClassRef) -> Obj {
        Self::with_header(class, ObjHeader::native())
    }

    /// Wrap a host object that already owns the lifetime of a new instance.
    ///
    /// The instance starts in delegated mode; the host is asked to bind the
    /// handle to it.
    pub fn foster(host: &dyn Host, class: &ClassRef, handle: HostHandle) -> RuntimeResult<Obj> {
        let obj = Self::with_header(class, ObjHeader::delegated(handle));
        host.bind(handle, &obj)?;
        Ok(obj)
    }

    fn with_header(class: &ClassRef, header: ObjHeader) -> Obj {
        let ivars = vec![0u8; class.instance_alloc_size()].into_boxed_slice();
        Obj(Arc::new(ObjInner {
            class: Arc::clone(class),
            header,
            ivars: Mutex::new(Some(ivars)),
        }))
    }

    /// Class of the instance
    pub fn class(&self) -> &ClassRef {
        &self.0.class
    }

    /// Whether both handles refer to the same instance
    pub fn ptr_eq(&self, other: &Obj) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Check if the instance has been destroyed
    pub fn is_destroyed(&self) -> bool {
        self.0.header.is_destroyed()
    }

    /// Copy `len` instance bytes starting at `offset`.
    ///
    /// Returns `None` for ranges overlapping the header or past the end, and
    /// after destruction.
    pub fn read_ivars(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
        let ivars = self.0.ivars.lock();
        let bytes = ivars.as_deref()?;
        let range = ivar_range(offset, len, bytes.len())?;
        Some(bytes[range].to_vec())
    }

    /// Overwrite instance bytes starting at `offset`; same bounds as
    /// [`read_ivars`](Obj::read_ivars).
    pub fn write_ivars(&self, offset: usize, data: &[u8]) -> bool {
        let mut ivars = self.0.ivars.lock();
        let Some(bytes) = ivars.as_deref_mut() else {
            return false;
        };
        match ivar_range(offset, data.len(), bytes.len()) {
            Some(range) => {
                bytes[range].copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    /// Read a native-endian `u64` instance variable
    pub fn ivar_u64(&self, offset: usize) -> Option<u64> {
        let bytes = self.read_ivars(offset, 8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes);
        Some(u64::from_ne_bytes(word))
    }

    /// Write a native-endian `u64` instance variable
    pub fn set_ivar_u64(&self, offset: usize, value: u64) -> bool {
        self.write_ivars(offset, &value.to_ne_bytes())
    }

    /// Dispatch the method installed at `offset`
    pub fn invoke(&self, runtime: &Runtime, offset: SlotOffset, args: &[Value]) -> RuntimeResult<Value> {
        let func = self.class().method_at(offset);
        func(&Invocation {
            runtime,
            receiver: self,
            args,
        })
    }

    /// Dispatch a method found by name anywhere in the ancestor chain
    pub fn invoke_by_name(&self, runtime: &Runtime, name: &str, args: &[Value]) -> RuntimeResult<Value> {
        let offset = match self.class().resolve_method(name) {
            Some(method) => method.offset(),
            None => {
                return Err(RuntimeError::UnknownMethod {
                    class: self.class().name().to_string(),
                    method: name.to_string(),
                })
            }
        };
        self.invoke(runtime, offset, args)
    }
}

fn ivar_range(offset: usize, len: usize, size: usize) -> Option<std::ops::Range<usize>> {
    let end = offset.checked_add(len)?;
    (offset >= OBJ_HEADER_SIZE && end <= size).then_some(offset..end)
}

impl Lifetime for Obj {
    fn header(&self) -> &ObjHeader {
        &self.0.header
    }

    fn is_immortal(&self) -> bool {
        self.class().flags().contains(ClassFlags::IMMORTAL)
    }

    /// Mark the instance destroyed, run the class destructor once, then drop
    /// the instance storage.
    fn destroy(&self) {
        if self.is_immortal() {
            return;
        }
        let header = self.header();
        loop {
            let state = header.state();
            if state == RefState::Destroyed {
                crate::fatal!("{} destroyed twice", self.describe());
            }
            if header.compare_exchange(state, RefState::Destroyed).is_ok() {
                break;
            }
        }
        if let Some(destructor) = self.class().destructor() {
            destructor(self);
        }
        self.0.ivars.lock().take();
    }

    fn describe(&self) -> String {
        format!("object of class '{}'", self.class().name())
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Obj")
            .field("class", &self.class().name())
            .field("state", &self.0.header.state())
            .finish()
    }
}

/// Call context handed to every dispatched method
pub struct Invocation<'a> {
    /// Runtime the call runs in
    pub runtime: &'a Runtime,
    /// Receiver
    pub receiver: &'a Obj,
    /// Arguments
    pub args: &'a [Value],
}

impl Invocation<'_> {
    /// Argument at `index`
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Forward the call to the host-language implementation of `method`.
    ///
    /// Used by host-override callbacks. The method is looked up under its
    /// host name, and the receiver is handed to the host for the duration of
    /// the call.
    pub fn call_host(&self, method: &str) -> RuntimeResult<Value> {
        let host = self.runtime.host();
        let host_name = match self.receiver.class().resolve_method(method) {
            Some(record) => host.method_host_name(record)?,
            None => method.to_string(),
        };
        let handle = refcount::to_host(host, self.receiver)?;
        let result = host.call_method(handle, &host_name, self.args);
        host.release(handle);
        Ok(result?)
    }
}

impl fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("receiver", self.receiver)
            .field("args", &self.args)
            .finish()
    }
}
