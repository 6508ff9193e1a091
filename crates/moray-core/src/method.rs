//! Method records and vtable slot offsets

use crate::error::{RuntimeError, RuntimeResult};
use crate::object::Invocation;
use crate::refcount::{Lifetime, ObjHeader};
use crate::value::Value;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Signature of every dispatchable method implementation
pub type MethodFn = fn(&Invocation<'_>) -> RuntimeResult<Value>;

/// Size of one vtable slot in bytes
pub const SLOT_SIZE: usize = std::mem::size_of::<MethodFn>();

/// Byte size of the fixed part of a class record, i.e. the offset of the
/// first vtable slot.
///
/// Header words: class, ref, parent, name, flags, parcel id, instance size,
/// record size, methods, host type.
pub const CLASS_HEADER_SIZE: usize = 10 * std::mem::size_of::<usize>();

/// Byte offset of a method's slot within a class record
///
/// Offsets are assigned once, at the class that declares the method novel,
/// and are the same in every descendant of that class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotOffset(usize);

impl SlotOffset {
    /// Offset of the slot at `index`
    #[inline]
    pub const fn from_index(index: usize) -> Self {
        SlotOffset(CLASS_HEADER_SIZE + index * SLOT_SIZE)
    }

    /// Wrap a raw byte offset
    #[inline]
    pub const fn from_bytes(bytes: usize) -> Self {
        SlotOffset(bytes)
    }

    /// Raw byte offset
    #[inline]
    pub const fn bytes(self) -> usize {
        self.0
    }

    /// Slot index, or `None` if the offset does not address a slot
    #[inline]
    pub fn index(self) -> Option<usize> {
        let rel = self.0.checked_sub(CLASS_HEADER_SIZE)?;
        if rel % SLOT_SIZE == 0 {
            Some(rel / SLOT_SIZE)
        } else {
            None
        }
    }
}

impl fmt::Display for SlotOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One dispatch slot as seen by introspection and host binding code
pub struct Method {
    header: ObjHeader,
    name: String,
    host_alias: RwLock<Option<String>>,
    offset: SlotOffset,
    callback: Option<MethodFn>,
    excluded: AtomicBool,
}

impl Method {
    /// Create a method record
    ///
    /// `callback` is the implementation that forwards to a host-language
    /// override, if the method can be overridden from a host.
    pub fn new(name: impl Into<String>, callback: Option<MethodFn>, offset: SlotOffset) -> Self {
        Self {
            header: ObjHeader::native(),
            name: name.into(),
            host_alias: RwLock::new(None),
            offset,
            callback,
            excluded: AtomicBool::new(false),
        }
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vtable slot offset
    pub fn offset(&self) -> SlotOffset {
        self.offset
    }

    /// Host-delegating implementation, if any
    pub fn callback(&self) -> Option<MethodFn> {
        self.callback
    }

    /// Name override visible to host languages
    pub fn host_alias(&self) -> Option<String> {
        self.host_alias.read().clone()
    }

    /// Set the host-visible name
    pub fn set_host_alias(&self, alias: impl Into<String>) {
        *self.host_alias.write() = Some(alias.into());
    }

    /// Whether host binding generators should skip this method
    pub fn is_excluded(&self) -> bool {
        self.excluded.load(Ordering::Acquire)
    }

    /// Mark the method as skipped by host binding generators
    pub fn exclude(&self) {
        self.excluded.store(true, Ordering::Release);
    }

    /// Host name under the lowercase convention: the alias if one is set,
    /// otherwise the name lowercased. Only ASCII names can be lowercased.
    pub fn lowercase_host_name(&self) -> RuntimeResult<String> {
        if let Some(alias) = self.host_alias() {
            return Ok(alias);
        }
        if !self.name.is_ascii() {
            return Err(RuntimeError::NonAsciiMethodName {
                name: self.name.clone(),
            });
        }
        Ok(self.name.to_ascii_lowercase())
    }
}

impl Lifetime for Method {
    fn header(&self) -> &ObjHeader {
        &self.header
    }

    fn is_immortal(&self) -> bool {
        true
    }

    fn destroy(&self) {
        crate::fatal!("Insane attempt to destroy Method '{}'", self.name);
    }

    fn describe(&self) -> String {
        format!("Method '{}'", self.name)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("host_alias", &self.host_alias())
            .field("offset", &self.offset)
            .field("has_callback", &self.callback.is_some())
            .field("excluded", &self.is_excluded())
            .finish()
    }
}
