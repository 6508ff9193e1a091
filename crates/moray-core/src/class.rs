//! Class records
//!
//! A class record describes one class: its parent, allocation sizes, vtable,
//! name and the methods it introduces. Records are built once (by the
//! bootstrap engine or by dynamic subclassing), shared as [`ClassRef`], and
//! live for the rest of the process. A class record is itself an object: it
//! carries an immortal refcount header and refuses to be destroyed.

use crate::bootstrap::ParcelId;
use crate::host::HostHandle;
use crate::method::{Method, MethodFn, SlotOffset, CLASS_HEADER_SIZE};
use crate::object::Obj;
use crate::refcount::{Lifetime, ObjHeader};
use crate::vtable::Vtable;
use once_cell::sync::OnceCell;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

/// Shared reference to a class record
pub type ClassRef = Arc<Class>;

/// Destructor run when an instance is destroyed
pub type DestroyFn = fn(&Obj);

/// Class flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClassFlags(u32);

impl ClassFlags {
    /// No flags
    pub const NONE: ClassFlags = ClassFlags(0);
    /// Refcounting is special-cased for instances
    pub const REFCOUNT_SPECIAL: ClassFlags = ClassFlags(1 << 0);
    /// Instances ignore retain/release and are never destroyed by them
    pub const IMMORTAL: ClassFlags = ClassFlags(1 << 1);
    /// Created at run time on behalf of a host subclass
    pub const HOST_SUBCLASS: ClassFlags = ClassFlags(1 << 2);

    /// Flags for classes whose instances live forever
    pub const fn immortal() -> ClassFlags {
        ClassFlags(Self::REFCOUNT_SPECIAL.0 | Self::IMMORTAL.0)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check whether every bit of `other` is set
    pub const fn contains(self, other: ClassFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ClassFlags {
    type Output = ClassFlags;

    fn bitor(self, rhs: ClassFlags) -> ClassFlags {
        ClassFlags(self.0 | rhs.0)
    }
}

/// Runtime representation of a class
pub struct Class {
    header: ObjHeader,
    parent: Option<ClassRef>,
    parcel_id: ParcelId,
    flags: ClassFlags,
    instance_alloc_size: usize,
    class_record_alloc_size: usize,
    vtable: Vtable,
    destructor: Option<DestroyFn>,
    name: OnceCell<String>,
    methods: OnceCell<Vec<Arc<Method>>>,
    host_type: OnceCell<HostHandle>,
}

impl Class {
    /// Record produced by the layout pass: sizes and vtable are final, the
    /// header is blank, name and methods are still unset.
    pub(crate) fn laid_out(
        parent: Option<ClassRef>,
        parcel_id: ParcelId,
        flags: ClassFlags,
        instance_alloc_size: usize,
        vtable: Vtable,
        destructor: Option<DestroyFn>,
    ) -> Self {
        let class_record_alloc_size = CLASS_HEADER_SIZE + vtable.byte_len();
        Self {
            header: ObjHeader::blank(),
            parent,
            parcel_id,
            flags,
            instance_alloc_size,
            class_record_alloc_size,
            vtable,
            destructor,
            name: OnceCell::new(),
            methods: OnceCell::new(),
            host_type: OnceCell::new(),
        }
    }

    /// Exact copy of this record with its own header and name.
    ///
    /// The host-type association is not copied; it is resolved lazily for
    /// the copy.
    pub fn clone_record(&self) -> Class {
        let twin = Class {
            header: ObjHeader::native(),
            parent: self.parent.clone(),
            parcel_id: self.parcel_id,
            flags: self.flags,
            instance_alloc_size: self.instance_alloc_size,
            class_record_alloc_size: self.class_record_alloc_size,
            vtable: Vtable::inherit(&self.vtable),
            destructor: self.destructor,
            name: self.name.clone(),
            methods: self.methods.clone(),
            host_type: OnceCell::new(),
        };
        if twin.class_record_alloc_size != CLASS_HEADER_SIZE + twin.vtable.byte_len() {
            crate::fatal!(
                "Class record for '{}' claims {} bytes but its layout needs {}",
                self.name(),
                self.class_record_alloc_size,
                CLASS_HEADER_SIZE + twin.vtable.byte_len()
            );
        }
        twin
    }

    /// Turn a clone of `parent` into a fresh subclass named `name`.
    ///
    /// The subclass inherits every implementation through the vtable copy
    /// but introduces no methods of its own.
    pub(crate) fn into_subclass(mut self, name: &str, parent: ClassRef) -> Class {
        self.parent = Some(parent);
        self.flags = self.flags | ClassFlags::HOST_SUBCLASS;
        self.name = OnceCell::new();
        self.methods = OnceCell::new();
        self.assign_name(name);
        self.assign_methods(Vec::new());
        self
    }

    /// Install `func` at `offset` in this record's vtable
    pub fn override_method(&mut self, func: MethodFn, offset: SlotOffset) {
        self.vtable.override_slot(offset, func);
    }

    pub(crate) fn assign_name(&self, name: &str) {
        if self.name.set(name.to_string()).is_err() && self.name() != name {
            crate::fatal!("Class '{}' can't be renamed to '{}'", self.name(), name);
        }
    }

    pub(crate) fn assign_methods(&self, methods: Vec<Arc<Method>>) {
        if self.methods.set(methods).is_err() {
            crate::fatal!("Methods of class '{}' assigned twice", self.name());
        }
    }

    /// Class name (empty until the registration pass names the class)
    pub fn name(&self) -> &str {
        self.name.get().map(String::as_str).unwrap_or("")
    }

    /// Parent class
    pub fn parent(&self) -> Option<&ClassRef> {
        self.parent.as_ref()
    }

    /// Bootstrap unit the record was laid out in
    pub fn parcel_id(&self) -> ParcelId {
        self.parcel_id
    }

    /// Flag bits
    pub fn flags(&self) -> ClassFlags {
        self.flags
    }

    /// Bytes needed for an instance, parent-inclusive
    pub fn instance_alloc_size(&self) -> usize {
        self.instance_alloc_size
    }

    /// Bytes covered by this class record, vtable included
    pub fn class_record_alloc_size(&self) -> usize {
        self.class_record_alloc_size
    }

    /// Method table
    pub fn vtable(&self) -> &Vtable {
        &self.vtable
    }

    /// Implementation dispatched for `offset`
    pub fn method_at(&self, offset: SlotOffset) -> MethodFn {
        self.vtable.slot(offset)
    }

    /// Destructor run for instances
    pub fn destructor(&self) -> Option<DestroyFn> {
        self.destructor
    }

    /// Methods introduced at this class (not the flattened set)
    pub fn fresh_methods(&self) -> &[Arc<Method>] {
        self.methods.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Find one of this class's fresh methods by name
    pub fn find_method(&self, name: &str) -> Option<&Arc<Method>> {
        self.fresh_methods().iter().find(|method| method.name() == name)
    }

    /// Find a method by name anywhere in the ancestor chain
    pub fn resolve_method(&self, name: &str) -> Option<&Arc<Method>> {
        self.ancestors().find_map(|class| class.find_method(name))
    }

    /// This class followed by its ancestors, nearest first
    pub fn ancestors(&self) -> impl Iterator<Item = &Class> + '_ {
        std::iter::successors(Some(self), |&class| class.parent.as_deref())
    }

    /// Check whether this class is, or descends from, the class `name`
    pub fn is_a(&self, name: &str) -> bool {
        self.ancestors().any(|class| class.name() == name)
    }

    /// Give a method a different name in host languages.
    ///
    /// The method must be one of this class's fresh methods.
    pub fn add_host_method_alias(&self, alias: &str, meth_name: &str) {
        match self.find_method(meth_name) {
            Some(method) => method.set_host_alias(alias),
            None => crate::fatal!("Method {} not found in class '{}'", meth_name, self.name()),
        }
    }

    /// Hide a method from host binding generators.
    ///
    /// The method must be one of this class's fresh methods.
    pub fn exclude_host_method(&self, meth_name: &str) {
        match self.find_method(meth_name) {
            Some(method) => method.exclude(),
            None => crate::fatal!("Method {} not found in class '{}'", meth_name, self.name()),
        }
    }

    /// Associated host type object, if one has been set
    pub fn host_type(&self) -> Option<HostHandle> {
        self.host_type.get().copied()
    }

    /// Associate a host type object. First writer wins; a losing handle is
    /// returned so the caller can release it.
    pub fn associate_host_type(&self, host_type: HostHandle) -> Result<(), HostHandle> {
        self.host_type.set(host_type)
    }
}

impl Lifetime for Class {
    fn header(&self) -> &ObjHeader {
        &self.header
    }

    fn is_immortal(&self) -> bool {
        true
    }

    fn destroy(&self) {
        crate::fatal!("Insane attempt to destroy Class for class '{}'", self.name());
    }

    fn describe(&self) -> String {
        format!("Class '{}'", self.name())
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name())
            .field("parent", &self.parent.as_ref().map(|parent| parent.name()))
            .field("parcel_id", &self.parcel_id)
            .field("flags", &self.flags)
            .field("instance_alloc_size", &self.instance_alloc_size)
            .field("class_record_alloc_size", &self.class_record_alloc_size)
            .field("slots", &self.vtable.len())
            .finish()
    }
}
