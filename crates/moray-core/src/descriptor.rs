//! Static class descriptors
//!
//! One [`ClassDescriptor`] per class, grouped into an ordered array per
//! parcel. Descriptors name their parent by [`ClassSlot`] and receive their
//! results through out-parameter slots: the class record, the instance
//! variable offset, and the vtable offset of every method. A descriptor
//! listed later in the array may use an earlier one's class slot as its
//! parent.

use crate::class::{ClassFlags, ClassRef, DestroyFn};
use crate::method::{MethodFn, SlotOffset};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Shared out-parameter cell filled in by the bootstrap engine
pub struct Slot<T>(Arc<RwLock<Option<T>>>);

impl<T: Clone> Slot<T> {
    /// Create an empty slot
    pub fn new() -> Self {
        Slot(Arc::new(RwLock::new(None)))
    }

    /// Current value
    pub fn get(&self) -> Option<T> {
        self.0.read().clone()
    }

    /// Store a value, replacing any previous one
    pub fn set(&self, value: T) {
        *self.0.write() = Some(value);
    }

    /// Check whether the slot has been filled
    pub fn is_filled(&self) -> bool {
        self.0.read().is_some()
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Slot(Arc::clone(&self.0))
    }
}

impl<T: Clone> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Slot").field(&*self.0.read()).finish()
    }
}

/// Out-parameter for a class record
pub type ClassSlot = Slot<ClassRef>;

/// Out-parameter for a method's vtable offset
pub type OffsetSlot = Slot<SlotOffset>;

/// Out-parameter for an instance-variable block offset
pub type IvarsOffsetSlot = Slot<usize>;

/// Method introduced by this class
#[derive(Debug, Clone)]
pub struct NovelMethod {
    /// Method name
    pub name: String,
    /// Implementation
    pub func: MethodFn,
    /// Implementation that forwards to a host override
    pub callback: Option<MethodFn>,
    /// Receives the newly claimed offset
    pub offset: OffsetSlot,
}

/// Parent method replaced by this class
#[derive(Debug, Clone)]
pub struct OverriddenMethod {
    /// Replacement implementation
    pub func: MethodFn,
    /// Receives the parent's offset
    pub offset: OffsetSlot,
    /// Offset of the method in the parent
    pub parent_offset: OffsetSlot,
}

/// Parent method kept unchanged
#[derive(Debug, Clone)]
pub struct InheritedMethod {
    /// Receives the parent's offset
    pub offset: OffsetSlot,
    /// Offset of the method in the parent
    pub parent_offset: OffsetSlot,
}

/// Static description of one class
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    /// Class name
    pub name: String,
    /// Parent class slot (`None` for roots)
    pub parent: Option<ClassSlot>,
    /// Bytes of instance struct contributed by this parcel, including the
    /// instance variables of same-parcel ancestors
    pub ivars_size: usize,
    /// Receives the offset of the instance-variable block
    pub ivars_offset: Option<IvarsOffsetSlot>,
    /// Class flags
    pub flags: ClassFlags,
    /// Instance destructor (inherited from the parent when `None`)
    pub destructor: Option<DestroyFn>,
    /// Methods introduced here
    pub novel_methods: Vec<NovelMethod>,
    /// Parent methods replaced here
    pub overridden_methods: Vec<OverriddenMethod>,
    /// Parent methods kept here
    pub inherited_methods: Vec<InheritedMethod>,
    /// Receives the class record
    pub class_slot: ClassSlot,
}

impl ClassDescriptor {
    /// Create a descriptor for a root class with no methods
    pub fn new(name: impl Into<String>, class_slot: &ClassSlot) -> Self {
        Self {
            name: name.into(),
            parent: None,
            ivars_size: 0,
            ivars_offset: None,
            flags: ClassFlags::NONE,
            destructor: None,
            novel_methods: Vec::new(),
            overridden_methods: Vec::new(),
            inherited_methods: Vec::new(),
            class_slot: class_slot.clone(),
        }
    }

    /// Set the parent class slot
    pub fn with_parent(mut self, parent: &ClassSlot) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Set the instance-variable size and the slot receiving its offset
    pub fn with_ivars(mut self, ivars_size: usize, ivars_offset: &IvarsOffsetSlot) -> Self {
        self.ivars_size = ivars_size;
        self.ivars_offset = Some(ivars_offset.clone());
        self
    }

    /// Set the full, parent-inclusive instance size without asking for an
    /// ivars offset
    pub fn with_ivars_size(mut self, ivars_size: usize) -> Self {
        self.ivars_size = ivars_size;
        self
    }

    /// Set the class flags
    pub fn with_flags(mut self, flags: ClassFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the instance destructor
    pub fn with_destructor(mut self, destructor: DestroyFn) -> Self {
        self.destructor = Some(destructor);
        self
    }

    /// Add a novel method
    pub fn novel_method(self, name: impl Into<String>, func: MethodFn, offset: &OffsetSlot) -> Self {
        self.push_novel(name.into(), func, None, offset)
    }

    /// Add a novel method that host subclasses may override
    pub fn novel_method_with_callback(
        self,
        name: impl Into<String>,
        func: MethodFn,
        callback: MethodFn,
        offset: &OffsetSlot,
    ) -> Self {
        self.push_novel(name.into(), func, Some(callback), offset)
    }

    fn push_novel(
        mut self,
        name: String,
        func: MethodFn,
        callback: Option<MethodFn>,
        offset: &OffsetSlot,
    ) -> Self {
        self.novel_methods.push(NovelMethod {
            name,
            func,
            callback,
            offset: offset.clone(),
        });
        self
    }

    /// Add an overridden method
    pub fn overridden_method(
        mut self,
        func: MethodFn,
        offset: &OffsetSlot,
        parent_offset: &OffsetSlot,
    ) -> Self {
        self.overridden_methods.push(OverriddenMethod {
            func,
            offset: offset.clone(),
            parent_offset: parent_offset.clone(),
        });
        self
    }

    /// Add an inherited method
    pub fn inherited_method(mut self, offset: &OffsetSlot, parent_offset: &OffsetSlot) -> Self {
        self.inherited_methods.push(InheritedMethod {
            offset: offset.clone(),
            parent_offset: parent_offset.clone(),
        });
        self
    }
}
