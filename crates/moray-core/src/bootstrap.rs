//! Parcel bootstrap
//!
//! A parcel is a unit of classes defined together. Bootstrapping one turns
//! its ordered [`ClassDescriptor`] array into live, registered class records
//! in three passes over the array:
//!
//! 1. **Layout**: claim a parcel id, then for each descriptor compute the
//!    instance-variable offset, copy the parent's vtable, resolve overridden
//!    and inherited offsets, append novel methods, and publish the class
//!    record and offsets into the descriptor's out-slots.
//! 2. **Identity**: initialize each record's header and run the host's
//!    bootstrap hook.
//! 3. **Registration**: name each class, attach its fresh method records and
//!    insert it into the registry.
//!
//! Descriptor order matters: a parent must appear before its children, or
//! already be bootstrapped by an earlier parcel.

use crate::class::{Class, ClassRef};
use crate::descriptor::ClassDescriptor;
use crate::method::{Method, SlotOffset};
use crate::object::OBJ_HEADER_SIZE;
use crate::refcount::Lifetime;
use crate::runtime::Runtime;
use crate::vtable::Vtable;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Parcel ids claimed so far
static PARCEL_COUNT: AtomicU32 = AtomicU32::new(0);

/// Process-unique identifier of a bootstrap unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ParcelId(u32);

impl ParcelId {
    /// Claim the next parcel id.
    ///
    /// Concurrent callers always receive distinct ids.
    pub fn claim() -> Self {
        loop {
            let current = PARCEL_COUNT.load(Ordering::Acquire);
            let next = match current.checked_add(1) {
                Some(next) => next,
                None => crate::fatal!("Parcel id space exhausted"),
            };
            if PARCEL_COUNT
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return ParcelId(next);
            }
        }
    }

    /// Get the raw id
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ParcelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parcel#{}", self.0)
    }
}

/// Bootstrap one parcel, returning its class records in descriptor order
pub fn bootstrap_parcel(runtime: &Runtime, descriptors: &[ClassDescriptor]) -> Vec<ClassRef> {
    let parcel_id = ParcelId::claim();

    let mut classes = Vec::with_capacity(descriptors.len());
    let mut novel_offsets = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let (class, offsets) = lay_out(parcel_id, descriptor);
        descriptor.class_slot.set(class.clone());
        classes.push(class);
        novel_offsets.push(offsets);
    }

    for (descriptor, class) in descriptors.iter().zip(&classes) {
        ready(runtime, descriptor, class);
    }

    let registry = runtime.registry();
    let laid_out = descriptors.iter().zip(classes.iter_mut()).zip(novel_offsets);
    for ((descriptor, class), offsets) in laid_out {
        class.assign_name(&descriptor.name);
        let methods = descriptor
            .novel_methods
            .iter()
            .zip(offsets)
            .map(|(novel, offset)| Arc::new(Method::new(novel.name.clone(), novel.callback, offset)))
            .collect();
        class.assign_methods(methods);
        if registry.insert_class(class) {
            continue;
        }
        // Lost the race: discard this record and adopt the registered one
        let winner = match registry.fetch(&descriptor.name) {
            Some(winner) => winner,
            None => crate::fatal!(
                "Failed to either insert or fetch Class for '{}'",
                descriptor.name
            ),
        };
        tracing::warn!(
            class = %descriptor.name,
            parcel = %parcel_id,
            "class already registered; using the existing record"
        );
        descriptor.class_slot.set(winner.clone());
        *class = winner;
    }

    tracing::debug!(parcel = %parcel_id, classes = classes.len(), "bootstrapped parcel");
    classes
}

/// Layout pass for one descriptor
fn lay_out(parcel_id: ParcelId, descriptor: &ClassDescriptor) -> (ClassRef, Vec<SlotOffset>) {
    let parent = descriptor.parent.as_ref().map(|slot| match slot.get() {
        Some(parent) => parent,
        None => crate::fatal!(
            "Parent of class '{}' is not bootstrapped yet",
            descriptor.name
        ),
    });

    // Same-parcel ancestors are already included in `ivars_size`
    let ivars_offset = match descriptor.ivars_offset {
        Some(ref slot) => {
            let outside = parent
                .as_ref()
                .and_then(|parent| parent.ancestors().find(|class| class.parcel_id() != parcel_id));
            let offset = outside.map_or(0, Class::instance_alloc_size);
            slot.set(offset);
            offset
        }
        None => 0,
    };
    let instance_alloc_size = ivars_offset + descriptor.ivars_size;

    match parent {
        Some(ref parent) if instance_alloc_size < parent.instance_alloc_size() => crate::fatal!(
            "Class '{}' allocates {} bytes, less than its parent '{}' ({})",
            descriptor.name,
            instance_alloc_size,
            parent.name(),
            parent.instance_alloc_size()
        ),
        None if instance_alloc_size < OBJ_HEADER_SIZE => crate::fatal!(
            "Root class '{}' allocates {} bytes, less than an object header ({})",
            descriptor.name,
            instance_alloc_size,
            OBJ_HEADER_SIZE
        ),
        _ => {}
    }

    let mut vtable = match parent {
        Some(ref parent) => Vtable::inherit(parent.vtable()),
        None => Vtable::new(),
    };

    for overridden in &descriptor.overridden_methods {
        let offset = parent_offset(descriptor, parent.as_ref(), &overridden.parent_offset);
        overridden.offset.set(offset);
        vtable.override_slot(offset, overridden.func);
    }

    for inherited in &descriptor.inherited_methods {
        let offset = parent_offset(descriptor, parent.as_ref(), &inherited.parent_offset);
        inherited.offset.set(offset);
    }

    let offsets = descriptor
        .novel_methods
        .iter()
        .map(|novel| {
            let offset = vtable.push(novel.func);
            novel.offset.set(offset);
            offset
        })
        .collect();

    let destructor = descriptor
        .destructor
        .or_else(|| parent.as_ref().and_then(|parent| parent.destructor()));
    let class = Class::laid_out(
        parent,
        parcel_id,
        descriptor.flags,
        instance_alloc_size,
        vtable,
        destructor,
    );
    (Arc::new(class), offsets)
}

fn parent_offset(
    descriptor: &ClassDescriptor,
    parent: Option<&ClassRef>,
    slot: &crate::descriptor::OffsetSlot,
) -> SlotOffset {
    if parent.is_none() {
        crate::fatal!(
            "Class '{}' overrides or inherits methods but has no parent",
            descriptor.name
        );
    }
    match slot.get() {
        Some(offset) => offset,
        None => crate::fatal!(
            "Parent method offset for class '{}' is not resolved yet",
            descriptor.name
        ),
    }
}

/// Identity pass for one class
fn ready(runtime: &Runtime, descriptor: &ClassDescriptor, class: &ClassRef) {
    class.header().init();

    let host = runtime.host();
    if let Err(err) = host.bootstrap_hook(class) {
        crate::fatal!("Bootstrap hook failed for class '{}': {}", descriptor.name, err);
    }

    if !runtime.options().check_host_type_size {
        return;
    }
    if let Some(size) = class.host_type().and_then(|host_type| host.host_type_size(host_type)) {
        if size != class.instance_alloc_size() {
            crate::fatal!(
                "Host type for {} readied with wrong alloc size ({} != {})",
                descriptor.name,
                size,
                class.instance_alloc_size()
            );
        }
    }
}
