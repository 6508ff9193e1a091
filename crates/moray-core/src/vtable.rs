//! Vtable storage and the slot override primitive
//!
//! A vtable is the trailing part of a class record: one slot per method
//! declared novel anywhere in the ancestor chain. A child starts as a copy of
//! its parent's table and only ever grows at the end, so every parent slot
//! keeps its offset in all descendants.
//!
//! [`Vtable::override_slot`] is the only operation that changes what a slot
//! dispatches to. It takes `&mut self`; once a class record is shared its
//! table can no longer be patched.

use crate::method::{MethodFn, SlotOffset, CLASS_HEADER_SIZE, SLOT_SIZE};
use std::fmt;

/// Method table of a class record
#[derive(Clone, Default)]
pub struct Vtable {
    slots: Vec<MethodFn>,
}

impl Vtable {
    /// Create an empty vtable
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Copy a parent's table verbatim
    pub fn inherit(parent: &Vtable) -> Self {
        Self {
            slots: parent.slots.clone(),
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the table has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Size of the table in bytes
    pub fn byte_len(&self) -> usize {
        self.slots.len() * SLOT_SIZE
    }

    /// Offset the next novel method will receive
    pub fn next_offset(&self) -> SlotOffset {
        SlotOffset::from_index(self.slots.len())
    }

    /// Append a novel method, returning its offset
    pub fn push(&mut self, func: MethodFn) -> SlotOffset {
        let offset = self.next_offset();
        self.slots.push(func);
        offset
    }

    /// Implementation installed at `offset`
    pub fn get(&self, offset: SlotOffset) -> Option<MethodFn> {
        offset.index().and_then(|index| self.slots.get(index).copied())
    }

    /// Implementation installed at `offset`; aborts if the offset is not a slot
    pub fn slot(&self, offset: SlotOffset) -> MethodFn {
        match self.get(offset) {
            Some(func) => func,
            None => crate::fatal!(
                "Vtable offset {} out of bounds (table spans {}..{})",
                offset,
                CLASS_HEADER_SIZE,
                CLASS_HEADER_SIZE + self.byte_len()
            ),
        }
    }

    /// Install `func` at `offset`.
    ///
    /// Offsets must come from the layout pass; anything past the end of the
    /// table or not on a slot boundary aborts.
    pub fn override_slot(&mut self, offset: SlotOffset, func: MethodFn) {
        let byte_len = self.byte_len();
        match offset.index().and_then(|index| self.slots.get_mut(index)) {
            Some(slot) => *slot = func,
            None => crate::fatal!(
                "Refusing to override vtable offset {} (table spans {}..{})",
                offset,
                CLASS_HEADER_SIZE,
                CLASS_HEADER_SIZE + byte_len
            ),
        }
    }

    /// Whether `self` and `other` dispatch `offset` to the same function
    pub fn same_slot(&self, other: &Vtable, offset: SlotOffset) -> bool {
        match (self.get(offset), other.get(offset)) {
            (Some(a), Some(b)) => std::ptr::fn_addr_eq(a, b),
            _ => false,
        }
    }

    /// Whether the first `prefix.len()` slots of `self` equal `prefix`
    pub fn extends(&self, prefix: &Vtable) -> bool {
        prefix.slots.len() <= self.slots.len()
            && prefix
                .slots
                .iter()
                .zip(&self.slots)
                .all(|(a, b)| std::ptr::fn_addr_eq(*a, *b))
    }

    /// Iterate over `(offset, implementation)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (SlotOffset, MethodFn)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, func)| (SlotOffset::from_index(index), *func))
    }
}

impl PartialEq for Vtable {
    fn eq(&self, other: &Self) -> bool {
        self.slots.len() == other.slots.len() && self.extends(other)
    }
}

impl fmt::Debug for Vtable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.slots.iter().map(|func| *func as *const ()))
            .finish()
    }
}
