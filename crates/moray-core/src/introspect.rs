//! Serializable class snapshots for binding generators

use crate::bootstrap::ParcelId;
use crate::class::Class;
use crate::method::Method;
use serde::Serialize;

/// Snapshot of one fresh method
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodInfo {
    /// Method name
    pub name: String,
    /// Host-visible alias
    pub host_alias: Option<String>,
    /// Vtable byte offset
    pub offset: usize,
    /// Host subclasses may override it
    pub overridable: bool,
    /// Hidden from binding generators
    pub excluded: bool,
}

impl MethodInfo {
    /// Snapshot a method record
    pub fn from_method(method: &Method) -> Self {
        Self {
            name: method.name().to_string(),
            host_alias: method.host_alias(),
            offset: method.offset().bytes(),
            overridable: method.callback().is_some(),
            excluded: method.is_excluded(),
        }
    }
}

/// Snapshot of a class record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassInfo {
    /// Class name
    pub name: String,
    /// Parent class name
    pub parent: Option<String>,
    /// Parcel the record was laid out in
    pub parcel: ParcelId,
    /// Flag bits
    pub flags: u32,
    /// Instance size in bytes
    pub instance_alloc_size: usize,
    /// Class record size in bytes
    pub class_record_alloc_size: usize,
    /// Number of vtable slots
    pub vtable_slots: usize,
    /// Fresh methods
    pub methods: Vec<MethodInfo>,
}

impl ClassInfo {
    /// Snapshot a class record
    pub fn from_class(class: &Class) -> Self {
        Self {
            name: class.name().to_string(),
            parent: class.parent().map(|parent| parent.name().to_string()),
            parcel: class.parcel_id(),
            flags: class.flags().bits(),
            instance_alloc_size: class.instance_alloc_size(),
            class_record_alloc_size: class.class_record_alloc_size(),
            vtable_slots: class.vtable().len(),
            methods: class
                .fresh_methods()
                .iter()
                .map(|method| MethodInfo::from_method(method))
                .collect(),
        }
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
