//! Dynamic subclassing
//!
//! Builds class records at run time for classes defined in a host language.
//! The new record is a clone of its parent's with a new name; any ancestor
//! method the host class overrides gets the method's host-forwarding callback
//! installed in its slot. Ancestors that are themselves host classes are
//! resolved first, recursively.

use crate::class::ClassRef;
use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::Runtime;
use std::sync::Arc;

/// Fetch the class registered as `class_name`, creating it as a subclass of
/// `parent` if needed.
///
/// Without an explicit parent the host is asked for one. Concurrent requests
/// for the same name all receive the same record.
pub fn singleton(
    runtime: &Runtime,
    class_name: &str,
    parent: Option<ClassRef>,
) -> RuntimeResult<ClassRef> {
    let mut chain = Vec::new();
    resolve(runtime, class_name, parent, &mut chain)
}

fn resolve(
    runtime: &Runtime,
    class_name: &str,
    parent: Option<ClassRef>,
    chain: &mut Vec<String>,
) -> RuntimeResult<ClassRef> {
    let registry = runtime.registry();
    if let Some(existing) = registry.fetch(class_name) {
        return Ok(existing);
    }

    let looped = chain.iter().any(|seen| seen == class_name);
    chain.push(class_name.to_string());
    if looped {
        return Err(RuntimeError::AncestryCycle {
            class: chain[0].clone(),
            chain: std::mem::take(chain),
        });
    }

    let host = runtime.host();
    let parent = match parent {
        Some(parent) => parent,
        None => match host.find_parent_class(class_name)? {
            Some(parent_name) => resolve(runtime, &parent_name, None, chain)?,
            None => {
                return Err(RuntimeError::NoAncestor {
                    class: class_name.to_string(),
                    root: runtime.options().root_class.clone(),
                })
            }
        },
    };

    let mut subclass = parent
        .clone_record()
        .into_subclass(class_name, Arc::clone(&parent));

    let fresh = host.fresh_host_methods(class_name)?;
    if !fresh.is_empty() {
        for ancestor in parent.ancestors() {
            for method in ancestor.fresh_methods() {
                let Some(callback) = method.callback() else {
                    continue;
                };
                let host_name = host.method_host_name(method)?;
                if fresh.iter().any(|name| *name == host_name) {
                    subclass.override_method(callback, method.offset());
                }
            }
        }
    }

    let subclass = Arc::new(subclass);
    let close_window = runtime.options().close_host_registration_window;
    if close_window {
        host.register_with_host(&subclass, &parent)?;
    }

    if !registry.insert_class(&subclass) {
        tracing::trace!(class = class_name, "lost subclass registration race");
        return registry
            .fetch(class_name)
            .ok_or_else(|| RuntimeError::RegistryInconsistent {
                class: class_name.to_string(),
            });
    }

    if !close_window {
        // Visible locally before the host hears about it
        host.register_with_host(&subclass, &parent)?;
    }

    tracing::debug!(
        class = class_name,
        parent = parent.name(),
        slots = subclass.vtable().len(),
        "created dynamic subclass"
    );
    Ok(subclass)
}
