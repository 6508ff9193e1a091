//! Lock-free class registry
//!
//! A fixed array of bucket heads, each a singly linked chain of entries.
//! Readers walk chains with acquire loads and never block. Writers append at
//! a chain's tail with compare-and-swap; the first writer for a key wins and
//! every later insert for that key is rejected. Entries are never removed
//! while the registry is alive.

use crate::class::ClassRef;
use crate::options::DEFAULT_REGISTRY_BUCKETS;
use rustc_hash::FxHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

struct Entry {
    key: String,
    value: ClassRef,
    next: AtomicPtr<Entry>,
}

/// Insert-once map from class name to class record
pub struct ClassRegistry {
    buckets: Box<[AtomicPtr<Entry>]>,
    len: AtomicUsize,
}

impl ClassRegistry {
    /// Create a registry with the default bucket count
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_REGISTRY_BUCKETS)
    }

    /// Create a registry with `buckets` chains (at least one)
    pub fn with_buckets(buckets: usize) -> Self {
        let buckets = (0..buckets.max(1))
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        Self {
            buckets,
            len: AtomicUsize::new(0),
        }
    }

    fn bucket(&self, key: &str) -> &AtomicPtr<Entry> {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.buckets.len();
        &self.buckets[index]
    }

    /// Class registered under `key`
    pub fn fetch(&self, key: &str) -> Option<ClassRef> {
        self.entries(self.bucket(key))
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.clone())
    }

    /// Register `value` under `key`.
    ///
    /// Returns `false`, leaving the registry untouched, if `key` is already
    /// taken.
    pub fn register(&self, key: &str, value: &ClassRef) -> bool {
        let mut candidate = Some(Box::new(Entry {
            key: key.to_string(),
            value: value.clone(),
            next: AtomicPtr::new(ptr::null_mut()),
        }));
        let mut link = self.bucket(key);
        loop {
            let current = link.load(Ordering::Acquire);
            if current.is_null() {
                let Some(entry) = candidate.take() else {
                    return false;
                };
                let raw = Box::into_raw(entry);
                match link.compare_exchange(
                    ptr::null_mut(),
                    raw,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        self.len.fetch_add(1, Ordering::Relaxed);
                        return true;
                    }
                    Err(_) => {
                        // SAFETY: `raw` came from Box::into_raw above and was
                        // never published
                        candidate = Some(unsafe { Box::from_raw(raw) });
                        // Another writer extended this link; re-examine it
                        continue;
                    }
                }
            }
            // SAFETY: published entries are freed only in Drop, which needs
            // exclusive access
            let entry = unsafe { &*current };
            if entry.key == key {
                return false;
            }
            link = &entry.next;
        }
    }

    /// Register a class under its own name
    pub fn insert_class(&self, class: &ClassRef) -> bool {
        self.register(class.name(), class)
    }

    /// Register a class under an additional name
    pub fn insert_alias(&self, class: &ClassRef, alias: &str) -> bool {
        self.register(alias, class)
    }

    /// Number of registered keys (aliases included)
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Check if nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered keys, in no particular order
    pub fn names(&self) -> Vec<String> {
        self.buckets
            .iter()
            .flat_map(|head| self.entries(head))
            .map(|entry| entry.key.clone())
            .collect()
    }

    fn entries<'a>(&'a self, head: &'a AtomicPtr<Entry>) -> impl Iterator<Item = &'a Entry> + 'a {
        let first = head.load(Ordering::Acquire);
        std::iter::successors(
            // SAFETY: see `register`
            unsafe { first.as_ref() },
            |entry| unsafe { entry.next.load(Ordering::Acquire).as_ref() },
        )
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ClassRegistry {
    fn drop(&mut self) {
        for head in self.buckets.iter_mut() {
            let mut current = std::mem::replace(head.get_mut(), ptr::null_mut());
            while !current.is_null() {
                // SAFETY: every non-null link was produced by Box::into_raw
                // and is reachable from exactly one link
                let mut entry = unsafe { Box::from_raw(current) };
                current = std::mem::replace(entry.next.get_mut(), ptr::null_mut());
            }
        }
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("buckets", &self.buckets.len())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::ParcelId;
    use crate::class::{Class, ClassFlags};
    use crate::vtable::Vtable;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn class(name: &str) -> ClassRef {
        let class = Class::laid_out(None, ParcelId::claim(), ClassFlags::NONE, 16, Vtable::new(), None);
        class.assign_name(name);
        Arc::new(class)
    }

    #[test]
    fn test_insert_and_fetch() {
        let registry = ClassRegistry::new();
        let foo = class("Foo");
        assert!(registry.is_empty());
        assert!(registry.insert_class(&foo));
        assert!(Arc::ptr_eq(&registry.fetch("Foo").unwrap(), &foo));
        assert!(registry.fetch("Bar").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_first_writer_wins() {
        let registry = ClassRegistry::new();
        let first = class("Foo");
        let second = class("Foo");
        assert!(registry.insert_class(&first));
        assert!(!registry.insert_class(&second));
        assert!(Arc::ptr_eq(&registry.fetch("Foo").unwrap(), &first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_single_bucket_chains() {
        let registry = ClassRegistry::with_buckets(1);
        for name in ["A", "B", "C", "D"] {
            assert!(registry.insert_class(&class(name)));
        }
        for name in ["A", "B", "C", "D"] {
            assert_eq!(registry.fetch(name).unwrap().name(), name);
        }
        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_alias() {
        let registry = ClassRegistry::new();
        let foo = class("Foo");
        registry.insert_class(&foo);
        assert!(registry.insert_alias(&foo, "Foo::Legacy"));
        assert!(Arc::ptr_eq(&registry.fetch("Foo::Legacy").unwrap(), &foo));
        assert!(!registry.insert_alias(&foo, "Foo"));
    }

    #[test]
    fn test_zero_buckets_clamped() {
        let registry = ClassRegistry::with_buckets(0);
        assert!(registry.insert_class(&class("Only")));
        assert!(registry.fetch("Only").is_some());
    }

    #[test]
    fn test_concurrent_insert_same_key() {
        let registry = Arc::new(ClassRegistry::with_buckets(4));
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let candidate = class("Contested");
                    barrier.wait();
                    registry.insert_class(&candidate)
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_insert_distinct_keys() {
        let registry = Arc::new(ClassRegistry::with_buckets(2));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..50 {
                        assert!(registry.insert_class(&class(&format!("C{}_{}", t, i))));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 200);
        assert!(registry.fetch("C3_49").is_some());
    }
}
