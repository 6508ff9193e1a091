//! Dual-mode reference counting
//!
//! Every object header holds exactly one lifetime representation:
//!
//! ```text
//! Native(n)  ── to_host ──►  Delegated(handle)
//!     │                           │
//!     │ release to 0              │ host count reaches 0 (host-driven)
//!     ▼                           ▼
//!  Destroyed  ◄───────────────────┘
//! ```
//!
//! In native mode the count lives in the header. In delegated mode a host
//! object owns the count and `retain`/`release` are forwarded to the host;
//! the host triggers destruction through its own mechanism.
//!
//! The `Native → Delegated` step happens at most once per object and is
//! arbitrated by compare-and-swap on the header word. A thread that loses the
//! swap defuses the host object it created and uses the winner's.
//!
//! Immortal classes (class records, method records, and classes flagged
//! [`ClassFlags::IMMORTAL`](crate::class::ClassFlags::IMMORTAL)) ignore
//! retain/release entirely.

use crate::error::RuntimeResult;
use crate::host::{Host, HostHandle};
use crate::object::Obj;
use crossbeam::atomic::AtomicCell;

/// Lifetime representation stored in an object header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefState {
    /// Count kept in the header
    Native(u32),
    /// Count kept by a host object
    Delegated(HostHandle),
    /// Object has been destroyed
    Destroyed,
}

/// Refcount word shared by every object
#[derive(Debug)]
pub struct ObjHeader {
    state: AtomicCell<RefState>,
}

impl ObjHeader {
    /// Header of zeroed memory (count 0, not yet initialized)
    pub(crate) fn blank() -> Self {
        Self {
            state: AtomicCell::new(RefState::Native(0)),
        }
    }

    /// Header of a freshly made object (count 1)
    pub(crate) fn native() -> Self {
        Self {
            state: AtomicCell::new(RefState::Native(1)),
        }
    }

    /// Header of an object whose lifetime a host object already owns
    pub(crate) fn delegated(handle: HostHandle) -> Self {
        Self {
            state: AtomicCell::new(RefState::Delegated(handle)),
        }
    }

    /// Initialize a blank header to a native count of 1
    pub(crate) fn init(&self) {
        self.state.store(RefState::Native(1));
    }

    /// Current state
    pub fn state(&self) -> RefState {
        self.state.load()
    }

    /// Host handle if the header is in delegated mode
    pub fn host_handle(&self) -> Option<HostHandle> {
        match self.state() {
            RefState::Delegated(handle) => Some(handle),
            _ => None,
        }
    }

    /// Check if the object has been destroyed
    pub fn is_destroyed(&self) -> bool {
        self.state() == RefState::Destroyed
    }

    pub(crate) fn compare_exchange(
        &self,
        current: RefState,
        new: RefState,
    ) -> Result<RefState, RefState> {
        self.state.compare_exchange(current, new)
    }
}

/// Anything that carries an [`ObjHeader`]
pub trait Lifetime {
    /// The refcount header
    fn header(&self) -> &ObjHeader;

    /// Immortal values ignore retain/release and are never destroyed by them
    fn is_immortal(&self) -> bool;

    /// Run destruction
    fn destroy(&self);

    /// Short description for diagnostics
    fn describe(&self) -> String;
}

/// Take a reference
pub fn retain<T: Lifetime + ?Sized>(host: &dyn Host, target: &T) {
    if target.is_immortal() {
        return;
    }
    let header = target.header();
    loop {
        match header.state() {
            RefState::Native(0) | RefState::Destroyed => {
                crate::fatal!("Illegal refcount of 0 for {}", target.describe())
            }
            RefState::Native(n) => {
                let Some(next) = n.checked_add(1) else {
                    crate::fatal!("Refcount overflow for {}", target.describe())
                };
                if header
                    .compare_exchange(RefState::Native(n), RefState::Native(next))
                    .is_ok()
                {
                    return;
                }
            }
            RefState::Delegated(handle) => {
                host.retain(handle);
                return;
            }
        }
    }
}

/// Drop a reference, returning the count after the release.
///
/// In native mode, releasing the last reference destroys the target before
/// returning 0. In delegated mode the count is the one the host reports
/// after its own decrement. Immortal targets always report 1.
pub fn release<T: Lifetime + ?Sized>(host: &dyn Host, target: &T) -> u32 {
    if target.is_immortal() {
        return 1;
    }
    let header = target.header();
    loop {
        match header.state() {
            RefState::Native(0) | RefState::Destroyed => {
                crate::fatal!("Illegal refcount of 0 for {}", target.describe())
            }
            RefState::Native(1) => {
                if header
                    .compare_exchange(RefState::Native(1), RefState::Native(0))
                    .is_ok()
                {
                    target.destroy();
                    return 0;
                }
            }
            RefState::Native(n) => {
                if header
                    .compare_exchange(RefState::Native(n), RefState::Native(n - 1))
                    .is_ok()
                {
                    return n - 1;
                }
            }
            RefState::Delegated(handle) => {
                // The host runs destruction itself if its count hits zero
                return host.release(handle);
            }
        }
    }
}

/// Current count. Immortal targets always report 1.
pub fn refcount<T: Lifetime + ?Sized>(host: &dyn Host, target: &T) -> u32 {
    if target.is_immortal() {
        return 1;
    }
    match target.header().state() {
        RefState::Native(n) => n,
        RefState::Delegated(handle) => host.refcount(handle),
        RefState::Destroyed => 0,
    }
}

/// Hand `obj` to the host, returning a new host reference the caller owns.
///
/// The first call on a native-mode object asks the host to adopt it: the host
/// object receives the accumulated native count plus one for the returned
/// reference, and the header switches to delegated mode. Later calls just
/// take another host reference.
pub fn to_host(host: &dyn Host, obj: &Obj) -> RuntimeResult<HostHandle> {
    let header = obj.header();
    loop {
        match header.state() {
            RefState::Delegated(handle) => {
                host.retain(handle);
                return Ok(handle);
            }
            RefState::Native(0) | RefState::Destroyed => {
                crate::fatal!("Can't hand {} to the host: refcount is 0", obj.describe())
            }
            RefState::Native(count) => {
                let Some(handed) = count.checked_add(1) else {
                    crate::fatal!("Refcount overflow for {}", obj.describe())
                };
                let adopted = host.adopt(obj, handed)?;
                match header.compare_exchange(RefState::Native(count), RefState::Delegated(adopted)) {
                    Ok(_) => return Ok(adopted),
                    Err(RefState::Delegated(winner)) => {
                        tracing::trace!(
                            class = obj.class().name(),
                            "lost host adoption race, defusing duplicate host object"
                        );
                        host.defuse(adopted);
                        host.retain(winner);
                        return Ok(winner);
                    }
                    Err(RefState::Native(_)) => {
                        // Count moved underneath us; the transferred count is stale
                        host.defuse(adopted);
                    }
                    Err(RefState::Destroyed) => {
                        host.defuse(adopted);
                        crate::fatal!("{} destroyed while being handed to the host", obj.describe())
                    }
                }
            }
        }
    }
}

/// Resolve a host handle back to the object it carries.
///
/// The returned handle borrows: no reference is taken.
pub fn from_host(host: &dyn Host, handle: HostHandle) -> RuntimeResult<Obj> {
    host.lookup(handle)
        .ok_or_else(|| crate::error::HostError::UnknownHandle(handle).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counted {
        header: ObjHeader,
        immortal: bool,
        destroyed: AtomicUsize,
    }

    impl Counted {
        fn new(immortal: bool) -> Self {
            Self {
                header: ObjHeader::native(),
                immortal,
                destroyed: AtomicUsize::new(0),
            }
        }
    }

    impl Lifetime for Counted {
        fn header(&self) -> &ObjHeader {
            &self.header
        }

        fn is_immortal(&self) -> bool {
            self.immortal
        }

        fn destroy(&self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }

        fn describe(&self) -> String {
            "counted".to_string()
        }
    }

    #[test]
    fn test_retain_release_native() {
        let host = NullHost;
        let target = Counted::new(false);

        retain(&host, &target);
        retain(&host, &target);
        assert_eq!(refcount(&host, &target), 3);

        assert_eq!(release(&host, &target), 2);
        assert_eq!(release(&host, &target), 1);
        assert_eq!(target.destroyed.load(Ordering::SeqCst), 0);

        assert_eq!(release(&host, &target), 0);
        assert_eq!(target.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_immortal_ignores_counts() {
        let host = NullHost;
        let target = Counted::new(true);

        for _ in 0..5 {
            assert_eq!(release(&host, &target), 1);
        }
        retain(&host, &target);
        assert_eq!(refcount(&host, &target), 1);
        assert_eq!(target.destroyed.load(Ordering::SeqCst), 0);
        assert_eq!(target.header().state(), RefState::Native(1));
    }

    #[test]
    #[should_panic(expected = "Illegal refcount of 0")]
    fn test_retain_blank_header_is_fatal() {
        let host = NullHost;
        let target = Counted {
            header: ObjHeader::blank(),
            immortal: false,
            destroyed: AtomicUsize::new(0),
        };
        retain(&host, &target);
    }

    #[test]
    #[should_panic(expected = "Refcount overflow for counted")]
    fn test_retain_at_max_count_is_fatal() {
        let host = NullHost;
        let target = Counted {
            header: ObjHeader {
                state: AtomicCell::new(RefState::Native(u32::MAX)),
            },
            immortal: false,
            destroyed: AtomicUsize::new(0),
        };
        retain(&host, &target);
    }

    #[test]
    fn test_header_states() {
        let header = ObjHeader::blank();
        assert_eq!(header.state(), RefState::Native(0));
        header.init();
        assert_eq!(header.state(), RefState::Native(1));
        assert_eq!(header.host_handle(), None);

        let handle = HostHandle::new(9);
        let header = ObjHeader::delegated(handle);
        assert_eq!(header.host_handle(), Some(handle));
        assert!(!header.is_destroyed());
    }
}
