//! Error types and the fatal-abort path
//!
//! Two kinds of failure exist in the runtime:
//!
//! - **Reported errors** ([`RuntimeError`], [`HostError`]) travel up the call
//!   chain as ordinary `Result` values until they reach the host-facing
//!   boundary.
//! - **Fatal conditions** signal a corrupt class record or a programmer error
//!   (destroying a class, patching a vtable slot out of bounds, ...). They go
//!   through [`fatal!`](crate::fatal), which logs and panics at the point of
//!   detection. Release builds abort; a supervising host may trap the panic and
//!   re-raise it as a host exception.

use crate::host::HostHandle;

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// A dynamic subclass request named a class with no resolvable ancestor
    #[error("Class '{class}' doesn't descend from {root}")]
    NoAncestor {
        /// Requested class name
        class: String,
        /// Name of the expected root class
        root: String,
    },

    /// The host reported an ancestry chain that loops back on itself
    #[error("Class '{class}' has a cyclic ancestry: {}", chain.join(" -> "))]
    AncestryCycle {
        /// Requested class name
        class: String,
        /// Chain of class names visited before the cycle closed
        chain: Vec<String>,
    },

    /// Registration lost a race but the winner could not be fetched
    #[error("Failed to either insert or fetch Class for '{class}'")]
    RegistryInconsistent {
        /// Class name
        class: String,
    },

    /// No class with this name is registered
    #[error("Class '{class}' is not registered")]
    UnknownClass {
        /// Class name
        class: String,
    },

    /// No method with this name exists anywhere in the ancestor chain
    #[error("Class '{class}' has no method '{method}'")]
    UnknownMethod {
        /// Class name
        class: String,
        /// Method name
        method: String,
    },

    /// A method name cannot be converted to a host name
    #[error("Can't lowercase '{name}'")]
    NonAsciiMethodName {
        /// Method name
        name: String,
    },

    /// A host collaborator failed to produce required data
    #[error("Host error: {0}")]
    Host(#[from] HostError),
}

/// Errors produced by host-language collaborators
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The host does not implement this operation
    #[error("Host does not support '{operation}'")]
    Unsupported {
        /// Operation name
        operation: &'static str,
    },

    /// The handle does not refer to a live host object
    #[error("Unknown host handle {0:?}")]
    UnknownHandle(HostHandle),

    /// Host-side failure
    #[error("{0}")]
    Failed(String),
}

impl HostError {
    /// Build an `Unsupported` error for the named operation
    pub fn unsupported(operation: &'static str) -> Self {
        HostError::Unsupported { operation }
    }
}

impl From<String> for HostError {
    fn from(s: String) -> Self {
        HostError::Failed(s)
    }
}

impl From<&str> for HostError {
    fn from(s: &str) -> Self {
        HostError::Failed(s.to_string())
    }
}

/// Abort on a condition that leaves a class record or object corrupt.
///
/// Logs the message at `error` level, then panics with it.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        let message = ::std::format!($($arg)*);
        $crate::__private::tracing::error!("{}", message);
        ::std::panic!("{}", message)
    }};
}
