//! Runtime configuration

use serde::Deserialize;

/// Default number of registry buckets
pub const DEFAULT_REGISTRY_BUCKETS: usize = 256;

/// Default name of the root class reported in ancestry errors
pub const DEFAULT_ROOT_CLASS: &str = "Obj";

/// Options for a [`Runtime`](crate::Runtime)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Bucket count of the class registry (fixed for its lifetime)
    pub registry_buckets: usize,

    /// Root class name used in "doesn't descend from" errors
    pub root_class: String,

    /// Notify the host of a new dynamic subclass *before* inserting it
    /// locally, instead of after.
    ///
    /// With the default (`false`) there is a short window in which the class
    /// is visible in the registry but unknown to the host. With `true` the
    /// host may hear about a class that then loses the registration race, so
    /// it must tolerate duplicate notifications.
    pub close_host_registration_window: bool,

    /// Check host types associated during bootstrap against the class's
    /// instance size
    pub check_host_type_size: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            registry_buckets: DEFAULT_REGISTRY_BUCKETS,
            root_class: DEFAULT_ROOT_CLASS.to_string(),
            close_host_registration_window: false,
            check_host_type_size: true,
        }
    }
}

impl RuntimeOptions {
    /// Create options with a specific registry bucket count
    pub fn with_registry_buckets(registry_buckets: usize) -> Self {
        Self {
            registry_buckets: registry_buckets.max(1),
            ..Default::default()
        }
    }

    /// Create options with a specific root class name
    pub fn with_root_class(root_class: impl Into<String>) -> Self {
        Self {
            root_class: root_class.into(),
            ..Default::default()
        }
    }

    /// Register dynamic subclasses with the host before local insertion
    pub fn closing_registration_window(mut self) -> Self {
        self.close_host_registration_window = true;
        self
    }

    /// Parse options from JSON; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut options: RuntimeOptions = serde_json::from_str(json)?;
        options.registry_buckets = options.registry_buckets.max(1);
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RuntimeOptions::default();
        assert_eq!(options.registry_buckets, 256);
        assert_eq!(options.root_class, "Obj");
        assert!(!options.close_host_registration_window);
        assert!(options.check_host_type_size);
    }

    #[test]
    fn test_bucket_count_never_zero() {
        assert_eq!(RuntimeOptions::with_registry_buckets(0).registry_buckets, 1);
    }

    #[test]
    fn test_from_json_partial() {
        let options =
            RuntimeOptions::from_json(r#"{ "root_class": "Moray::Obj", "registry_buckets": 16 }"#)
                .unwrap();
        assert_eq!(options.root_class, "Moray::Obj");
        assert_eq!(options.registry_buckets, 16);
        assert!(options.check_host_type_size);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(RuntimeOptions::from_json("{ registry_buckets: }").is_err());
    }

    #[test]
    fn test_closing_registration_window() {
        let options = RuntimeOptions::with_root_class("Base").closing_registration_window();
        assert!(options.close_host_registration_window);
        assert_eq!(options.root_class, "Base");
    }
}
