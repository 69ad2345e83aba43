//! Name table binding registered provisioners on a server.
//!
//! The [`ProvisionerRegistry`] maps generated names to implementations so one
//! server can multiplex many provisioners. Entries are only ever added; a
//! name, once issued, is never reused for the lifetime of the registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::contract::ResourceProvisioner;
use crate::error::RegistryError;

/// Tracing target for registry operations.
const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Prefix of generated provisioner names.
pub const NAME_PREFIX: &str = "provisioner";

/// Thread-safe table of registered provisioners.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tether_rpc::{
///     ProvisionerError, ProvisionerRegistry, ResourceConfig, ResourceProvisioner,
///     ResourceState, Validation,
/// };
///
/// struct Noop;
///
/// impl ResourceProvisioner for Noop {
///     fn validate(&self, _config: &ResourceConfig) -> Result<Validation, ProvisionerError> {
///         Ok(Validation::ok())
///     }
///     fn apply(
///         &self,
///         _state: &ResourceState,
///         _config: &ResourceConfig,
///     ) -> Result<(), ProvisionerError> {
///         Ok(())
///     }
///     fn stop(&self) -> Result<(), ProvisionerError> {
///         Ok(())
///     }
/// }
///
/// let registry = ProvisionerRegistry::new();
/// let first = registry.register(Arc::new(Noop)).expect("register");
/// let second = registry.register(Arc::new(Noop)).expect("register");
/// assert_ne!(first, second);
/// assert!(registry.get(&first).is_some());
/// ```
#[derive(Default)]
pub struct ProvisionerRegistry {
    entries: RwLock<HashMap<String, Arc<dyn ResourceProvisioner>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ProvisionerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionerRegistry")
            .field("names", &self.names())
            .finish_non_exhaustive()
    }
}

impl ProvisionerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an implementation under a freshly generated name.
    ///
    /// Names take the form `provisioner-<n>`. A generated name that collides
    /// with an explicitly registered one is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] if the name counter is
    /// exhausted.
    pub fn register(
        &self,
        provisioner: Arc<dyn ResourceProvisioner>,
    ) -> Result<String, RegistryError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == u64::MAX {
                return Err(RegistryError::InvalidName {
                    message: String::from("provisioner name counter exhausted"),
                });
            }
            let name = format!("{NAME_PREFIX}-{}", id + 1);
            if entries.contains_key(&name) {
                continue;
            }
            debug!(target: REGISTRY_TARGET, name = %name, "registered provisioner");
            entries.insert(name.clone(), provisioner);
            return Ok(name);
        }
    }

    /// Registers an implementation under a caller-chosen name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] for blank names and
    /// [`RegistryError::DuplicateName`] when the name is taken.
    pub fn register_named(
        &self,
        name: impl Into<String>,
        provisioner: Arc<dyn ResourceProvisioner>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidName {
                message: String::from("name must not be empty"),
            });
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&name) {
            return Err(RegistryError::DuplicateName { name });
        }
        debug!(target: REGISTRY_TARGET, name = %name, "registered named provisioner");
        entries.insert(name, provisioner);
        Ok(())
    }

    /// Looks up an implementation by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ResourceProvisioner>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Returns `true` if the name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Returns the registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Returns the number of registered provisioners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests;
