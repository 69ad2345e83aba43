//! Unit tests for the provisioner registry.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use rstest::{fixture, rstest};

use super::*;
use crate::mock::MockProvisioner;

fn provisioner() -> Arc<dyn ResourceProvisioner> {
    Arc::new(MockProvisioner::new())
}

#[fixture]
fn registry() -> ProvisionerRegistry {
    ProvisionerRegistry::new()
}

// ---------------------------------------------------------------------------
// Generated names
// ---------------------------------------------------------------------------

#[rstest]
fn new_registry_is_empty(registry: ProvisionerRegistry) {
    assert!(registry.is_empty());
    assert_eq!(registry.len(), 0);
    assert!(registry.names().is_empty());
}

#[rstest]
fn register_generates_distinct_names(registry: ProvisionerRegistry) {
    let first = registry.register(provisioner()).expect("first");
    let second = registry.register(provisioner()).expect("second");
    assert_ne!(first, second);
    assert_eq!(first, "provisioner-1");
    assert_eq!(second, "provisioner-2");
    assert_eq!(registry.len(), 2);
}

#[rstest]
fn registered_name_resolves_to_same_instance(registry: ProvisionerRegistry) {
    let instance = provisioner();
    let name = registry.register(Arc::clone(&instance)).expect("register");
    let found = registry.get(&name).expect("lookup");
    assert!(Arc::ptr_eq(&found, &instance));
}

#[rstest]
fn get_returns_none_for_unknown(registry: ProvisionerRegistry) {
    registry.register(provisioner()).expect("register");
    assert!(registry.get("provisioner-99").is_none());
    assert!(!registry.contains("provisioner-99"));
}

#[rstest]
fn generated_names_skip_explicit_bindings(registry: ProvisionerRegistry) {
    registry
        .register_named("provisioner-1", provisioner())
        .expect("named");
    let generated = registry.register(provisioner()).expect("generated");
    assert_eq!(generated, "provisioner-2");
}

// ---------------------------------------------------------------------------
// Named registration
// ---------------------------------------------------------------------------

#[rstest]
fn register_named_rejects_duplicate(registry: ProvisionerRegistry) {
    registry
        .register_named("shell", provisioner())
        .expect("first");
    let error = registry
        .register_named("shell", provisioner())
        .expect_err("duplicate should fail");
    assert!(matches!(error, RegistryError::DuplicateName { .. }));
    assert_eq!(registry.len(), 1);
}

#[rstest]
#[case::empty("")]
#[case::blank("   ")]
fn register_named_rejects_blank(registry: ProvisionerRegistry, #[case] name: &str) {
    let error = registry
        .register_named(name, provisioner())
        .expect_err("blank should fail");
    assert!(matches!(error, RegistryError::InvalidName { .. }));
    assert!(registry.is_empty());
}

#[rstest]
fn names_are_sorted(registry: ProvisionerRegistry) {
    registry.register_named("zeta", provisioner()).expect("zeta");
    registry
        .register_named("alpha", provisioner())
        .expect("alpha");
    assert_eq!(registry.names(), ["alpha", "zeta"]);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_registration_yields_unique_names() {
    let registry = Arc::new(ProvisionerRegistry::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                (0..16)
                    .map(|_| registry.register(provisioner()).expect("register"))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut names = HashSet::new();
    for handle in handles {
        for name in handle.join().expect("join") {
            assert!(registry.contains(&name));
            assert!(names.insert(name), "duplicate name issued");
        }
    }
    assert_eq!(names.len(), 128);
    assert_eq!(registry.len(), 128);
}
