//! Behaviour-driven tests for calls crossing the bridge.

use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::client::Client;
use crate::contract::{ResourceProvisioner, Validation};
use crate::error::{ApplicationError, ErrorKind, ProvisionerError};
use crate::mock::MockProvisioner;
use crate::proxy::ProvisionerProxy;
use crate::server::Server;
use crate::testing::connected_pair;
use crate::value::{ConfigValue, ResourceConfig, ResourceState};

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestWorld {
    warnings: Vec<String>,
    errors: Vec<ApplicationError>,
    apply_error: Option<ApplicationError>,
    bridge: Option<Bridge>,
    sent_config: Option<ResourceConfig>,
    validation: Option<Result<Validation, ProvisionerError>>,
    applied: Option<Result<(), ProvisionerError>>,
}

struct Bridge {
    client: Client,
    // Keeps the serving side alive for the scenario.
    _server: Server,
    mock: Arc<MockProvisioner>,
    name: String,
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl TestWorld {
    /// Registers the configured mock on a freshly connected server the first
    /// time a call is made.
    fn bridge(&mut self) -> &Bridge {
        if self.bridge.is_none() {
            let mut mock = MockProvisioner::new()
                .with_validate_warnings(self.warnings.clone())
                .with_validate_errors(self.errors.clone());
            if let Some(error) = self.apply_error.clone() {
                mock = mock.with_apply_error(error);
            }
            let mock = Arc::new(mock);
            let (client, server) = connected_pair().expect("connected pair");
            let name = server.register(mock.clone()).expect("register mock");
            self.bridge = Some(Bridge {
                client,
                _server: server,
                mock,
                name,
            });
        }
        self.bridge.as_ref().expect("bridge initialised")
    }

    fn proxy_for(&mut self, name: Option<&str>) -> ProvisionerProxy {
        let bridge = self.bridge();
        let name = name.map_or_else(|| bridge.name.clone(), str::to_owned);
        ProvisionerProxy::new(bridge.client.clone(), name)
    }

    fn validation(&self) -> &Validation {
        self.validation
            .as_ref()
            .expect("no validation captured")
            .as_ref()
            .expect("expected validation to succeed")
    }

    fn mock(&self) -> &MockProvisioner {
        &self.bridge.as_ref().expect("no bridge").mock
    }
}

fn foo_config(value: &str) -> ResourceConfig {
    ResourceConfig::from_iter([("foo", ConfigValue::from(value))])
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a mock provisioner")]
fn given_mock(world: &mut TestWorld) {
    world.warnings.clear();
    world.errors.clear();
}

#[given("the mock reports the validation error {message}")]
fn given_validation_error(world: &mut TestWorld, message: String) {
    world
        .errors
        .push(ApplicationError::new(message.trim_matches('"')));
}

#[given("the mock reports the validation warning {message}")]
fn given_validation_warning(world: &mut TestWorld, message: String) {
    world.warnings.push(message.trim_matches('"').to_owned());
}

#[given("the mock fails apply with {message}")]
fn given_apply_error(world: &mut TestWorld, message: String) {
    world.apply_error = Some(ApplicationError::new(message.trim_matches('"')));
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("validate is called with foo set to {value}")]
fn when_validate(world: &mut TestWorld, value: String) {
    let config = foo_config(value.trim_matches('"'));
    let proxy = world.proxy_for(None);
    world.validation = Some(proxy.validate(&config));
    world.sent_config = Some(config);
}

#[when("apply is called with an empty state and configuration")]
fn when_apply(world: &mut TestWorld) {
    let config = ResourceConfig::default();
    let proxy = world.proxy_for(None);
    world.applied = Some(proxy.apply(&ResourceState::default(), &config));
    world.sent_config = Some(config);
}

#[when("validate is called on the unregistered name {name}")]
fn when_validate_unknown(world: &mut TestWorld, name: String) {
    let proxy = world.proxy_for(Some(name.trim_matches('"')));
    world.validation = Some(proxy.validate(&foo_config("bar")));
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the proxy reports {errors} error(s) and {warnings} warning(s)")]
fn then_cardinality(world: &mut TestWorld, errors: usize, warnings: usize) {
    let validation = world.validation();
    assert_eq!(validation.errors().len(), errors, "errors: {:?}", validation.errors());
    assert_eq!(
        validation.warnings().len(),
        warnings,
        "warnings: {:?}",
        validation.warnings()
    );
}

#[then("the first error is {message}")]
fn then_first_error(world: &mut TestWorld, message: String) {
    let validation = world.validation();
    assert_eq!(
        validation.errors().first().map(ApplicationError::message),
        Some(message.trim_matches('"'))
    );
}

#[then("the first warning is {message}")]
fn then_first_warning(world: &mut TestWorld, message: String) {
    let validation = world.validation();
    assert_eq!(
        validation.warnings().first().map(String::as_str),
        Some(message.trim_matches('"'))
    );
}

#[then("the mock recorded a validate call with foo set to {value}")]
fn then_validate_recorded(world: &mut TestWorld, value: String) {
    let mock = world.mock();
    assert!(mock.validate_called());
    assert_eq!(mock.validate_config(), Some(foo_config(value.trim_matches('"'))));
}

#[then("the apply call succeeds")]
fn then_apply_succeeds(world: &mut TestWorld) {
    let result = world.applied.as_ref().expect("no apply captured");
    assert!(result.is_ok(), "apply failed: {result:?}");
}

#[then("the mock recorded the apply call with the configuration sent")]
fn then_apply_recorded(world: &mut TestWorld) {
    let mock = world.mock();
    assert!(mock.apply_called());
    assert_eq!(mock.apply_state(), Some(ResourceState::default()));
    assert_eq!(mock.apply_config(), world.sent_config);
}

#[then("the apply call fails with the application error {message}")]
fn then_apply_fails(world: &mut TestWorld, message: String) {
    let error = world
        .applied
        .as_ref()
        .expect("no apply captured")
        .as_ref()
        .expect_err("expected apply to fail");
    assert_eq!(error.kind(), ErrorKind::Application);
    assert_eq!(error.to_string(), message.trim_matches('"'));
}

#[then("the call fails with a protocol error")]
fn then_protocol_error(world: &mut TestWorld) {
    let error = world
        .validation
        .as_ref()
        .expect("no validation captured")
        .as_ref()
        .expect_err("expected validation to fail");
    assert_eq!(error.kind(), ErrorKind::Protocol, "got: {error}");
}

#[then("a following validate call on the registered name succeeds")]
fn then_server_still_usable(world: &mut TestWorld) {
    let proxy = world.proxy_for(None);
    let validation = proxy.validate(&foo_config("bar")).expect("validate");
    assert!(validation.is_valid());
    assert!(world.mock().validate_called());
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/provisioner_bridge.feature",
    name = "Validating a clean configuration"
)]
fn clean_validation(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/provisioner_bridge.feature",
    name = "A single validation error keeps its cardinality"
)]
fn single_validation_error(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/provisioner_bridge.feature",
    name = "A single validation warning keeps its cardinality"
)]
fn single_validation_warning(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/provisioner_bridge.feature",
    name = "Applying an empty state and configuration"
)]
fn empty_apply(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/provisioner_bridge.feature",
    name = "Applying reports a single application error"
)]
fn apply_application_error(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/provisioner_bridge.feature",
    name = "Calling a name that was never registered"
)]
fn unknown_target(world: TestWorld) {
    drop(world);
}
