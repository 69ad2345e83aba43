//! Crate-level end-to-end and BDD tests.

use std::sync::Arc;

use crate::contract::ResourceProvisioner;
use crate::mock::MockProvisioner;
use crate::proxy::ProvisionerProxy;
use crate::testing::connected_pair;
use crate::value::{ConfigValue, ResourceConfig, ResourceState};

mod behaviour;

#[test]
fn end_to_end_apply_through_loopback() {
    let (client, server) = connected_pair().expect("connected pair");
    let mock = Arc::new(MockProvisioner::new());
    let name = server.register(mock.clone()).expect("register");
    let proxy = ProvisionerProxy::new(client, name);

    let state = ResourceState::new("i-abc123")
        .with_type("aws_instance")
        .with_attribute("ami", "ami-0abc");
    let config = ResourceConfig::from_iter([
        ("inline", ConfigValue::from(vec![ConfigValue::from("echo hi")])),
        ("retries", ConfigValue::from(3_u64)),
    ]);
    proxy.apply(&state, &config).expect("apply");

    assert!(mock.apply_called());
    assert_eq!(mock.apply_state(), Some(state));
    assert_eq!(mock.apply_config(), Some(config));
}
