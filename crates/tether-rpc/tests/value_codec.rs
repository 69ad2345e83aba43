//! Wire round trips for the values handed across the bridge.

use std::collections::BTreeMap;

use rstest::rstest;
use tether_rpc::codec::{decode_line, encode_line};
use tether_rpc::{
    ApplicationError, AttributeDiff, ConfigValue, DiffAttrType, ResourceConfig, ResourceDiff,
    ResourceState, Validation,
};

fn nested_config() -> ResourceConfig {
    let mut connection = BTreeMap::new();
    connection.insert(String::from("host"), ConfigValue::from("10.0.0.5"));
    connection.insert(String::from("port"), ConfigValue::from(22_u64));
    connection.insert(String::from("insecure"), ConfigValue::from(false));
    ResourceConfig::from_iter([
        ("connection", ConfigValue::from(connection)),
        (
            "inline",
            ConfigValue::from(vec![
                ConfigValue::from("apt-get update"),
                ConfigValue::from(vec![ConfigValue::from(-1_i64)]),
            ]),
        ),
        ("ratio", ConfigValue::float(0.25).expect("finite")),
    ])
    .with_computed_keys(["connection.host"])
}

#[rstest]
#[case::empty(ResourceConfig::default())]
#[case::nested(nested_config())]
fn config_round_trips(#[case] config: ResourceConfig) {
    let line = encode_line(&config).expect("encode");
    let back: ResourceConfig = decode_line(&line).expect("decode");
    assert_eq!(back, config);
}

#[test]
fn nested_paths_survive_round_trip() {
    let line = encode_line(&nested_config()).expect("encode");
    let back: ResourceConfig = decode_line(&line).expect("decode");
    assert_eq!(back.get("connection.port"), Some(&ConfigValue::from(22_u64)));
    assert_eq!(back.get("inline.1.0"), Some(&ConfigValue::from(-1_i64)));
    assert!(back.is_computed("connection.host"));
}

#[test]
fn state_round_trips() {
    let state = ResourceState::new("i-abc")
        .with_type("aws_instance")
        .with_attribute("public_ip", "203.0.113.7");
    let line = encode_line(&state).expect("encode");
    let back: ResourceState = decode_line(&line).expect("decode");
    assert_eq!(back, state);
}

#[test]
fn diff_round_trips() {
    let mut replaced = AttributeDiff::new("ami-1", "ami-2");
    replaced.requires_new = true;
    replaced.kind = DiffAttrType::Input;
    let mut attributes = BTreeMap::new();
    attributes.insert(String::from("ami"), replaced);
    let diff = ResourceDiff::new(attributes);

    let line = encode_line(&diff).expect("encode");
    let back: ResourceDiff = decode_line(&line).expect("decode");
    assert_eq!(back, diff);
    assert!(back.requires_new());
}

#[rstest]
#[case::clean(Validation::ok())]
#[case::one_error(Validation::new(Vec::new(), vec![ApplicationError::new("foo")]))]
#[case::one_warning(Validation::new(vec![String::from("foo")], Vec::new()))]
fn validation_round_trips_with_exact_cardinality(#[case] validation: Validation) {
    let line = encode_line(&validation).expect("encode");
    let back: Validation = decode_line(&line).expect("decode");
    assert_eq!(back.errors().len(), validation.errors().len());
    assert_eq!(back.warnings().len(), validation.warnings().len());
    assert_eq!(back, validation);
}

#[test]
fn absent_sequences_decode_as_empty() {
    let back: Validation = decode_line(b"{}").expect("decode");
    assert_eq!(back, Validation::ok());
}
