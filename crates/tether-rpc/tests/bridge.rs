//! End-to-end tests driving provisioners through real sockets.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};
use tether_config::SocketEndpoint;
use tether_rpc::testing::connected_pair;
use tether_rpc::{
    ApplicationError, Client, ClientOptions, ConfigValue, ErrorKind, MockProvisioner, ProtocolError,
    ProvisionerError, ProvisionerProxy, ResourceConfig, ResourceProvisioner, ResourceState,
    Server, TransportError, Validation,
};

struct Exploding;

impl ResourceProvisioner for Exploding {
    fn validate(&self, _config: &ResourceConfig) -> Result<Validation, ProvisionerError> {
        panic!("validation blew up");
    }

    fn apply(
        &self,
        _state: &ResourceState,
        _config: &ResourceConfig,
    ) -> Result<(), ProvisionerError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), ProvisionerError> {
        Ok(())
    }
}

/// Sleeps in `apply`, so concurrent calls overlap on one connection.
struct Slow;

impl ResourceProvisioner for Slow {
    fn validate(&self, config: &ResourceConfig) -> Result<Validation, ProvisionerError> {
        let id = config
            .get("id")
            .and_then(ConfigValue::as_str)
            .unwrap_or_default()
            .to_owned();
        Ok(Validation::new(vec![id], Vec::new()))
    }

    fn apply(
        &self,
        state: &ResourceState,
        _config: &ResourceConfig,
    ) -> Result<(), ProvisionerError> {
        thread::sleep(Duration::from_millis(20));
        Err(ProvisionerError::application(format!("applied {}", state.id())))
    }

    fn stop(&self) -> Result<(), ProvisionerError> {
        Ok(())
    }
}

#[fixture]
fn pair() -> (Client, Server) {
    connected_pair().expect("connected pair")
}

#[rstest]
fn two_registrations_get_distinct_names(pair: (Client, Server)) {
    let (_client, server) = pair;
    let first = server.register(Arc::new(MockProvisioner::new())).expect("first");
    let second = server.register(Arc::new(MockProvisioner::new())).expect("second");
    assert_ne!(first, second);
}

#[rstest]
fn validation_lists_keep_exact_length(pair: (Client, Server)) {
    let (client, server) = pair;
    let mock = MockProvisioner::new()
        .with_validate_warnings(vec![String::from("w1"), String::from("w2")])
        .with_validate_errors(vec![
            ApplicationError::new("e1"),
            ApplicationError::new("e2"),
            ApplicationError::new("e3"),
        ]);
    let name = server.register(Arc::new(mock)).expect("register");
    let proxy = ProvisionerProxy::new(client, name);

    let outcome = proxy.validate(&ResourceConfig::default()).expect("validate");
    assert_eq!(outcome.warnings(), [String::from("w1"), String::from("w2")]);
    assert_eq!(outcome.errors().len(), 3);
    assert_eq!(outcome.errors()[2].message(), "e3");
}

#[rstest]
fn stop_reaches_the_provisioner(pair: (Client, Server)) {
    let (client, server) = pair;
    let mock = Arc::new(MockProvisioner::new().with_stop_error(ApplicationError::new("busy")));
    let name = server.register(mock.clone()).expect("register");
    let proxy = ProvisionerProxy::new(client, name);

    let error = proxy.stop().expect_err("stop refused");
    assert_eq!(error.kind(), ErrorKind::Application);
    assert!(mock.stop_called());
}

#[rstest]
fn panicking_provisioner_does_not_take_down_server(pair: (Client, Server)) {
    let (client, server) = pair;
    let broken = server.register(Arc::new(Exploding)).expect("register");
    let mock = Arc::new(MockProvisioner::new());
    let healthy = server.register(mock.clone()).expect("register");

    let error = ProvisionerProxy::new(client.clone(), broken)
        .validate(&ResourceConfig::default())
        .expect_err("panic reported");
    assert!(matches!(
        error,
        ProvisionerError::Protocol(ProtocolError::ImplementationPanicked { ref message, .. })
            if message == "validation blew up"
    ));

    ProvisionerProxy::new(client, healthy)
        .validate(&ResourceConfig::default())
        .expect("server still serving");
    assert!(mock.validate_called());
}

#[rstest]
fn concurrent_calls_from_many_proxies_complete(pair: (Client, Server)) {
    let (client, server) = pair;
    let name = server.register(Arc::new(Slow)).expect("register");

    let workers: Vec<_> = (0..16)
        .map(|worker| {
            let proxy = ProvisionerProxy::new(client.clone(), name.clone());
            thread::spawn(move || {
                let id = format!("r-{worker}");
                let config = ResourceConfig::from_iter([("id", ConfigValue::from(id.as_str()))]);
                let outcome = proxy.validate(&config).expect("validate");
                assert_eq!(outcome.warnings(), [id.clone()]);
                let error = proxy
                    .apply(&ResourceState::new(id.clone()), &config)
                    .expect_err("apply reports");
                assert_eq!(error.to_string(), format!("applied {id}"));
                id
            })
        })
        .collect();

    let ids: HashSet<String> = workers
        .into_iter()
        .map(|worker| worker.join().expect("worker"))
        .collect();
    assert_eq!(ids.len(), 16);
}

#[rstest]
fn closing_the_server_fails_calls_with_transport_error(pair: (Client, Server)) {
    let (client, server) = pair;
    let name = server.register(Arc::new(MockProvisioner::new())).expect("register");
    let proxy = ProvisionerProxy::new(client.clone(), name);
    proxy.validate(&ResourceConfig::default()).expect("first call");

    server.shutdown();
    while !client.is_closed() {
        thread::yield_now();
    }

    let error = proxy.stop().expect_err("closed connection");
    assert!(error.is_retryable());
    assert!(matches!(
        error,
        ProvisionerError::Transport(TransportError::ConnectionClosed)
    ));
}

#[test]
fn listener_serves_tcp_clients() {
    let server = Server::default();
    let mock = Arc::new(MockProvisioner::new());
    let name = server.register(mock.clone()).expect("register");
    let listener = server
        .listen(&SocketEndpoint::tcp("127.0.0.1", 0))
        .expect("listen");

    for _ in 0..2 {
        let client =
            Client::connect(listener.endpoint(), ClientOptions::default()).expect("connect");
        ProvisionerProxy::new(client, name.clone())
            .apply(&ResourceState::new("i-1"), &ResourceConfig::default())
            .expect("apply");
    }
    assert_eq!(mock.apply_state(), Some(ResourceState::new("i-1")));

    listener.shutdown();
    listener.join().expect("join listener");
    server.shutdown();
}

#[cfg(unix)]
#[test]
fn listener_serves_unix_clients() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("bridge.sock");
    let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path").to_owned());

    let server = Server::default();
    let name = server.register(Arc::new(MockProvisioner::new())).expect("register");
    let listener = server.listen(&endpoint).expect("listen");

    let client = Client::connect(&endpoint, ClientOptions::default()).expect("connect");
    let outcome = ProvisionerProxy::new(client, name)
        .validate(&ResourceConfig::default())
        .expect("validate");
    assert!(outcome.is_valid());

    listener.shutdown();
    listener.join().expect("join listener");
    server.shutdown();
    assert!(!path.exists());
}
