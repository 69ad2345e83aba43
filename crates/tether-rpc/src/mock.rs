//! Recording provisioner for exercising the bridge.
//!
//! [`MockProvisioner`] remembers every call it receives together with the
//! decoded arguments and answers with canned results. Registering one on a
//! server and calling it through a proxy shows whether arguments and results
//! survive the full round trip.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::contract::{ResourceProvisioner, Validation};
use crate::error::{ApplicationError, ProvisionerError};
use crate::protocol::Method;
use crate::value::{ResourceConfig, ResourceState};

/// Provisioner that records calls and returns configured results.
///
/// # Example
///
/// ```
/// use tether_rpc::{ApplicationError, MockProvisioner, ResourceConfig, ResourceProvisioner};
///
/// let mock = MockProvisioner::new().with_validate_errors(vec![ApplicationError::new("foo")]);
/// let outcome = mock.validate(&ResourceConfig::default()).expect("local call");
/// assert_eq!(outcome.errors().len(), 1);
/// assert!(mock.validate_called());
/// ```
#[derive(Debug, Default)]
pub struct MockProvisioner {
    validate_warnings: Vec<String>,
    validate_errors: Vec<ApplicationError>,
    apply_error: Option<ApplicationError>,
    stop_error: Option<ApplicationError>,
    calls: Mutex<RecordedCalls>,
}

#[derive(Debug, Default)]
struct RecordedCalls {
    methods: Vec<Method>,
    validate_config: Option<ResourceConfig>,
    apply_state: Option<ResourceState>,
    apply_config: Option<ResourceConfig>,
}

impl MockProvisioner {
    /// Creates a mock that succeeds with empty results.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the warnings returned by `validate`.
    #[must_use]
    pub fn with_validate_warnings(mut self, warnings: Vec<String>) -> Self {
        self.validate_warnings = warnings;
        self
    }

    /// Sets the errors returned by `validate`.
    #[must_use]
    pub fn with_validate_errors(mut self, errors: Vec<ApplicationError>) -> Self {
        self.validate_errors = errors;
        self
    }

    /// Makes `apply` fail with the given error.
    #[must_use]
    pub fn with_apply_error(mut self, error: ApplicationError) -> Self {
        self.apply_error = Some(error);
        self
    }

    /// Makes `stop` fail with the given error.
    #[must_use]
    pub fn with_stop_error(mut self, error: ApplicationError) -> Self {
        self.stop_error = Some(error);
        self
    }

    /// Methods invoked so far, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<Method> {
        self.recorded().methods.clone()
    }

    /// Whether `validate` has been called.
    #[must_use]
    pub fn validate_called(&self) -> bool {
        self.was_called(Method::Validate)
    }

    /// Configuration passed to the most recent `validate` call.
    #[must_use]
    pub fn validate_config(&self) -> Option<ResourceConfig> {
        self.recorded().validate_config.clone()
    }

    /// Whether `apply` has been called.
    #[must_use]
    pub fn apply_called(&self) -> bool {
        self.was_called(Method::Apply)
    }

    /// State passed to the most recent `apply` call.
    #[must_use]
    pub fn apply_state(&self) -> Option<ResourceState> {
        self.recorded().apply_state.clone()
    }

    /// Configuration passed to the most recent `apply` call.
    #[must_use]
    pub fn apply_config(&self) -> Option<ResourceConfig> {
        self.recorded().apply_config.clone()
    }

    /// Whether `stop` has been called.
    #[must_use]
    pub fn stop_called(&self) -> bool {
        self.was_called(Method::Stop)
    }

    fn was_called(&self, method: Method) -> bool {
        self.recorded().methods.contains(&method)
    }

    fn recorded(&self) -> MutexGuard<'_, RecordedCalls> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResourceProvisioner for MockProvisioner {
    fn validate(&self, config: &ResourceConfig) -> Result<Validation, ProvisionerError> {
        let mut recorded = self.recorded();
        recorded.methods.push(Method::Validate);
        recorded.validate_config = Some(config.clone());
        Ok(Validation::new(
            self.validate_warnings.clone(),
            self.validate_errors.clone(),
        ))
    }

    fn apply(
        &self,
        state: &ResourceState,
        config: &ResourceConfig,
    ) -> Result<(), ProvisionerError> {
        let mut recorded = self.recorded();
        recorded.methods.push(Method::Apply);
        recorded.apply_state = Some(state.clone());
        recorded.apply_config = Some(config.clone());
        self.apply_error
            .clone()
            .map_or(Ok(()), |error| Err(ProvisionerError::Application(error)))
    }

    fn stop(&self) -> Result<(), ProvisionerError> {
        self.recorded().methods.push(Method::Stop);
        self.stop_error
            .clone()
            .map_or(Ok(()), |error| Err(ProvisionerError::Application(error)))
    }
}
