//! The provisioner capability set.
//!
//! [`ResourceProvisioner`] is implemented both by concrete provisioners that
//! run in-process and by [`ProvisionerProxy`](crate::ProvisionerProxy), which
//! forwards every call to a provisioner registered on a remote server. Code
//! holding an `Arc<dyn ResourceProvisioner>` cannot tell the two apart.
//!
//! Validation and apply report failures in deliberately different shapes:
//! [`Validation`] carries any number of errors next to any number of
//! warnings, whereas `apply` fails with at most one error.

use serde::{Deserialize, Serialize};

use crate::error::{ApplicationError, ProvisionerError};
use crate::value::{ResourceConfig, ResourceState};

/// Outcome of validating a resource configuration.
///
/// Both sequences are always present. An absent sequence on the wire decodes
/// as empty, so "no errors" and "zero errors" are the same value.
///
/// # Example
///
/// ```
/// use tether_rpc::{ApplicationError, Validation};
///
/// let outcome = Validation::new(vec![], vec![ApplicationError::new("name is required")]);
/// assert!(!outcome.is_valid());
/// assert!(outcome.warnings().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    errors: Vec<ApplicationError>,
}

impl Validation {
    /// Creates a validation outcome.
    #[must_use]
    pub const fn new(warnings: Vec<String>, errors: Vec<ApplicationError>) -> Self {
        Self { warnings, errors }
    }

    /// A clean outcome with no warnings and no errors.
    #[must_use]
    pub const fn ok() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Returns the warnings.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Returns the errors.
    #[must_use]
    pub fn errors(&self) -> &[ApplicationError] {
        &self.errors
    }

    /// Returns `true` when there are no errors. Warnings do not count.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Splits the outcome into its warnings and errors.
    #[must_use]
    pub fn into_parts(self) -> (Vec<String>, Vec<ApplicationError>) {
        (self.warnings, self.errors)
    }
}

/// Operations every provisioner supports, locally or remotely.
///
/// Implementations must tolerate concurrent calls; the bridge does not
/// serialise them.
#[cfg_attr(test, mockall::automock)]
pub trait ResourceProvisioner: Send + Sync {
    /// Checks a configuration without side effects.
    ///
    /// Application-level problems belong in the returned [`Validation`];
    /// an `Err` reports that the call itself failed.
    ///
    /// # Errors
    ///
    /// Remote implementations return transport and protocol errors.
    fn validate(&self, config: &ResourceConfig) -> Result<Validation, ProvisionerError>;

    /// Runs the provisioning action against a resource.
    ///
    /// # Errors
    ///
    /// Returns a single [`ProvisionerError::Application`] when the action
    /// fails; the call stops at the first failure.
    fn apply(&self, state: &ResourceState, config: &ResourceConfig)
    -> Result<(), ProvisionerError>;

    /// Asks in-flight operations to halt as soon as it is safe to do so.
    ///
    /// Advisory only: it does not abort a running `apply`.
    ///
    /// # Errors
    ///
    /// Returns an error when the request could not be delivered or the
    /// provisioner refuses it.
    fn stop(&self) -> Result<(), ProvisionerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_validation_is_clean() {
        let outcome = Validation::default();
        assert_eq!(outcome, Validation::ok());
        assert!(outcome.is_valid());
    }

    #[test]
    fn warnings_do_not_invalidate() {
        let outcome = Validation::new(vec![String::from("deprecated key")], Vec::new());
        assert!(outcome.is_valid());
        assert_eq!(outcome.warnings(), [String::from("deprecated key")]);
    }

    #[test]
    fn absent_sequences_decode_as_empty() {
        let outcome: Validation = serde_json::from_str("{}").expect("decode");
        assert_eq!(outcome, Validation::ok());
    }

    #[test]
    fn cardinality_survives_encoding() {
        let outcome = Validation::new(
            Vec::new(),
            vec![ApplicationError::new("foo"), ApplicationError::new("foo")],
        );
        let json = serde_json::to_string(&outcome).expect("encode");
        let back: Validation = serde_json::from_str(&json).expect("decode");
        assert_eq!(back.errors().len(), 2);
        assert!(back.warnings().is_empty());
        let (warnings, errors) = back.into_parts();
        assert!(warnings.is_empty());
        assert_eq!(errors.len(), 2);
    }
}
