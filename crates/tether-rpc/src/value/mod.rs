//! Domain values handed across the bridge.
//!
//! The engine produces [`ResourceConfig`], [`ResourceState`], and
//! [`ResourceDiff`] values and the bridge carries them to the provisioner
//! untouched. Configuration is dynamically shaped, so it is modelled as the
//! recursive [`ConfigValue`] sum type and serialised with a single set of
//! serde derives shared by every resource kind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A user-authored configuration value of arbitrary depth.
///
/// Serialised untagged, so a value maps onto plain JSON: strings, numbers,
/// booleans, arrays, and objects. JSON `null` has no counterpart and is
/// rejected on decode.
///
/// # Example
///
/// ```
/// use tether_rpc::ConfigValue;
///
/// let value: ConfigValue = serde_json::from_str(r#"{"ports":[80,443],"tls":true}"#)
///     .expect("valid config value");
/// assert!(matches!(value, ConfigValue::Map(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// A boolean flag.
    Bool(bool),
    /// An integer or floating-point number, kept in its decoded form.
    Number(serde_json::Number),
    /// A string scalar.
    String(String),
    /// An ordered sequence of values.
    List(Vec<ConfigValue>),
    /// A string-keyed mapping of values.
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Builds a floating-point value. Returns `None` for NaN or infinities,
    /// which JSON cannot carry.
    #[must_use]
    pub fn float(value: f64) -> Option<Self> {
        serde_json::Number::from_f64(value).map(Self::Number)
    }

    /// Returns the string payload when the value is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            Self::Bool(_) | Self::Number(_) | Self::List(_) | Self::Map(_) => None,
        }
    }

    /// Looks up a direct child by map key or list index.
    fn child(&self, segment: &str) -> Option<&Self> {
        match self {
            Self::Map(entries) => entries.get(segment),
            Self::List(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            Self::Bool(_) | Self::Number(_) | Self::String(_) => None,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for ConfigValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(value: Vec<ConfigValue>) -> Self {
        Self::List(value)
    }
}

impl From<BTreeMap<String, ConfigValue>> for ConfigValue {
    fn from(value: BTreeMap<String, ConfigValue>) -> Self {
        Self::Map(value)
    }
}

/// Raw resource configuration as written by the user.
///
/// `computed_keys` lists keys whose values are not known until apply time.
/// An empty list is omitted from the wire and restored as empty.
///
/// # Example
///
/// ```
/// use tether_rpc::{ConfigValue, ResourceConfig};
///
/// let config = ResourceConfig::from_iter([("foo", ConfigValue::from("bar"))]);
/// assert_eq!(config.get("foo").and_then(ConfigValue::as_str), Some("bar"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    raw: BTreeMap<String, ConfigValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    computed_keys: Vec<String>,
}

impl ResourceConfig {
    /// Creates a configuration from a raw mapping.
    #[must_use]
    pub const fn new(raw: BTreeMap<String, ConfigValue>) -> Self {
        Self {
            raw,
            computed_keys: Vec::new(),
        }
    }

    /// Marks the given keys as computed.
    #[must_use]
    pub fn with_computed_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.computed_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the raw mapping.
    #[must_use]
    pub const fn raw(&self) -> &BTreeMap<String, ConfigValue> {
        &self.raw
    }

    /// Returns the keys marked as computed.
    #[must_use]
    pub fn computed_keys(&self) -> &[String] {
        &self.computed_keys
    }

    /// Returns `true` when the configuration holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty() && self.computed_keys.is_empty()
    }

    /// Resolves a dotted path such as `ingress.0.port`.
    ///
    /// Map segments match keys and list segments are decimal indices.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&ConfigValue> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        segments.try_fold(self.raw.get(first)?, |value, segment| value.child(segment))
    }

    /// Returns `true` when `key`, or a parent of it, is computed.
    #[must_use]
    pub fn is_computed(&self, key: &str) -> bool {
        self.computed_keys.iter().any(|computed| {
            key == computed
                || key
                    .strip_prefix(computed.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

impl<K: Into<String>> FromIterator<(K, ConfigValue)> for ResourceConfig {
    fn from_iter<T: IntoIterator<Item = (K, ConfigValue)>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }
}

/// Last known state of a managed resource.
///
/// Attributes are flat string pairs; nested structure is encoded in the keys
/// by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    #[serde(default)]
    id: String,
    #[serde(default, rename = "type")]
    resource_type: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

impl ResourceState {
    /// Creates a state with the given identifier and no attributes.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the resource type.
    #[must_use]
    pub fn with_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self
    }

    /// Adds or replaces an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the resource identifier; empty until the resource exists.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the resource type.
    #[must_use]
    pub const fn resource_type(&self) -> &str {
        self.resource_type.as_str()
    }

    /// Returns a single attribute value.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns all attributes.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

/// Whether a diffed attribute is user input or provider output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffAttrType {
    /// Not classified.
    #[default]
    Unknown,
    /// Set by the user in configuration.
    Input,
    /// Produced by the provider.
    Output,
}

/// Planned change to a single attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDiff {
    /// Current value.
    #[serde(default)]
    pub old: String,
    /// Planned value.
    #[serde(default)]
    pub new: String,
    /// The planned value is only known after apply.
    #[serde(default)]
    pub new_computed: bool,
    /// Changing this attribute forces the resource to be replaced.
    #[serde(default)]
    pub requires_new: bool,
    /// Input/output classification.
    #[serde(default)]
    pub kind: DiffAttrType,
}

impl AttributeDiff {
    /// Creates a diff between two values.
    #[must_use]
    pub fn new(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
            ..Self::default()
        }
    }
}

/// Attribute-level changes planned for a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDiff {
    #[serde(default)]
    attributes: BTreeMap<String, AttributeDiff>,
}

impl ResourceDiff {
    /// Creates a diff from per-attribute changes.
    #[must_use]
    pub const fn new(attributes: BTreeMap<String, AttributeDiff>) -> Self {
        Self { attributes }
    }

    /// Returns the per-attribute changes.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, AttributeDiff> {
        &self.attributes
    }

    /// Returns `true` when nothing changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Returns `true` when any change forces replacement.
    #[must_use]
    pub fn requires_new(&self) -> bool {
        self.attributes.values().any(|diff| diff.requires_new)
    }
}
