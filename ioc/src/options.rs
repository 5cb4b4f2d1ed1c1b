//! Container options, supplied by the application's configuration layer.

use crate::error::{Error, Result};
use serde::Deserialize;

/// What `ServiceCollection::register` does when the key is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
  /// Reject the registration with `DuplicateRegistration`.
  #[default]
  Error,
  /// Replace the earlier registration, keeping its position.
  Overwrite,
  /// Ignore the new registration.
  KeepFirst,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerOptions {
  #[serde(default)]
  pub duplicate_policy: DuplicatePolicy,
  /// Construct every synchronous singleton when the container is built, so
  /// construction failures surface at startup instead of on first use.
  #[serde(default)]
  pub eager_singletons: bool,
}

impl ContainerOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Parses options from a YAML document, e.g. a section of the
  /// application's settings file.
  pub fn from_yaml_str(source: &str) -> Result<Self> {
    if source.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(source).map_err(|e| Error::InvalidOptions(e.to_string()))
  }

  pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
    self.duplicate_policy = policy;
    self
  }

  pub fn with_eager_singletons(mut self, eager: bool) -> Self {
    self.eager_singletons = eager;
    self
  }
}
