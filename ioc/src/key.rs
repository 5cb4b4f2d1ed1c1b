//! Service identity.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// The identity a service is registered and resolved under.
///
/// A key is the `TypeId` of the requested type (a concrete type or a
/// `dyn Trait`) plus an optional qualifier that lets several implementations
/// of the same type live side by side. The type name is carried for
/// diagnostics only and takes no part in equality or hashing.
#[derive(Clone)]
pub struct ServiceKey {
  type_id: TypeId,
  type_name: &'static str,
  qualifier: Option<String>,
}

impl ServiceKey {
  /// The unqualified key for `T`.
  pub fn of<T: ?Sized + Any>() -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      type_name: std::any::type_name::<T>(),
      qualifier: None,
    }
  }

  /// The key for `T` qualified by `name`.
  pub fn named<T: ?Sized + Any>(name: &str) -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      type_name: std::any::type_name::<T>(),
      qualifier: Some(name.to_owned()),
    }
  }

  pub(crate) fn with_qualifier(mut self, name: &str) -> Self {
    self.qualifier = Some(name.to_owned());
    self
  }

  pub fn type_id(&self) -> TypeId {
    self.type_id
  }

  pub fn type_name(&self) -> &'static str {
    self.type_name
  }

  pub fn qualifier(&self) -> Option<&str> {
    self.qualifier.as_deref()
  }
}

impl PartialEq for ServiceKey {
  fn eq(&self, other: &Self) -> bool {
    self.type_id == other.type_id && self.qualifier == other.qualifier
  }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.type_id.hash(state);
    self.qualifier.hash(state);
  }
}

impl fmt::Debug for ServiceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.qualifier {
      Some(name) => write!(f, "Key({}, Name({}))", self.type_name, name),
      None => write!(f, "Key({})", self.type_name),
    }
  }
}

impl fmt::Display for ServiceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.qualifier {
      Some(name) => write!(f, "{}[\"{}\"]", self.type_name, name),
      None => f.write_str(self.type_name),
    }
  }
}
