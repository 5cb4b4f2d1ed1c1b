//! The startup-time registry of services.

use crate::container::Container;
use crate::error::{Error, Result};
use crate::key::ServiceKey;
use crate::options::{ContainerOptions, DuplicatePolicy};
use crate::registration::{FactoryResult, Registration, ServiceRegistration};
use crate::resolver::{AsyncResolver, Resolver};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// An insertion-ordered set of registrations, filled during startup.
///
/// Building a container freezes the collection; any later registration fails
/// with `CollectionFrozen`.
#[derive(Default)]
pub struct ServiceCollection {
  options: ContainerOptions,
  registrations: Vec<Arc<ServiceRegistration>>,
  index: HashMap<ServiceKey, usize>,
  frozen: bool,
}

impl ServiceCollection {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_options(options: ContainerOptions) -> Self {
    Self {
      options,
      ..Self::default()
    }
  }

  pub fn options(&self) -> &ContainerOptions {
    &self.options
  }

  /// Adds a registration, resolving key collisions with the configured
  /// [`DuplicatePolicy`].
  pub fn register(&mut self, registration: impl Into<ServiceRegistration>) -> Result<&mut Self> {
    let policy = self.options.duplicate_policy;
    self.insert(registration.into(), policy)
  }

  /// Adds a registration, overwriting any earlier one for the same key.
  pub fn replace(&mut self, registration: impl Into<ServiceRegistration>) -> Result<&mut Self> {
    self.insert(registration.into(), DuplicatePolicy::Overwrite)
  }

  fn insert(&mut self, registration: ServiceRegistration, policy: DuplicatePolicy) -> Result<&mut Self> {
    if self.frozen {
      return Err(Error::CollectionFrozen {
        key: registration.key().clone(),
      });
    }
    registration.validate()?;

    let key = registration.key().clone();
    match self.index.get(&key).copied() {
      None => {
        debug!(service = %key, lifecycle = %registration.lifecycle(), "registered service");
        self.index.insert(key, self.registrations.len());
        self.registrations.push(Arc::new(registration));
      }
      Some(position) => match policy {
        DuplicatePolicy::Error => return Err(Error::DuplicateRegistration { key }),
        DuplicatePolicy::Overwrite => {
          debug!(service = %key, lifecycle = %registration.lifecycle(), "replaced service");
          self.registrations[position] = Arc::new(registration);
        }
        DuplicatePolicy::KeepFirst => {
          debug!(service = %key, "ignored duplicate registration");
        }
      },
    }
    Ok(self)
  }

  pub fn add_singleton<T, F>(&mut self, factory: F) -> Result<&mut Self>
  where
    T: Any + Send + Sync,
    F: Fn(&Resolver<'_>) -> FactoryResult<T> + Send + Sync + 'static,
  {
    self.register(Registration::singleton(factory))
  }

  pub fn add_scoped<T, F>(&mut self, factory: F) -> Result<&mut Self>
  where
    T: Any + Send + Sync,
    F: Fn(&Resolver<'_>) -> FactoryResult<T> + Send + Sync + 'static,
  {
    self.register(Registration::scoped(factory))
  }

  pub fn add_transient<T, F>(&mut self, factory: F) -> Result<&mut Self>
  where
    T: Any + Send + Sync,
    F: Fn(&Resolver<'_>) -> FactoryResult<T> + Send + Sync + 'static,
  {
    self.register(Registration::transient(factory))
  }

  pub fn add_instance<T: Any + Send + Sync>(&mut self, value: T) -> Result<&mut Self> {
    self.register(Registration::instance(value))
  }

  pub fn add_singleton_async<T, F, Fut>(&mut self, factory: F) -> Result<&mut Self>
  where
    T: Any + Send + Sync,
    F: Fn(AsyncResolver) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FactoryResult<T>> + Send + 'static,
  {
    self.register(Registration::singleton_async(factory))
  }

  pub fn add_scoped_async<T, F, Fut>(&mut self, factory: F) -> Result<&mut Self>
  where
    T: Any + Send + Sync,
    F: Fn(AsyncResolver) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FactoryResult<T>> + Send + 'static,
  {
    self.register(Registration::scoped_async(factory))
  }

  pub fn add_transient_async<T, F, Fut>(&mut self, factory: F) -> Result<&mut Self>
  where
    T: Any + Send + Sync,
    F: Fn(AsyncResolver) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FactoryResult<T>> + Send + 'static,
  {
    self.register(Registration::transient_async(factory))
  }

  pub fn contains<T: ?Sized + Any>(&self) -> bool {
    self.contains_key(&ServiceKey::of::<T>())
  }

  pub fn contains_key(&self, key: &ServiceKey) -> bool {
    self.index.contains_key(key)
  }

  pub fn get(&self, key: &ServiceKey) -> Option<&ServiceRegistration> {
    self
      .index
      .get(key)
      .map(|&position| &*self.registrations[position])
  }

  pub fn len(&self) -> usize {
    self.registrations.len()
  }

  pub fn is_empty(&self) -> bool {
    self.registrations.is_empty()
  }

  /// Registrations in the order they were first added.
  pub fn iter(&self) -> impl Iterator<Item = &ServiceRegistration> {
    self.registrations.iter().map(|registration| &**registration)
  }

  pub fn is_frozen(&self) -> bool {
    self.frozen
  }

  /// Freezes the collection and returns an immutable snapshot of it.
  pub fn freeze(&mut self) -> FrozenCollection {
    if !self.frozen {
      debug!(services = self.registrations.len(), "service collection frozen");
    }
    self.frozen = true;
    FrozenCollection {
      inner: Arc::new(FrozenInner {
        options: self.options.clone(),
        registrations: self.registrations.clone(),
        index: self.index.clone(),
      }),
    }
  }

  /// Freezes the collection and builds a container from it.
  ///
  /// The collection is consumed: pre-built instances belong to exactly one
  /// container, which runs their teardown once.
  pub fn build(mut self) -> Result<Container> {
    Container::build(self.freeze())
  }
}

/// The immutable snapshot a container resolves from.
#[derive(Clone)]
pub struct FrozenCollection {
  inner: Arc<FrozenInner>,
}

struct FrozenInner {
  options: ContainerOptions,
  registrations: Vec<Arc<ServiceRegistration>>,
  index: HashMap<ServiceKey, usize>,
}

impl FrozenCollection {
  pub fn options(&self) -> &ContainerOptions {
    &self.inner.options
  }

  pub(crate) fn get(&self, key: &ServiceKey) -> Option<&Arc<ServiceRegistration>> {
    self
      .inner
      .index
      .get(key)
      .map(|&position| &self.inner.registrations[position])
  }

  pub fn contains_key(&self, key: &ServiceKey) -> bool {
    self.inner.index.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.inner.registrations.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.registrations.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &ServiceRegistration> {
    self.inner.registrations.iter().map(|registration| &**registration)
  }
}
