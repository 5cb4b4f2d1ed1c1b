//! Service registrations: what a key resolves to and how long it lives.

use crate::dispose::{AsyncDispose, Dispose};
use crate::error::{BoxError, Error, Result};
use crate::key::ServiceKey;
use crate::resolver::{AsyncResolver, Resolver};
use futures_util::future::BoxFuture;
use serde::Deserialize;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// A type-erased service instance.
///
/// The concrete value is always an `Arc<T>` for the registered `T`, which is
/// what lets `dyn Trait` services share the storage of concrete ones.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// The result type of factories and teardown hooks.
pub type FactoryResult<T> = std::result::Result<T, BoxError>;

pub(crate) type FactoryFn = Arc<dyn Fn(&Resolver<'_>) -> FactoryResult<Instance> + Send + Sync>;
pub(crate) type AsyncFactoryFn =
  Arc<dyn Fn(AsyncResolver) -> BoxFuture<'static, FactoryResult<Instance>> + Send + Sync>;

/// How long a resolved instance is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
  /// One instance for the life of the container.
  Singleton,
  /// One instance per scope.
  Scoped,
  /// A new instance on every resolution.
  Transient,
}

impl fmt::Display for Lifecycle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Lifecycle::Singleton => "singleton",
      Lifecycle::Scoped => "scoped",
      Lifecycle::Transient => "transient",
    })
  }
}

#[derive(Clone)]
pub(crate) enum Strategy {
  Factory(FactoryFn),
  AsyncFactory(AsyncFactoryFn),
  Instance(Instance),
}

#[derive(Clone)]
pub(crate) enum Teardown {
  Blocking(Arc<dyn Fn(&Instance) -> FactoryResult<()> + Send + Sync>),
  Awaited(Arc<dyn Fn(Instance) -> BoxFuture<'static, FactoryResult<()>> + Send + Sync>),
}

/// An immutable, type-erased registration held by a `ServiceCollection`.
///
/// Built from a typed [`Registration`]; cheap to clone.
#[derive(Clone)]
pub struct ServiceRegistration {
  key: ServiceKey,
  lifecycle: Lifecycle,
  strategy: Strategy,
  teardown: Option<Teardown>,
}

impl ServiceRegistration {
  pub fn key(&self) -> &ServiceKey {
    &self.key
  }

  pub fn lifecycle(&self) -> Lifecycle {
    self.lifecycle
  }

  /// Whether construction requires the async resolution path.
  pub fn is_async(&self) -> bool {
    matches!(self.strategy, Strategy::AsyncFactory(_))
  }

  /// Whether the registration wraps a pre-built instance.
  pub fn is_instance(&self) -> bool {
    matches!(self.strategy, Strategy::Instance(_))
  }

  pub fn has_teardown(&self) -> bool {
    self.teardown.is_some()
  }

  pub(crate) fn strategy(&self) -> &Strategy {
    &self.strategy
  }

  pub(crate) fn teardown(&self) -> Option<&Teardown> {
    self.teardown.as_ref()
  }

  pub(crate) fn instance(&self) -> Option<&Instance> {
    match &self.strategy {
      Strategy::Instance(instance) => Some(instance),
      _ => None,
    }
  }

  pub(crate) fn validate(&self) -> Result<()> {
    if self.is_instance() && self.lifecycle != Lifecycle::Singleton {
      return Err(Error::InvalidLifecycle {
        key: self.key.clone(),
        lifecycle: self.lifecycle,
      });
    }
    Ok(())
  }
}

impl fmt::Debug for ServiceRegistration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let strategy = match self.strategy {
      Strategy::Factory(_) => "factory",
      Strategy::AsyncFactory(_) => "async_factory",
      Strategy::Instance(_) => "instance",
    };
    f.debug_struct("ServiceRegistration")
      .field("key", &self.key)
      .field("lifecycle", &self.lifecycle)
      .field("strategy", &strategy)
      .field("teardown", &self.teardown.is_some())
      .finish()
  }
}

/// A typed registration under construction.
///
/// ```
/// use uno_ioc::{Lifecycle, Registration, ServiceCollection, ServiceResolver};
///
/// struct Pool { url: String }
///
/// let mut services = ServiceCollection::new();
/// services
///   .register(
///     Registration::singleton(|_| Ok(Pool { url: "postgres://localhost".into() }))
///       .named("primary")
///       .on_dispose(|pool: &Pool| {
///         println!("closing {}", pool.url);
///         Ok(())
///       }),
///   )
///   .unwrap();
///
/// let container = services.build().unwrap();
/// let pool = container.resolve_named::<Pool>("primary").unwrap();
/// assert_eq!(pool.url, "postgres://localhost");
/// container.dispose().unwrap();
/// ```
pub struct Registration<T: ?Sized> {
  inner: ServiceRegistration,
  _service: PhantomData<fn() -> Arc<T>>,
}

impl<T: Any + Send + Sync> Registration<T> {
  pub fn singleton<F>(factory: F) -> Self
  where
    F: Fn(&Resolver<'_>) -> FactoryResult<T> + Send + Sync + 'static,
  {
    Self::factory(Lifecycle::Singleton, move |r| factory(r).map(Arc::new))
  }

  pub fn scoped<F>(factory: F) -> Self
  where
    F: Fn(&Resolver<'_>) -> FactoryResult<T> + Send + Sync + 'static,
  {
    Self::factory(Lifecycle::Scoped, move |r| factory(r).map(Arc::new))
  }

  pub fn transient<F>(factory: F) -> Self
  where
    F: Fn(&Resolver<'_>) -> FactoryResult<T> + Send + Sync + 'static,
  {
    Self::factory(Lifecycle::Transient, move |r| factory(r).map(Arc::new))
  }

  pub fn singleton_async<F, Fut>(factory: F) -> Self
  where
    F: Fn(AsyncResolver) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FactoryResult<T>> + Send + 'static,
  {
    Self::async_factory(Lifecycle::Singleton, move |r| {
      let fut = factory(r);
      async move { fut.await.map(Arc::new) }
    })
  }

  pub fn scoped_async<F, Fut>(factory: F) -> Self
  where
    F: Fn(AsyncResolver) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FactoryResult<T>> + Send + 'static,
  {
    Self::async_factory(Lifecycle::Scoped, move |r| {
      let fut = factory(r);
      async move { fut.await.map(Arc::new) }
    })
  }

  pub fn transient_async<F, Fut>(factory: F) -> Self
  where
    F: Fn(AsyncResolver) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FactoryResult<T>> + Send + 'static,
  {
    Self::async_factory(Lifecycle::Transient, move |r| {
      let fut = factory(r);
      async move { fut.await.map(Arc::new) }
    })
  }

  /// A pre-built singleton.
  pub fn instance(value: T) -> Self {
    Self::shared(Arc::new(value))
  }
}

impl<T: ?Sized + Any + Send + Sync> Registration<T> {
  /// A factory producing `Arc<T>`; the form used for `dyn Trait` services.
  pub fn factory<F>(lifecycle: Lifecycle, factory: F) -> Self
  where
    F: Fn(&Resolver<'_>) -> FactoryResult<Arc<T>> + Send + Sync + 'static,
  {
    let erased: FactoryFn = Arc::new(move |r: &Resolver<'_>| -> FactoryResult<Instance> {
      Ok(Arc::new(factory(r)?) as Instance)
    });
    Self::from_parts(lifecycle, Strategy::Factory(erased))
  }

  pub fn async_factory<F, Fut>(lifecycle: Lifecycle, factory: F) -> Self
  where
    F: Fn(AsyncResolver) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FactoryResult<Arc<T>>> + Send + 'static,
  {
    let erased: AsyncFactoryFn = Arc::new(
      move |r: AsyncResolver| -> BoxFuture<'static, FactoryResult<Instance>> {
        let fut = factory(r);
        Box::pin(async move {
          let service = fut.await?;
          Ok::<_, BoxError>(Arc::new(service) as Instance)
        })
      },
    );
    Self::from_parts(lifecycle, Strategy::AsyncFactory(erased))
  }

  /// A pre-built singleton already behind an `Arc`, e.g. `Arc<dyn Trait>`.
  pub fn shared(value: Arc<T>) -> Self {
    Self::from_parts(
      Lifecycle::Singleton,
      Strategy::Instance(Arc::new(value) as Instance),
    )
  }

  fn from_parts(lifecycle: Lifecycle, strategy: Strategy) -> Self {
    Self {
      inner: ServiceRegistration {
        key: ServiceKey::of::<T>(),
        lifecycle,
        strategy,
        teardown: None,
      },
      _service: PhantomData,
    }
  }

  /// Registers under a qualifier so several implementations can coexist.
  pub fn named(mut self, name: &str) -> Self {
    self.inner.key = self.inner.key.with_qualifier(name);
    self
  }

  /// Overrides the lifecycle. Checked when the registration is added to a
  /// collection: a pre-built instance may only be a singleton.
  pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
    self.inner.lifecycle = lifecycle;
    self
  }

  /// A synchronous teardown hook run when the owning scope or container is
  /// disposed.
  pub fn on_dispose<H>(mut self, hook: H) -> Self
  where
    H: Fn(&T) -> FactoryResult<()> + Send + Sync + 'static,
  {
    let key = self.inner.key.clone();
    self.inner.teardown = Some(Teardown::Blocking(Arc::new(
      move |instance: &Instance| -> FactoryResult<()> {
        let service = downcast_ref::<T>(&key, instance)?;
        hook(service)
      },
    )));
    self
  }

  /// An asynchronous teardown hook; only awaited by async disposal.
  pub fn on_dispose_async<H, Fut>(mut self, hook: H) -> Self
  where
    H: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FactoryResult<()>> + Send + 'static,
  {
    let key = self.inner.key.clone();
    let hook = Arc::new(hook);
    self.inner.teardown = Some(Teardown::Awaited(Arc::new(
      move |instance: Instance| -> BoxFuture<'static, FactoryResult<()>> {
        let key = key.clone();
        let hook = hook.clone();
        Box::pin(async move {
          let service = downcast::<T>(&key, instance)?;
          hook(service).await
        })
      },
    )));
    self
  }

  pub fn key(&self) -> &ServiceKey {
    &self.inner.key
  }

  pub fn lifecycle(&self) -> Lifecycle {
    self.inner.lifecycle
  }
}

impl<T: ?Sized + Dispose + Any> Registration<T> {
  /// Tears the service down through its [`Dispose`] impl.
  pub fn disposable(self) -> Self {
    self.on_dispose(|service: &T| service.dispose())
  }
}

impl<T: ?Sized + AsyncDispose + Any> Registration<T> {
  /// Tears the service down through its [`AsyncDispose`] impl.
  pub fn async_disposable(self) -> Self {
    self.on_dispose_async(|service: Arc<T>| async move { service.dispose().await })
  }
}

impl<T: ?Sized> From<Registration<T>> for ServiceRegistration {
  fn from(registration: Registration<T>) -> Self {
    registration.inner
  }
}

/// Recovers the typed `Arc<T>` stored in an instance.
pub(crate) fn downcast<T: ?Sized + Any + Send + Sync>(
  key: &ServiceKey,
  instance: Instance,
) -> Result<Arc<T>> {
  (*instance)
    .downcast_ref::<Arc<T>>()
    .cloned()
    .ok_or_else(|| Error::TypeMismatch {
      key: key.clone(),
      expected: std::any::type_name::<T>(),
    })
}

fn downcast_ref<'a, T: ?Sized + Any + Send + Sync>(
  key: &ServiceKey,
  instance: &'a Instance,
) -> Result<&'a T> {
  (**instance)
    .downcast_ref::<Arc<T>>()
    .map(|service| &**service)
    .ok_or_else(|| Error::TypeMismatch {
      key: key.clone(),
      expected: std::any::type_name::<T>(),
    })
}
