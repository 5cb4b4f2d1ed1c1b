//! Resolution: the `ServiceResolver` surface and the engine behind it.

use crate::container::ContainerInner;
use crate::core::{ResolutionGuard, ResolutionStack, Slot, SlotCache};
use crate::dispose::{self, Disposable};
use crate::error::{Error, Result};
use crate::key::ServiceKey;
use crate::registration::{downcast, Instance, Lifecycle, ServiceRegistration, Strategy};
use crate::scope::ScopeInner;
use futures_util::future::BoxFuture;
use std::any::Any;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::trace;

/// The resolution surface shared by containers, scopes and the resolvers
/// handed to factories.
///
/// Implementors only provide the type-erased `resolve_instance` pair; the
/// typed helpers are derived from them.
pub trait ServiceResolver {
  /// Resolves the instance registered under `key`.
  fn resolve_instance(&self, key: &ServiceKey) -> Result<Instance>;

  /// Resolves the instance registered under `key`, awaiting async factories.
  fn resolve_instance_async(&self, key: ServiceKey) -> BoxFuture<'static, Result<Instance>>;

  /// Resolves `T`, which may be a concrete type or a `dyn Trait`.
  fn resolve<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    let key = ServiceKey::of::<T>();
    downcast::<T>(&key, self.resolve_instance(&key)?)
  }

  fn resolve_named<T: ?Sized + Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
    let key = ServiceKey::named::<T>(name);
    downcast::<T>(&key, self.resolve_instance(&key)?)
  }

  /// Like [`resolve`](Self::resolve), but `Ok(None)` when `T` itself is not
  /// registered. A missing dependency of `T` is still an error.
  fn try_resolve<T: ?Sized + Any + Send + Sync>(&self) -> Result<Option<Arc<T>>> {
    optional::<T>(ServiceKey::of::<T>(), |key| self.resolve_instance(key))
  }

  fn try_resolve_named<T: ?Sized + Any + Send + Sync>(&self, name: &str) -> Result<Option<Arc<T>>> {
    optional::<T>(ServiceKey::named::<T>(name), |key| self.resolve_instance(key))
  }

  fn resolve_async<T: ?Sized + Any + Send + Sync>(&self) -> BoxFuture<'static, Result<Arc<T>>> {
    let key = ServiceKey::of::<T>();
    let pending = self.resolve_instance_async(key.clone());
    Box::pin(async move { downcast::<T>(&key, pending.await?) })
  }

  fn resolve_named_async<T: ?Sized + Any + Send + Sync>(
    &self,
    name: &str,
  ) -> BoxFuture<'static, Result<Arc<T>>> {
    let key = ServiceKey::named::<T>(name);
    let pending = self.resolve_instance_async(key.clone());
    Box::pin(async move { downcast::<T>(&key, pending.await?) })
  }
}

impl<R: ServiceResolver + ?Sized> ServiceResolver for &R {
  fn resolve_instance(&self, key: &ServiceKey) -> Result<Instance> {
    (**self).resolve_instance(key)
  }

  fn resolve_instance_async(&self, key: ServiceKey) -> BoxFuture<'static, Result<Instance>> {
    (**self).resolve_instance_async(key)
  }
}

fn optional<T: ?Sized + Any + Send + Sync>(
  key: ServiceKey,
  resolve: impl FnOnce(&ServiceKey) -> Result<Instance>,
) -> Result<Option<Arc<T>>> {
  match resolve(&key) {
    Ok(instance) => downcast::<T>(&key, instance).map(Some),
    Err(Error::ServiceNotFound { key: missing }) if missing == key => Ok(None),
    Err(err) => Err(err),
  }
}

/// The resolver handed to synchronous factories.
///
/// Nested resolutions go through the context that is constructing the
/// service and extend the call chain of the current thread.
pub struct Resolver<'a> {
  target: &'a Target,
}

impl Resolver<'_> {
  /// The id of the scope constructing the service, `None` at the root.
  pub fn scope_id(&self) -> Option<u64> {
    self.target.scope_id()
  }
}

impl ServiceResolver for Resolver<'_> {
  fn resolve_instance(&self, key: &ServiceKey) -> Result<Instance> {
    resolve_sync(self.target, key)
  }

  fn resolve_instance_async(&self, key: ServiceKey) -> BoxFuture<'static, Result<Instance>> {
    resolve_async(self.target.clone(), ResolutionStack::ambient(), key)
  }
}

/// The resolver handed to asynchronous factories.
///
/// It owns its copy of the resolution stack, so branches of one factory
/// resolving concurrently never observe each other.
#[derive(Clone)]
pub struct AsyncResolver {
  target: Target,
  stack: ResolutionStack,
}

impl AsyncResolver {
  pub fn scope_id(&self) -> Option<u64> {
    self.target.scope_id()
  }
}

impl ServiceResolver for AsyncResolver {
  fn resolve_instance(&self, key: &ServiceKey) -> Result<Instance> {
    self
      .stack
      .clone()
      .install(|| resolve_sync(&self.target, key))
  }

  fn resolve_instance_async(&self, key: ServiceKey) -> BoxFuture<'static, Result<Instance>> {
    resolve_async(self.target.clone(), self.stack.clone(), key)
  }
}

/// The context a resolution runs against.
#[derive(Clone)]
pub(crate) enum Target {
  Root(Arc<ContainerInner>),
  Scope(Arc<ScopeInner>),
}

/// An instance whose owner was disposed while it was being constructed.
///
/// It is never published; its teardown runs right away and the resolution
/// fails with the owner's disposed error.
struct Orphan {
  error: Error,
  entry: Option<Disposable>,
}

impl Orphan {
  fn release(self) -> Error {
    if let Some(entry) = self.entry {
      // Failures are already logged per hook.
      let _ = dispose::dispose_all(vec![entry]);
    }
    self.error
  }

  async fn release_async(self) -> Error {
    if let Some(entry) = self.entry {
      let _ = dispose::dispose_all_async(vec![entry]).await;
    }
    self.error
  }
}

impl Target {
  fn container(&self) -> &Arc<ContainerInner> {
    match self {
      Target::Root(container) => container,
      Target::Scope(scope) => &scope.container,
    }
  }

  fn scope_id(&self) -> Option<u64> {
    match self {
      Target::Root(_) => None,
      Target::Scope(scope) => Some(scope.id),
    }
  }

  fn root(&self) -> Target {
    Target::Root(self.container().clone())
  }

  fn ensure_active(&self) -> Result<()> {
    if let Target::Scope(scope) = self {
      if scope.disposed.load(Ordering::Acquire) {
        return Err(Error::ScopeDisposed { scope_id: scope.id });
      }
    }
    if self.container().disposed.load(Ordering::Acquire) {
      return Err(Error::ContainerDisposed);
    }
    Ok(())
  }

  fn registration(&self, key: &ServiceKey) -> Result<Arc<ServiceRegistration>> {
    self
      .container()
      .collection
      .get(key)
      .cloned()
      .ok_or_else(|| Error::ServiceNotFound { key: key.clone() })
  }

  fn cache(&self) -> &SlotCache {
    match self {
      Target::Root(container) => &container.singletons,
      Target::Scope(scope) => &scope.scoped,
    }
  }

  /// Hands a freshly constructed instance to its owner.
  ///
  /// The disposed flag is read under the owner's teardown-list lock, the same
  /// lock disposal takes, so an instance is either drained by `dispose` or
  /// rejected here. Transients are left to the caller at the root and in
  /// scopes that do not own them.
  fn adopt(&self, registration: &ServiceRegistration, instance: &Instance) -> Result<(), Orphan> {
    let entry = Disposable::track(registration, instance);
    let (disposed, tracked, error, keeps_transients) = match self {
      Target::Root(container) => (
        &container.disposed,
        &container.constructed,
        Error::ContainerDisposed,
        false,
      ),
      Target::Scope(scope) => (
        &scope.disposed,
        &scope.disposables,
        Error::ScopeDisposed { scope_id: scope.id },
        scope.owns_transients,
      ),
    };

    let mut tracked = tracked.lock();
    if disposed.load(Ordering::Acquire) {
      return Err(Orphan { error, entry });
    }
    if registration.lifecycle() == Lifecycle::Transient && !keeps_transients {
      return Ok(());
    }
    if let Some(entry) = entry {
      tracked.push(entry);
    }
    Ok(())
  }
}

/// Resolves `key` against `target` as part of the caller's call chain.
pub(crate) fn resolve_root(target: &Target, key: &ServiceKey) -> Result<Instance> {
  ResolutionStack::ambient().install(|| resolve_sync(target, key))
}

fn resolve_sync(target: &Target, key: &ServiceKey) -> Result<Instance> {
  target.ensure_active()?;
  let registration = target.registration(key)?;
  let guard = ResolutionGuard::enter(key)?;
  trace!(
    service = %key,
    lifecycle = %registration.lifecycle(),
    depth = guard.depth(),
    "resolving"
  );

  match registration.lifecycle() {
    Lifecycle::Singleton => cached_sync(&target.root(), &registration),
    Lifecycle::Scoped => match target {
      Target::Root(_) => Err(Error::ScopeRequired { key: key.clone() }),
      Target::Scope(_) => cached_sync(target, &registration),
    },
    Lifecycle::Transient => construct_sync(target, &registration),
  }
}

fn cached_sync(owner: &Target, registration: &ServiceRegistration) -> Result<Instance> {
  let slot = owner.cache().slot(registration);
  match &*slot {
    Slot::Blocking(cell) => cell
      .get_or_try_init(|| construct_sync(owner, registration))
      .cloned(),
    Slot::Awaited(cell) => cell.get().cloned().ok_or_else(|| Error::AsyncResolutionRequired {
      key: registration.key().clone(),
    }),
  }
}

fn construct_sync(owner: &Target, registration: &ServiceRegistration) -> Result<Instance> {
  let instance = match registration.strategy() {
    Strategy::Instance(instance) => return Ok(instance.clone()),
    Strategy::AsyncFactory(_) => {
      return Err(Error::AsyncResolutionRequired {
        key: registration.key().clone(),
      })
    }
    Strategy::Factory(factory) => {
      let resolver = Resolver { target: owner };
      factory(&resolver).map_err(|err| Error::from_factory(registration.key(), err))?
    }
  };
  trace!(service = %registration.key(), "constructed");
  owner.adopt(registration, &instance).map_err(Orphan::release)?;
  Ok(instance)
}

/// Runs a synchronous construction from the async path.
fn construct_blocking(
  owner: &Target,
  registration: &ServiceRegistration,
  stack: ResolutionStack,
  slot: Option<&once_cell::sync::OnceCell<Instance>>,
) -> Result<Instance> {
  stack.install(|| match slot {
    Some(cell) => cell
      .get_or_try_init(|| construct_sync(owner, registration))
      .cloned(),
    None => construct_sync(owner, registration),
  })
}

pub(crate) fn resolve_async(
  target: Target,
  stack: ResolutionStack,
  key: ServiceKey,
) -> BoxFuture<'static, Result<Instance>> {
  Box::pin(async move {
    target.ensure_active()?;
    let registration = target.registration(&key)?;
    let stack = stack.entered(&key)?;
    trace!(
      service = %key,
      lifecycle = %registration.lifecycle(),
      depth = stack.depth(),
      "resolving async"
    );

    match registration.lifecycle() {
      Lifecycle::Singleton => cached_async(target.root(), registration, stack).await,
      Lifecycle::Scoped => match target {
        Target::Root(_) => Err(Error::ScopeRequired { key }),
        Target::Scope(_) => cached_async(target, registration, stack).await,
      },
      Lifecycle::Transient => construct_async(target, registration, stack).await,
    }
  })
}

async fn cached_async(
  owner: Target,
  registration: Arc<ServiceRegistration>,
  stack: ResolutionStack,
) -> Result<Instance> {
  let slot = owner.cache().slot(&registration);
  match &*slot {
    Slot::Blocking(cell) => construct_blocking(&owner, &registration, stack, Some(cell)),
    Slot::Awaited(cell) => cell
      .get_or_try_init(|| construct_async(owner.clone(), registration.clone(), stack))
      .await
      .cloned(),
  }
}

async fn construct_async(
  owner: Target,
  registration: Arc<ServiceRegistration>,
  stack: ResolutionStack,
) -> Result<Instance> {
  let factory = match registration.strategy() {
    Strategy::AsyncFactory(factory) => factory.clone(),
    Strategy::Factory(_) | Strategy::Instance(_) => {
      return construct_blocking(&owner, &registration, stack, None);
    }
  };
  let resolver = AsyncResolver {
    target: owner.clone(),
    stack: stack.clone(),
  };
  let instance = stack
    .within(async move { factory(resolver).await })
    .await
    .map_err(|err| Error::from_factory(registration.key(), err))?;
  trace!(service = %registration.key(), "constructed");
  if let Err(orphan) = owner.adopt(&registration, &instance) {
    return Err(orphan.release_async().await);
  }
  Ok(instance)
}
