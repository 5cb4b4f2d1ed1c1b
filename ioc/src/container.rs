//! The root `Container` and its associated methods.

use crate::collection::FrozenCollection;
use crate::core::{ResolutionStack, SlotCache};
use crate::dispose::{self, Disposable};
use crate::error::{DisposalError, Error, Result};
use crate::key::ServiceKey;
use crate::registration::{Instance, Lifecycle};
use crate::resolver::{self, ServiceResolver, Target};
use crate::scope::{AsyncScope, Scope};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// The root resolver.
///
/// Owns the frozen registrations and every singleton instance, and creates
/// the scopes that units of work resolve through. Handles are cheap to clone
/// and share one container.
///
/// Scoped services cannot be resolved from the container itself; resolving
/// one fails with `ScopeRequired`.
#[derive(Clone)]
pub struct Container {
  inner: Arc<ContainerInner>,
}

pub(crate) struct ContainerInner {
  pub(crate) collection: FrozenCollection,
  pub(crate) singletons: SlotCache,
  pub(crate) constructed: Mutex<Vec<Disposable>>,
  pub(crate) disposed: AtomicBool,
}

/// A diagnostic view of one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
  pub key: ServiceKey,
  pub lifecycle: Lifecycle,
  pub is_async: bool,
  pub has_teardown: bool,
  /// Whether a singleton instance currently exists.
  pub constructed: bool,
}

impl Container {
  /// Builds a container over a frozen collection.
  ///
  /// Pre-built instances with a teardown hook are owned by the container from
  /// the start, in registration order. With `eager_singletons` enabled every
  /// synchronous singleton is constructed before this returns.
  pub(crate) fn build(collection: FrozenCollection) -> Result<Self> {
    let constructed = collection
      .iter()
      .filter_map(|registration| {
        let instance = registration.instance()?;
        Disposable::track(registration, instance)
      })
      .collect();
    let eager = collection.options().eager_singletons;
    let container = Self {
      inner: Arc::new(ContainerInner {
        collection,
        singletons: SlotCache::default(),
        constructed: Mutex::new(constructed),
        disposed: AtomicBool::new(false),
      }),
    };
    debug!(
      services = container.inner.collection.len(),
      eager, "container built"
    );
    if eager {
      container.warm_up()?;
    }
    Ok(container)
  }

  /// Constructs every synchronous singleton that does not exist yet, in
  /// registration order. Async singletons are left for `resolve_async`.
  pub fn warm_up(&self) -> Result<()> {
    let target = self.target();
    for registration in self.inner.collection.iter() {
      if registration.lifecycle() == Lifecycle::Singleton && !registration.is_async() {
        resolver::resolve_root(&target, registration.key())?;
      }
    }
    Ok(())
  }

  pub fn create_scope(&self) -> Result<Scope> {
    Scope::root(self.inner.clone())
  }

  pub fn create_async_scope(&self) -> Result<AsyncScope> {
    AsyncScope::root(self.inner.clone())
  }

  /// A long-lived scope for callers without a unit of work.
  ///
  /// Transients resolved through it are not tracked; their teardown runs
  /// only if the caller disposes them.
  pub(crate) fn create_ambient_scope(&self) -> Result<Scope> {
    Scope::ambient(self.inner.clone())
  }

  /// Runs one unit of work in a fresh scope and disposes it afterwards,
  /// whatever the outcome.
  ///
  /// An error from `work` takes precedence over a disposal failure, which is
  /// then only logged.
  pub fn run_in_scope<R, E, F>(&self, work: F) -> std::result::Result<R, E>
  where
    F: FnOnce(&Scope) -> std::result::Result<R, E>,
    E: From<Error>,
  {
    let scope = self.create_scope()?;
    let outcome = work(&scope);
    let disposal = scope.dispose();
    finish_unit_of_work(outcome, disposal)
  }

  /// The async twin of [`run_in_scope`](Self::run_in_scope); teardown hooks
  /// are awaited.
  pub async fn run_in_async_scope<R, E, F, Fut>(&self, work: F) -> std::result::Result<R, E>
  where
    F: FnOnce(AsyncScope) -> Fut,
    Fut: Future<Output = std::result::Result<R, E>>,
    E: From<Error>,
  {
    let scope = self.create_async_scope()?;
    let outcome = work(scope.clone()).await;
    let disposal = scope.dispose().await;
    finish_unit_of_work(outcome, disposal)
  }

  /// Tears down every constructed singleton in reverse construction order
  /// and clears the singleton cache.
  ///
  /// Asynchronous hooks cannot run here and are reported as failures; use
  /// [`dispose_async`](Self::dispose_async) when any are registered. Calling
  /// this again is a no-op.
  pub fn dispose(&self) -> Result<(), DisposalError> {
    match self.begin_dispose() {
      Some(entries) => dispose::dispose_all(entries),
      None => Ok(()),
    }
  }

  pub async fn dispose_async(&self) -> Result<(), DisposalError> {
    match self.begin_dispose() {
      Some(entries) => dispose::dispose_all_async(entries).await,
      None => Ok(()),
    }
  }

  fn begin_dispose(&self) -> Option<Vec<Disposable>> {
    // The flag flips under the teardown-list lock so a construction that
    // finishes concurrently either lands in this batch or is refused.
    let mut constructed = self.inner.constructed.lock();
    if self.inner.disposed.swap(true, Ordering::AcqRel) {
      return None;
    }
    let entries = std::mem::take(&mut *constructed);
    drop(constructed);
    self.inner.singletons.clear();
    debug!(teardowns = entries.len(), "disposing container");
    Some(entries)
  }

  pub fn is_disposed(&self) -> bool {
    self.inner.disposed.load(Ordering::Acquire)
  }

  pub fn collection(&self) -> &FrozenCollection {
    &self.inner.collection
  }

  /// Every registration in registration order.
  pub fn registrations(&self) -> Vec<RegistrationInfo> {
    self
      .inner
      .collection
      .iter()
      .map(|registration| RegistrationInfo {
        key: registration.key().clone(),
        lifecycle: registration.lifecycle(),
        is_async: registration.is_async(),
        has_teardown: registration.has_teardown(),
        constructed: registration.lifecycle() == Lifecycle::Singleton
          && !self.is_disposed()
          && (registration.is_instance()
            || self.inner.singletons.is_constructed(registration.key())),
      })
      .collect()
  }

  fn target(&self) -> Target {
    Target::Root(self.inner.clone())
  }
}

impl ServiceResolver for Container {
  fn resolve_instance(&self, key: &ServiceKey) -> Result<Instance> {
    resolver::resolve_root(&self.target(), key)
  }

  fn resolve_instance_async(&self, key: ServiceKey) -> BoxFuture<'static, Result<Instance>> {
    resolver::resolve_async(self.target(), ResolutionStack::ambient(), key)
  }
}

impl Drop for ContainerInner {
  fn drop(&mut self) {
    let entries = std::mem::take(self.constructed.get_mut());
    if entries.is_empty() {
      return;
    }
    warn!(
      teardowns = entries.len(),
      "container dropped without dispose; running synchronous teardown hooks"
    );
    // Failures are already logged per hook.
    let _ = dispose::dispose_all(entries);
  }
}

fn finish_unit_of_work<R, E: From<Error>>(
  outcome: std::result::Result<R, E>,
  disposal: Result<(), DisposalError>,
) -> std::result::Result<R, E> {
  match (outcome, disposal) {
    (Ok(value), Ok(())) => Ok(value),
    (Ok(_), Err(disposal)) => Err(Error::Disposal(disposal).into()),
    (Err(err), Ok(())) => Err(err),
    (Err(err), Err(disposal)) => {
      warn!(error = %disposal, "scope disposal failed after the unit of work failed");
      Err(err)
    }
  }
}
