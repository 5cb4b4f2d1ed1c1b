//! Scopes: one resolution context per unit of work.

use crate::container::ContainerInner;
use crate::core::{ResolutionStack, SlotCache};
use crate::dispose::{self, Disposable};
use crate::error::{DisposalError, Error, Result};
use crate::key::ServiceKey;
use crate::registration::Instance;
use crate::resolver::{self, ServiceResolver, Target};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct ScopeInner {
  pub(crate) id: u64,
  pub(crate) container: Arc<ContainerInner>,
  parent: Option<Arc<ScopeInner>>,
  depth: usize,
  pub(crate) scoped: SlotCache,
  pub(crate) disposables: Mutex<Vec<Disposable>>,
  pub(crate) disposed: AtomicBool,
  /// Whether transients constructed here are torn down with the scope.
  pub(crate) owns_transients: bool,
}

impl ScopeInner {
  fn open(
    container: Arc<ContainerInner>,
    parent: Option<Arc<ScopeInner>>,
    owns_transients: bool,
  ) -> Result<Arc<Self>> {
    if let Some(parent) = &parent {
      if parent.disposed.load(Ordering::Acquire) {
        return Err(Error::ScopeDisposed { scope_id: parent.id });
      }
    }
    if container.disposed.load(Ordering::Acquire) {
      return Err(Error::ContainerDisposed);
    }

    let id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
    let depth = parent.as_ref().map_or(1, |parent| parent.depth + 1);
    debug!(scope = id, depth, "scope created");
    Ok(Arc::new(Self {
      id,
      container,
      parent,
      depth,
      scoped: SlotCache::default(),
      disposables: Mutex::new(Vec::new()),
      disposed: AtomicBool::new(false),
      owns_transients,
    }))
  }

  fn child(self: &Arc<Self>) -> Result<Arc<Self>> {
    Self::open(self.container.clone(), Some(self.clone()), true)
  }

  /// Marks the scope disposed and hands out its teardown list, once.
  fn begin_dispose(&self) -> Option<Vec<Disposable>> {
    let mut disposables = self.disposables.lock();
    if self.disposed.swap(true, Ordering::AcqRel) {
      return None;
    }
    let entries = std::mem::take(&mut *disposables);
    drop(disposables);
    self.scoped.clear();
    debug!(scope = self.id, teardowns = entries.len(), "disposing scope");
    Some(entries)
  }

  fn dispose(&self) -> Result<(), DisposalError> {
    match self.begin_dispose() {
      Some(entries) => dispose::dispose_all(entries),
      None => Ok(()),
    }
  }

  async fn dispose_async(&self) -> Result<(), DisposalError> {
    match self.begin_dispose() {
      Some(entries) => dispose::dispose_all_async(entries).await,
      None => Ok(()),
    }
  }

  fn parent_id(&self) -> Option<u64> {
    self.parent.as_ref().map(|parent| parent.id)
  }
}

impl Drop for ScopeInner {
  fn drop(&mut self) {
    let entries = std::mem::take(self.disposables.get_mut());
    if entries.is_empty() {
      return;
    }
    warn!(
      scope = self.id,
      teardowns = entries.len(),
      "scope dropped without dispose; running synchronous teardown hooks"
    );
    let _ = dispose::dispose_all(entries);
  }
}

/// A child resolution context for one unit of work.
///
/// Scoped services are constructed at most once per scope and torn down, in
/// reverse creation order, when the scope is disposed. Singletons always come
/// from the root container. Transients are constructed with this scope as
/// their resolver, so they may depend on scoped services.
///
/// `Scope` is a cheap handle; clones refer to the same scope.
#[derive(Clone)]
pub struct Scope {
  inner: Arc<ScopeInner>,
}

impl Scope {
  pub(crate) fn root(container: Arc<ContainerInner>) -> Result<Self> {
    Ok(Self {
      inner: ScopeInner::open(container, None, true)?,
    })
  }

  pub(crate) fn ambient(container: Arc<ContainerInner>) -> Result<Self> {
    Ok(Self {
      inner: ScopeInner::open(container, None, false)?,
    })
  }

  /// A nested scope. Its scoped cache is its own; nothing is shared with
  /// this scope except singletons.
  pub fn create_scope(&self) -> Result<Scope> {
    Ok(Scope {
      inner: self.inner.child()?,
    })
  }

  pub fn create_async_scope(&self) -> Result<AsyncScope> {
    Ok(AsyncScope {
      inner: self.inner.child()?,
    })
  }

  /// Tears down the instances this scope created, last created first, and
  /// marks it disposed. Every hook runs even when earlier ones fail.
  ///
  /// Asynchronous hooks are reported as failures; use an [`AsyncScope`] for
  /// services with async teardown. Calling this again is a no-op.
  pub fn dispose(&self) -> Result<(), DisposalError> {
    self.inner.dispose()
  }

  pub(crate) async fn dispose_awaiting(&self) -> Result<(), DisposalError> {
    self.inner.dispose_async().await
  }

  pub fn is_disposed(&self) -> bool {
    self.inner.disposed.load(Ordering::Acquire)
  }

  pub fn id(&self) -> u64 {
    self.inner.id
  }

  /// 1 for a scope created by the container, +1 per nesting level.
  pub fn depth(&self) -> usize {
    self.inner.depth
  }

  pub fn parent_id(&self) -> Option<u64> {
    self.inner.parent_id()
  }
}

impl ServiceResolver for Scope {
  fn resolve_instance(&self, key: &ServiceKey) -> Result<Instance> {
    resolver::resolve_root(&Target::Scope(self.inner.clone()), key)
  }

  fn resolve_instance_async(&self, key: ServiceKey) -> BoxFuture<'static, Result<Instance>> {
    resolver::resolve_async(Target::Scope(self.inner.clone()), ResolutionStack::ambient(), key)
  }
}

/// A scope whose disposal awaits asynchronous teardown hooks.
///
/// Resolution behaves exactly as in [`Scope`].
#[derive(Clone)]
pub struct AsyncScope {
  inner: Arc<ScopeInner>,
}

impl AsyncScope {
  pub(crate) fn root(container: Arc<ContainerInner>) -> Result<Self> {
    Ok(Self {
      inner: ScopeInner::open(container, None, true)?,
    })
  }

  pub fn create_scope(&self) -> Result<Scope> {
    Ok(Scope {
      inner: self.inner.child()?,
    })
  }

  pub fn create_async_scope(&self) -> Result<AsyncScope> {
    Ok(AsyncScope {
      inner: self.inner.child()?,
    })
  }

  /// Tears down the instances this scope created, last created first,
  /// awaiting async hooks one at a time. Calling this again is a no-op.
  pub async fn dispose(&self) -> Result<(), DisposalError> {
    self.inner.dispose_async().await
  }

  pub fn is_disposed(&self) -> bool {
    self.inner.disposed.load(Ordering::Acquire)
  }

  pub fn id(&self) -> u64 {
    self.inner.id
  }

  pub fn depth(&self) -> usize {
    self.inner.depth
  }

  pub fn parent_id(&self) -> Option<u64> {
    self.inner.parent_id()
  }
}

impl ServiceResolver for AsyncScope {
  fn resolve_instance(&self, key: &ServiceKey) -> Result<Instance> {
    resolver::resolve_root(&Target::Scope(self.inner.clone()), key)
  }

  fn resolve_instance_async(&self, key: ServiceKey) -> BoxFuture<'static, Result<Instance>> {
    resolver::resolve_async(Target::Scope(self.inner.clone()), ResolutionStack::ambient(), key)
  }
}
