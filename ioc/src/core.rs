//! Core, non-public data structures for the IoC container.

use crate::error::{Error, Result};
use crate::key::ServiceKey;
use crate::registration::{Instance, ServiceRegistration, Strategy};
use dashmap::DashMap;
use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

/// The keys currently under construction in one resolution call chain.
///
/// The ordered path renders the cycle in errors; the set answers membership.
/// A stack never outlives the chain that created it and is never shared
/// between concurrent resolutions.
#[derive(Clone, Default)]
pub(crate) struct ResolutionStack {
  path: Vec<ServiceKey>,
  members: HashSet<ServiceKey>,
}

impl ResolutionStack {
  pub(crate) fn push(&mut self, key: &ServiceKey) -> Result<()> {
    if self.members.contains(key) {
      let start = self.path.iter().position(|k| k == key).unwrap_or(0);
      let mut path = self.path[start..].to_vec();
      path.push(key.clone());
      return Err(Error::CircularDependency { path });
    }
    self.members.insert(key.clone());
    self.path.push(key.clone());
    Ok(())
  }

  pub(crate) fn pop(&mut self) {
    if let Some(key) = self.path.pop() {
      self.members.remove(&key);
    }
  }

  /// A copy of this stack extended by `key`, for call chains that fork.
  pub(crate) fn entered(&self, key: &ServiceKey) -> Result<Self> {
    let mut next = self.clone();
    next.push(key)?;
    Ok(next)
  }

  pub(crate) fn depth(&self) -> usize {
    self.path.len()
  }
}

thread_local! {
  /// The synchronous call chain running on this thread.
  static RESOLVING_STACK: RefCell<ResolutionStack> = RefCell::new(ResolutionStack::default());
}

tokio::task_local! {
  /// The call chain of the async factory this task is running.
  static TASK_CHAIN: ResolutionStack;
}

impl ResolutionStack {
  /// The call chain the caller is part of: the synchronous chain of this
  /// thread, else the chain of the async factory being polled, else empty.
  ///
  /// Resolutions entered through a captured container or scope handle start
  /// from here, so a factory resolving its own key that way still fails with
  /// `CircularDependency`.
  pub(crate) fn ambient() -> Self {
    let on_thread = RESOLVING_STACK
      .try_with(|stack| stack.borrow().clone())
      .unwrap_or_default();
    if on_thread.depth() > 0 {
      return on_thread;
    }
    TASK_CHAIN.try_with(Clone::clone).unwrap_or_default()
  }

  /// Runs `f` with `self` installed as this thread's call chain, restoring the
  /// previous chain afterwards.
  pub(crate) fn install<R>(self, f: impl FnOnce() -> R) -> R {
    let previous = RESOLVING_STACK.with(|stack| stack.replace(self));
    let _restore = Restore(Some(previous));
    f()
  }

  /// Runs `future` with `self` as the task's call chain.
  pub(crate) async fn within<F: std::future::Future>(self, future: F) -> F::Output {
    TASK_CHAIN.scope(self, future).await
  }

  fn current_depth() -> usize {
    RESOLVING_STACK.with(|stack| stack.borrow().depth())
  }
}

struct Restore(Option<ResolutionStack>);

impl Drop for Restore {
  fn drop(&mut self) {
    if let Some(previous) = self.0.take() {
      let _ = RESOLVING_STACK.try_with(|stack| *stack.borrow_mut() = previous);
    }
  }
}

/// An RAII guard to detect and prevent circular dependencies.
///
/// When created, it pushes a service key onto this thread's resolution stack,
/// failing if the key is already there. When dropped it pops the key again,
/// so a failed resolution never leaks stack entries.
pub(crate) struct ResolutionGuard {
  depth: usize,
}

impl ResolutionGuard {
  pub(crate) fn enter(key: &ServiceKey) -> Result<Self> {
    RESOLVING_STACK.with(|stack| stack.borrow_mut().push(key))?;
    Ok(Self {
      depth: ResolutionStack::current_depth(),
    })
  }

  pub(crate) fn depth(&self) -> usize {
    self.depth
  }
}

impl Drop for ResolutionGuard {
  fn drop(&mut self) {
    let _ = RESOLVING_STACK.try_with(|stack| stack.borrow_mut().pop());
  }
}

/// The cached value of one singleton or scoped registration.
///
/// Sync factories and pre-built instances use a blocking cell, async
/// factories a cell whose initialization can be awaited and cancelled. Both
/// publish only a fully constructed instance.
pub(crate) enum Slot {
  Blocking(once_cell::sync::OnceCell<Instance>),
  Awaited(tokio::sync::OnceCell<Instance>),
}

impl Slot {
  fn for_registration(registration: &ServiceRegistration) -> Self {
    match registration.strategy() {
      Strategy::Instance(instance) => {
        Slot::Blocking(once_cell::sync::OnceCell::with_value(instance.clone()))
      }
      Strategy::Factory(_) => Slot::Blocking(once_cell::sync::OnceCell::new()),
      Strategy::AsyncFactory(_) => Slot::Awaited(tokio::sync::OnceCell::new()),
    }
  }

  pub(crate) fn get(&self) -> Option<&Instance> {
    match self {
      Slot::Blocking(cell) => cell.get(),
      Slot::Awaited(cell) => cell.get(),
    }
  }
}

/// Per-owner map of slots: the singleton cache of a container or the scoped
/// cache of a scope.
#[derive(Default)]
pub(crate) struct SlotCache {
  slots: DashMap<ServiceKey, Arc<Slot>>,
}

impl SlotCache {
  /// The slot for `registration`, created empty on first use.
  ///
  /// The map guard is released before the caller initializes the slot, so a
  /// factory may resolve other keys of the same cache.
  pub(crate) fn slot(&self, registration: &ServiceRegistration) -> Arc<Slot> {
    if let Some(slot) = self.slots.get(registration.key()) {
      return slot.value().clone();
    }
    self
      .slots
      .entry(registration.key().clone())
      .or_insert_with(|| Arc::new(Slot::for_registration(registration)))
      .value()
      .clone()
  }

  /// Whether a constructed instance is cached for `key`.
  pub(crate) fn is_constructed(&self, key: &ServiceKey) -> bool {
    self
      .slots
      .get(key)
      .map_or(false, |slot| slot.value().get().is_some())
  }

  pub(crate) fn clear(&self) {
    self.slots.clear();
  }
}
