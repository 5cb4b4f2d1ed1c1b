//! Teardown of constructed instances.

use crate::error::{DisposalError, TeardownFailure};
use crate::key::ServiceKey;
use crate::registration::{FactoryResult, Instance, ServiceRegistration, Teardown};
use thiserror::Error;
use tracing::warn;

/// Synchronous teardown for services holding resources.
///
/// Hook it up with [`Registration::disposable`](crate::Registration::disposable).
pub trait Dispose: Send + Sync {
  fn dispose(&self) -> FactoryResult<()>;
}

/// Asynchronous teardown, awaited by `AsyncScope::dispose` and
/// `Container::dispose_async`.
///
/// Hook it up with
/// [`Registration::async_disposable`](crate::Registration::async_disposable).
#[async_trait::async_trait]
pub trait AsyncDispose: Send + Sync {
  async fn dispose(&self) -> FactoryResult<()>;
}

/// Reported for an async teardown hook met by a synchronous disposal.
#[derive(Debug, Error)]
#[error("asynchronous teardown hook skipped: dispose through an async scope or `dispose_async`")]
pub struct AsyncTeardownSkipped;

/// A constructed instance waiting for its teardown hook.
pub(crate) struct Disposable {
  key: ServiceKey,
  instance: Instance,
  teardown: Teardown,
}

impl Disposable {
  /// `None` when the registration has no teardown hook.
  pub(crate) fn track(registration: &ServiceRegistration, instance: &Instance) -> Option<Self> {
    registration.teardown().map(|teardown| Disposable {
      key: registration.key().clone(),
      instance: instance.clone(),
      teardown: teardown.clone(),
    })
  }
}

/// Runs the hooks of `entries` in reverse creation order.
pub(crate) fn dispose_all(entries: Vec<Disposable>) -> Result<(), DisposalError> {
  let mut failures = Vec::new();
  for entry in entries.into_iter().rev() {
    let outcome = match &entry.teardown {
      Teardown::Blocking(hook) => hook(&entry.instance),
      Teardown::Awaited(_) => Err(AsyncTeardownSkipped.into()),
    };
    if let Err(source) = outcome {
      warn!(service = %entry.key, error = %source, "teardown hook failed");
      failures.push(TeardownFailure {
        key: entry.key,
        source,
      });
    }
  }
  DisposalError::check(failures)
}

/// Like [`dispose_all`], awaiting asynchronous hooks in sequence.
pub(crate) async fn dispose_all_async(entries: Vec<Disposable>) -> Result<(), DisposalError> {
  let mut failures = Vec::new();
  for entry in entries.into_iter().rev() {
    let outcome = match &entry.teardown {
      Teardown::Blocking(hook) => hook(&entry.instance),
      Teardown::Awaited(hook) => hook(entry.instance.clone()).await,
    };
    if let Err(source) = outcome {
      warn!(service = %entry.key, error = %source, "teardown hook failed");
      failures.push(TeardownFailure {
        key: entry.key,
        source,
      });
    }
  }
  DisposalError::check(failures)
}
