use crate::key::ServiceKey;
use crate::registration::Lifecycle;
use thiserror::Error;

/// A boxed error produced by user code: factories and teardown hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for `uno_ioc`.
#[derive(Debug, Error)]
pub enum Error {
  #[error("service not registered: {key}")]
  ServiceNotFound { key: ServiceKey },

  #[error("service already registered: {key}")]
  DuplicateRegistration { key: ServiceKey },

  #[error("service collection is frozen, cannot register {key}")]
  CollectionFrozen { key: ServiceKey },

  #[error("invalid registration for {key}: a pre-built instance must be a singleton, got {lifecycle}")]
  InvalidLifecycle { key: ServiceKey, lifecycle: Lifecycle },

  #[error("scoped service {key} cannot be resolved without an active scope")]
  ScopeRequired { key: ServiceKey },

  #[error("scope {scope_id} has been disposed")]
  ScopeDisposed { scope_id: u64 },

  #[error("container has been disposed")]
  ContainerDisposed,

  #[error("circular dependency detected: {}", render_path(.path))]
  CircularDependency { path: Vec<ServiceKey> },

  #[error("failed to construct {key}: {source}")]
  DependencyResolution { key: ServiceKey, source: BoxError },

  #[error("{key} has an async factory and must be resolved with `resolve_async`")]
  AsyncResolutionRequired { key: ServiceKey },

  #[error("resolved instance of {key} is not a `{expected}`")]
  TypeMismatch { key: ServiceKey, expected: &'static str },

  #[error(transparent)]
  Disposal(#[from] DisposalError),

  #[error("invalid container options: {0}")]
  InvalidOptions(String),
}

impl Error {
  /// Maps an error returned by a factory for `key`.
  ///
  /// Errors raised by nested resolutions inside the factory are passed
  /// through untouched so that callers still see, for instance, the
  /// `CircularDependency` of a deep chain rather than a wrapper.
  pub(crate) fn from_factory(key: &ServiceKey, err: BoxError) -> Self {
    match err.downcast::<Error>() {
      Ok(inner) => *inner,
      Err(source) => Error::DependencyResolution {
        key: key.clone(),
        source,
      },
    }
  }

  /// The cycle, when this is a `CircularDependency`.
  pub fn cycle(&self) -> Option<&[ServiceKey]> {
    match self {
      Error::CircularDependency { path } => Some(path),
      _ => None,
    }
  }
}

fn render_path(path: &[ServiceKey]) -> String {
  path
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join(" -> ")
}

/// A single teardown hook that failed during disposal.
#[derive(Debug, Error)]
#[error("{key}: {source}")]
pub struct TeardownFailure {
  pub key: ServiceKey,
  pub source: BoxError,
}

/// Every teardown failure of one scope or container disposal.
///
/// Disposal never stops at the first failing hook; all remaining instances
/// are still torn down and their failures collected here in the order the
/// hooks ran.
#[derive(Debug, Error)]
#[error("{} teardown hook(s) failed: {}", .failures.len(), summarize(.failures))]
pub struct DisposalError {
  failures: Vec<TeardownFailure>,
}

impl DisposalError {
  pub(crate) fn check(failures: Vec<TeardownFailure>) -> std::result::Result<(), DisposalError> {
    if failures.is_empty() {
      Ok(())
    } else {
      Err(DisposalError { failures })
    }
  }

  /// Combines two disposal outcomes, keeping the failures of both.
  pub(crate) fn merge(
    first: std::result::Result<(), DisposalError>,
    second: std::result::Result<(), DisposalError>,
  ) -> std::result::Result<(), DisposalError> {
    match (first, second) {
      (Ok(()), Ok(())) => Ok(()),
      (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
      (Err(mut a), Err(b)) => {
        a.failures.extend(b.failures);
        Err(a)
      }
    }
  }

  pub fn failures(&self) -> &[TeardownFailure] {
    &self.failures
  }

  pub fn into_failures(self) -> Vec<TeardownFailure> {
    self.failures
  }
}

fn summarize(failures: &[TeardownFailure]) -> String {
  failures
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

/// A specialized `Result` type for `uno_ioc` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
