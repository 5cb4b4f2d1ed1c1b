//! The application-facing facade.

use crate::collection::ServiceCollection;
use crate::container::Container;
use crate::error::{DisposalError, Result};
use crate::key::ServiceKey;
use crate::options::ContainerOptions;
use crate::registration::Instance;
use crate::resolver::ServiceResolver;
use crate::scope::{AsyncScope, Scope};
use futures_util::future::BoxFuture;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, warn};

/// One bounded context's service configuration entrypoint.
///
/// Any `Fn(&mut ServiceCollection) -> Result<()>` closure is a module.
pub trait ServiceModule: Send + Sync {
  fn name(&self) -> &str {
    std::any::type_name::<Self>()
  }

  fn configure(&self, services: &mut ServiceCollection) -> Result<()>;
}

impl<F> ServiceModule for F
where
  F: Fn(&mut ServiceCollection) -> Result<()> + Send + Sync,
{
  fn configure(&self, services: &mut ServiceCollection) -> Result<()> {
    self(services)
  }
}

/// Wraps a container whose configuration is deferred until first use.
///
/// Modules run once, in the order they were added, the first time a service
/// or scope is requested. A failed configuration is returned to the caller
/// and retried on the next request.
///
/// `get_service` resolves through one ambient scope that lives as long as the
/// provider. Transients resolved there are not tracked, so dropping them
/// releases them. Request and job handling should create their own scopes.
pub struct ServiceProvider {
  options: ContainerOptions,
  modules: Vec<Box<dyn ServiceModule>>,
  container: OnceCell<Container>,
  ambient: Mutex<Option<Scope>>,
}

impl Default for ServiceProvider {
  fn default() -> Self {
    Self::new(ContainerOptions::default())
  }
}

impl ServiceProvider {
  pub fn new(options: ContainerOptions) -> Self {
    Self {
      options,
      modules: Vec::new(),
      container: OnceCell::new(),
      ambient: Mutex::new(None),
    }
  }

  /// Adds a module. Modules added after configuration has run are ignored.
  pub fn add_module(&mut self, module: impl ServiceModule + 'static) -> &mut Self {
    if self.is_configured() {
      warn!(module = module.name(), "provider already configured; module ignored");
      return self;
    }
    self.modules.push(Box::new(module));
    self
  }

  pub fn with_module(mut self, module: impl ServiceModule + 'static) -> Self {
    self.add_module(module);
    self
  }

  pub fn is_configured(&self) -> bool {
    self.container.get().is_some()
  }

  /// Runs every module and builds the container, once.
  pub fn configure_services(&self) -> Result<&Container> {
    self.container.get_or_try_init(|| {
      let mut services = ServiceCollection::with_options(self.options.clone());
      for module in &self.modules {
        debug!(module = module.name(), "configuring services");
        module.configure(&mut services)?;
      }
      services.build()
    })
  }

  /// The underlying container, configuring it first if needed.
  pub fn container(&self) -> Result<&Container> {
    self.configure_services()
  }

  pub fn get_service<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    self.ambient_scope()?.resolve::<T>()
  }

  pub fn get_service_named<T: ?Sized + Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
    self.ambient_scope()?.resolve_named::<T>(name)
  }

  pub async fn get_service_async<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    self.ambient_scope()?.resolve_async::<T>().await
  }

  pub fn create_scope(&self) -> Result<Scope> {
    self.configure_services()?.create_scope()
  }

  pub fn create_async_scope(&self) -> Result<AsyncScope> {
    self.configure_services()?.create_async_scope()
  }

  fn ambient_scope(&self) -> Result<Scope> {
    let container = self.configure_services()?;
    let mut ambient = self.ambient.lock();
    if let Some(scope) = ambient.as_ref() {
      return Ok(scope.clone());
    }
    let scope = container.create_ambient_scope()?;
    debug!(scope = scope.id(), "ambient scope created");
    *ambient = Some(scope.clone());
    Ok(scope)
  }

  /// Disposes the ambient scope, if one was created, then the container.
  /// Failures of both are reported together.
  pub fn dispose(&self) -> Result<(), DisposalError> {
    let ambient = self.ambient.lock().take();
    let scope = match ambient {
      Some(scope) => scope.dispose(),
      None => Ok(()),
    };
    let container = match self.container.get() {
      Some(container) => container.dispose(),
      None => Ok(()),
    };
    DisposalError::merge(scope, container)
  }

  pub async fn dispose_async(&self) -> Result<(), DisposalError> {
    let ambient = self.ambient.lock().take();
    let scope = match ambient {
      Some(scope) => scope.dispose_awaiting().await,
      None => Ok(()),
    };
    let container = match self.container.get() {
      Some(container) => container.dispose_async().await,
      None => Ok(()),
    };
    DisposalError::merge(scope, container)
  }
}

impl ServiceResolver for ServiceProvider {
  fn resolve_instance(&self, key: &ServiceKey) -> Result<Instance> {
    self.ambient_scope()?.resolve_instance(key)
  }

  fn resolve_instance_async(&self, key: ServiceKey) -> BoxFuture<'static, Result<Instance>> {
    match self.ambient_scope() {
      Ok(scope) => scope.resolve_instance_async(key),
      Err(err) => Box::pin(futures_util::future::ready(Err(err))),
    }
  }
}
