//! # Uno IoC
//!
//! A scoped, thread-safe service container for Rust applications.
//!
//! Services are registered once at startup into a [`ServiceCollection`],
//! which is frozen into a [`Container`]. Each unit of work (an HTTP request,
//! a background job) opens a [`Scope`], resolves what it needs through it and
//! disposes it when done.
//!
//! ## Core Concepts
//!
//! - **Lifecycles**: a singleton lives as long as the container, a scoped
//!   service as long as its scope, a transient is built on every resolution.
//! - **Factories**: a factory receives a resolver and declares its
//!   dependencies by resolving them. Resolution chains are checked for
//!   cycles, and a cycle is reported as `A -> B -> A`.
//! - **Async**: factories and teardown hooks may be async; resolve them with
//!   `resolve_async` and dispose through an [`AsyncScope`] or
//!   `Container::dispose_async`.
//! - **Disposal**: instances with a teardown hook are torn down in reverse
//!   creation order when their scope or the container is disposed. All
//!   failures are collected into one [`DisposalError`].
//! - **Provider**: [`ServiceProvider`] defers configuration to the first
//!   request and runs one [`ServiceModule`] per bounded context.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use uno_ioc::{ServiceCollection, ServiceResolver};
//!
//! struct Logger;
//! struct RequestContext { logger: std::sync::Arc<Logger>, id: u64 }
//!
//! static NEXT_ID: AtomicU64 = AtomicU64::new(1);
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let mut services = ServiceCollection::new();
//!   services
//!     .add_singleton(|_| Ok(Logger))?
//!     .add_scoped(|r| {
//!       Ok(RequestContext {
//!         logger: r.resolve::<Logger>()?,
//!         id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
//!       })
//!     })?;
//!   let container = services.build()?;
//!
//!   let scope = container.create_scope()?;
//!   let first = scope.resolve::<RequestContext>()?;
//!   let again = scope.resolve::<RequestContext>()?;
//!   assert_eq!(first.id, again.id);
//!   assert!(std::sync::Arc::ptr_eq(&first.logger, &container.resolve::<Logger>()?));
//!   scope.dispose()?;
//!
//!   container.dispose()?;
//!   Ok(())
//! }
//! ```

mod collection;
mod container;
mod core;
mod dispose;
mod error;
mod key;
mod macros;
mod options;
mod provider;
mod registration;
mod resolver;
mod scope;

pub use collection::{FrozenCollection, ServiceCollection};
pub use container::{Container, RegistrationInfo};
pub use dispose::{AsyncDispose, AsyncTeardownSkipped, Dispose};
pub use error::{BoxError, DisposalError, Error, Result, TeardownFailure};
pub use key::ServiceKey;
pub use options::{ContainerOptions, DuplicatePolicy};
pub use provider::{ServiceModule, ServiceProvider};
pub use registration::{FactoryResult, Instance, Lifecycle, Registration, ServiceRegistration};
pub use resolver::{AsyncResolver, Resolver, ServiceResolver};
pub use scope::{AsyncScope, Scope};

/// Re-exported for implementing [`AsyncDispose`].
pub use async_trait::async_trait;
