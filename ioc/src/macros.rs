//! Public macros for ergonomic service resolution.

/// Resolves a required service from any [`ServiceResolver`](crate::ServiceResolver).
///
/// Meant for composition roots and factories where a missing service is a
/// configuration bug.
///
/// # Panics
///
/// Panics if the service cannot be resolved. For the fallible form call
/// `resolve`/`resolve_named` on the resolver directly.
///
/// # Examples
///
/// ```
/// use uno_ioc::{resolve, ServiceCollection};
///
/// let mut services = ServiceCollection::new();
/// services.add_instance(String::from("hello")).unwrap();
/// let container = services.build().unwrap();
///
/// let message = resolve!(container, String);
/// assert_eq!(*message, "hello");
/// ```
///
/// ```
/// use std::sync::Arc;
/// use uno_ioc::{resolve, Lifecycle, Registration, ServiceCollection};
///
/// trait Greeter: Send + Sync { fn greet(&self) -> String; }
/// struct EnglishGreeter;
/// impl Greeter for EnglishGreeter { fn greet(&self) -> String { "Hello!".to_string() } }
///
/// let mut services = ServiceCollection::new();
/// services
///   .register(Registration::<dyn Greeter>::factory(Lifecycle::Singleton, |_| {
///     Ok(Arc::new(EnglishGreeter) as Arc<dyn Greeter>)
///   }))
///   .unwrap();
/// let container = services.build().unwrap();
///
/// let greeter = resolve!(container, trait Greeter);
/// assert_eq!(greeter.greet(), "Hello!");
/// ```
#[macro_export]
macro_rules! resolve {
    // resolve!(resolver, trait MyTrait)
    ($resolver:expr, trait $trait_ident:ident) => {
        $crate::ServiceResolver::resolve::<dyn $trait_ident>(&$resolver)
            .unwrap_or_else(|err| {
                panic!(
                    "Failed to resolve required trait service {}: {}",
                    std::any::type_name::<dyn $trait_ident>(),
                    err
                )
            })
    };

    // resolve!(resolver, trait MyTrait, "name")
    ($resolver:expr, trait $trait_ident:ident, $name:expr) => {
        $crate::ServiceResolver::resolve_named::<dyn $trait_ident>(&$resolver, $name)
            .unwrap_or_else(|err| {
                panic!(
                    "Failed to resolve required trait service with name '{}': {}",
                    $name, err
                )
            })
    };

    // resolve!(resolver, MyService)
    ($resolver:expr, $type:ty) => {
        $crate::ServiceResolver::resolve::<$type>(&$resolver)
            .unwrap_or_else(|err| {
                panic!(
                    "Failed to resolve required service {}: {}",
                    std::any::type_name::<$type>(),
                    err
                )
            })
    };

    // resolve!(resolver, MyService, "name")
    ($resolver:expr, $type:ty, $name:expr) => {
        $crate::ServiceResolver::resolve_named::<$type>(&$resolver, $name)
            .unwrap_or_else(|err| {
                panic!(
                    "Failed to resolve required service with name '{}': {}",
                    $name, err
                )
            })
    };
}
