use std::panic;
use uno_ioc::{resolve, Error, ServiceCollection, ServiceResolver};

struct UnregisteredService;

struct A;
struct B;

fn main() {
  let mut services = ServiceCollection::new();
  services
    .add_scoped(|r| {
      r.resolve::<B>()?;
      Ok(A)
    })
    .unwrap()
    .add_scoped(|r| {
      r.resolve::<A>()?;
      Ok(B)
    })
    .unwrap();
  let container = services.build().unwrap();

  // --- Using the panicking `resolve!` macro ---
  println!("Attempting to resolve a service that was never registered...");
  let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
    let _service = resolve!(container, UnregisteredService);
  }));
  assert!(result.is_err(), "resolve! should have panicked.");
  println!("Successfully caught the expected panic from resolve!.");

  // --- Using the fallible methods ---
  println!("\nNow, attempting the same through `try_resolve`...");
  match container.try_resolve::<UnregisteredService>() {
    Ok(None) => println!("Correctly received `None` for the missing service."),
    _ => panic!("Should not have found the service!"),
  }

  // --- Lifecycle and cycle errors ---
  match container.resolve::<A>() {
    Err(err @ Error::ScopeRequired { .. }) => println!("Without a scope: {}", err),
    _ => panic!("Scoped services need a scope"),
  }

  let scope = container.create_scope().unwrap();
  match scope.resolve::<A>() {
    Err(err) => {
      println!("Inside a scope: {}", err);
      assert_eq!(err.cycle().map(<[_]>::len), Some(3));
    }
    Ok(_) => panic!("A and B depend on each other"),
  }
  scope.dispose().unwrap();
}
