// ioc/tests/macros.rs

//! Tests for the `resolve!` macro against containers, scopes and the provider.

use std::sync::Arc;
use uno_ioc::{resolve, Lifecycle, Registration, ServiceCollection, ServiceProvider};

// --- Test Fixtures ---

struct MacroTestService {
  value: i32,
}
trait MacroTestTrait: Send + Sync {
  fn value(&self) -> i32;
}
impl MacroTestTrait for MacroTestService {
  fn value(&self) -> i32 {
    self.value
  }
}
struct UnregisteredService;

fn services() -> ServiceCollection {
  let mut services = ServiceCollection::new();
  services
    .add_instance(MacroTestService { value: 100 })
    .unwrap()
    .register(Registration::instance(MacroTestService { value: 101 }).named("named"))
    .unwrap()
    .register(Registration::<dyn MacroTestTrait>::factory(Lifecycle::Scoped, |_| {
      Ok(Arc::new(MacroTestService { value: 102 }) as Arc<dyn MacroTestTrait>)
    }))
    .unwrap()
    .register(
      Registration::<dyn MacroTestTrait>::shared(Arc::new(MacroTestService { value: 103 }))
        .named("named_trait"),
    )
    .unwrap();
  services
}

// --- Tests ---

#[test]
fn test_resolve_from_container() {
  let container = services().build().unwrap();

  assert_eq!(resolve!(container, MacroTestService).value, 100);
  assert_eq!(resolve!(container, MacroTestService, "named").value, 101);
  assert_eq!(resolve!(container, trait MacroTestTrait, "named_trait").value(), 103);
}

#[test]
fn test_resolve_from_scope() {
  let container = services().build().unwrap();
  let scope = container.create_scope().unwrap();

  let first = resolve!(scope, trait MacroTestTrait);
  let second = resolve!(&scope, trait MacroTestTrait);
  assert_eq!(first.value(), 102);
  assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_resolve_from_provider() {
  let provider = ServiceProvider::default().with_module(
    |services: &mut ServiceCollection| -> uno_ioc::Result<()> {
      services.add_singleton(|_| Ok(MacroTestService { value: 7 }))?;
      Ok(())
    },
  );

  assert_eq!(resolve!(provider, MacroTestService).value, 7);
}

#[test]
#[should_panic(expected = "Failed to resolve required service")]
fn test_resolve_panics_on_missing() {
  let container = services().build().unwrap();
  resolve!(container, UnregisteredService);
}

#[test]
#[should_panic(expected = "Failed to resolve required trait service")]
fn test_resolve_trait_panics_on_scope_required() {
  // Scoped services need a scope even through the macro.
  let container = services().build().unwrap();
  resolve!(container, trait MacroTestTrait);
}

#[test]
#[should_panic(expected = "Failed to resolve required service with name 'missing_name'")]
fn test_resolve_named_panics_on_missing_name() {
  let container = services().build().unwrap();
  resolve!(container, MacroTestService, "missing_name");
}
