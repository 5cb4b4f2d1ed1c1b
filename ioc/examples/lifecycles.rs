use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uno_ioc::{ServiceCollection, ServiceResolver};

// A simple service that gets a unique ID upon creation.
struct RequestTracker {
  id: usize,
}

struct AppClock {
  started_by: usize,
}

struct RequestContext {
  tracker: Arc<RequestTracker>,
}

// A global, thread-safe counter to generate unique IDs.
static ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let mut services = ServiceCollection::new();
  services
    // Built once, on first resolution.
    .add_singleton(|_| {
      println!("Creating SINGLETON AppClock...");
      Ok(AppClock {
        started_by: ID_COUNTER.fetch_add(1, Ordering::SeqCst),
      })
    })?
    // Built on every resolution.
    .add_transient(|_| {
      println!("Creating TRANSIENT RequestTracker...");
      Ok(RequestTracker {
        id: ID_COUNTER.fetch_add(1, Ordering::SeqCst),
      })
    })?
    // Built once per scope.
    .add_scoped(|r| {
      println!("Creating SCOPED RequestContext...");
      Ok(RequestContext {
        tracker: r.resolve()?,
      })
    })?;
  let container = services.build()?;

  println!("--- Resolving Singletons ---");
  let c1 = container.resolve::<AppClock>()?;
  let c2 = container.resolve::<AppClock>()?;
  assert!(Arc::ptr_eq(&c1, &c2), "Singleton instances should be identical");
  println!("Singleton created by tick {}, shared by both handles.\n", c1.started_by);

  println!("--- Resolving Transients ---");
  let t1 = container.resolve::<RequestTracker>()?;
  let t2 = container.resolve::<RequestTracker>()?;
  println!("Transient 1 ID: {}, Transient 2 ID: {}", t1.id, t2.id);
  assert_ne!(t1.id, t2.id);
  println!();

  println!("--- Resolving Scoped Services ---");
  for request in 1..=2 {
    let scope = container.create_scope()?;
    let first = scope.resolve::<RequestContext>()?;
    let again = scope.resolve::<RequestContext>()?;
    assert!(Arc::ptr_eq(&first, &again));
    println!(
      "Request {} (scope {}) sees tracker {}",
      request,
      scope.id(),
      first.tracker.id
    );
    scope.dispose()?;
  }

  container.dispose()?;
  Ok(())
}
