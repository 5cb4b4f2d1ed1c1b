use std::sync::Arc;
use uno_ioc::{resolve, Lifecycle, Registration, ServiceCollection, ServiceResolver};

// 1. Define the abstraction (the trait)
trait Logger: Send + Sync {
  fn log(&self, message: &str);
}

// 2. Define a concrete implementation
struct ConsoleLogger;
impl Logger for ConsoleLogger {
  fn log(&self, message: &str) {
    println!("[CONSOLE LOG]: {}", message);
  }
}

// 3. Define a service that depends on the abstraction
struct ReportService {
  logger: Arc<dyn Logger>,
}

impl ReportService {
  fn generate_report(&self) {
    self.logger.log("Starting report generation.");
    self.logger.log("Finished report generation.");
  }
}

fn main() {
  let mut services = ServiceCollection::new();

  // The container stores an `Arc<dyn Logger>` under the key of `dyn Logger`.
  services
    .register(Registration::<dyn Logger>::factory(Lifecycle::Singleton, |_| {
      Ok(Arc::new(ConsoleLogger) as Arc<dyn Logger>)
    }))
    .unwrap();

  // ReportService does not create its logger; its factory resolves it.
  services
    .add_scoped(|r| {
      Ok(ReportService {
        logger: r.resolve::<dyn Logger>()?,
      })
    })
    .unwrap();

  let container = services.build().unwrap();
  let scope = container.create_scope().unwrap();

  println!("Resolving the high-level service...");
  let report_service = resolve!(scope, ReportService);

  println!("Using the service...");
  report_service.generate_report();

  scope.dispose().unwrap();
}
