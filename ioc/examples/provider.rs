use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uno_ioc::{
  ContainerOptions, Registration, ServiceCollection, ServiceModule, ServiceProvider,
  ServiceResolver,
};

// --- Billing context ---
struct Ledger {
  entries: parking_lot::Mutex<Vec<String>>,
}

struct InvoiceService {
  ledger: Arc<Ledger>,
}

impl InvoiceService {
  fn bill(&self, customer: &str) {
    self.ledger.entries.lock().push(format!("invoice for {}", customer));
  }
}

struct BillingModule;

impl ServiceModule for BillingModule {
  fn name(&self) -> &str {
    "billing"
  }

  fn configure(&self, services: &mut ServiceCollection) -> uno_ioc::Result<()> {
    services
      .register(
        Registration::singleton(|_| {
          Ok(Ledger {
            entries: parking_lot::Mutex::new(Vec::new()),
          })
        })
        .on_dispose(|ledger: &Ledger| {
          println!("Closing ledger with {} entries", ledger.entries.lock().len());
          Ok(())
        }),
      )?
      .add_scoped(|r| Ok(InvoiceService { ledger: r.resolve()? }))?;
    Ok(())
  }
}

const OPTIONS: &str = "
duplicate_policy: error
eager_singletons: true
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
    .init();

  let provider = ServiceProvider::new(ContainerOptions::from_yaml_str(OPTIONS)?)
    .with_module(BillingModule)
    // A closure is a module too.
    .with_module(|services: &mut ServiceCollection| -> uno_ioc::Result<()> {
      services.add_instance(String::from("ACME Corp"))?;
      Ok(())
    });

  // Configuration runs here, on first use.
  let customer = provider.get_service::<String>()?;

  // Each request gets its own scope.
  for _ in 0..3 {
    let request = provider.create_scope()?;
    request.resolve::<InvoiceService>()?.bill(&customer);
    request.dispose()?;
  }

  let ledger = provider.get_service::<Ledger>()?;
  println!("Ledger: {:?}", ledger.entries.lock());
  drop(ledger);

  provider.dispose()?;
  Ok(())
}
