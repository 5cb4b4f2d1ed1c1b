use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uno_ioc::{AsyncDispose, BoxError, FactoryResult, Registration, ServiceCollection, ServiceResolver};

struct ConnectionPool {
  size: usize,
}

#[uno_ioc::async_trait]
impl AsyncDispose for ConnectionPool {
  async fn dispose(&self) -> FactoryResult<()> {
    tokio::time::sleep(Duration::from_millis(10)).await;
    info!(size = self.size, "connection pool drained");
    Ok(())
  }
}

struct Transaction {
  pool: Arc<ConnectionPool>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let mut services = ServiceCollection::new();
  services
    .register(
      Registration::singleton_async(|_| async {
        // Stands in for connecting to a database.
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, BoxError>(ConnectionPool { size: 8 })
      })
      .async_disposable(),
    )?
    .register(
      Registration::scoped_async(|r| async move {
        let pool = r.resolve_async::<ConnectionPool>().await?;
        Ok::<_, BoxError>(Transaction { pool })
      })
      .on_dispose_async(|tx: Arc<Transaction>| async move {
        info!(pool = tx.pool.size, "transaction committed");
        Ok::<_, BoxError>(())
      }),
    )?;
  let container = services.build()?;

  let handles: Vec<_> = (0..4)
    .map(|job| {
      let container = container.clone();
      tokio::spawn(async move {
        container
          .run_in_async_scope(|scope| async move {
            let tx = scope.resolve_async::<Transaction>().await?;
            info!(job, scope = scope.id(), pool = tx.pool.size, "job finished");
            Ok::<_, uno_ioc::Error>(())
          })
          .await
      })
    })
    .collect();
  for handle in handles {
    handle.await??;
  }

  container.dispose_async().await?;
  Ok(())
}
