use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uno_ioc::{
  AsyncDispose, AsyncScope, AsyncTeardownSkipped, BoxError, Error, FactoryResult, Registration,
  ServiceCollection, ServiceKey, ServiceResolver,
};

type Journal = Arc<Mutex<Vec<&'static str>>>;

struct Pool {
  id: usize,
}

struct Session {
  pool: Arc<Pool>,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_singleton_is_built_once_across_tasks() {
  let executions = Arc::new(AtomicUsize::new(0));
  let counter = executions.clone();
  let mut services = ServiceCollection::new();
  services
    .add_singleton_async(move |_| {
      let counter = counter.clone();
      async move {
        let id = counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, BoxError>(Pool { id })
      }
    })
    .unwrap();
  let container = services.build().unwrap();

  let tasks: Vec<_> = (0..16)
    .map(|_| {
      let container = container.clone();
      tokio::spawn(async move { container.resolve_async::<Pool>().await.unwrap() })
    })
    .collect();
  let mut pools = Vec::new();
  for task in tasks {
    pools.push(task.await.unwrap());
  }

  assert_eq!(executions.load(Ordering::SeqCst), 1);
  assert!(pools.iter().all(|pool| Arc::ptr_eq(pool, &pools[0])));
  assert_eq!(pools[0].id, 0);
}

#[tokio::test]
async fn test_async_scoped_service_per_scope() {
  let mut services = ServiceCollection::new();
  services
    .add_singleton_async(|_| async { Ok::<_, BoxError>(Pool { id: 7 }) })
    .unwrap()
    .add_scoped_async(|r| async move {
      let pool = r.resolve_async::<Pool>().await?;
      Ok::<_, BoxError>(Session { pool })
    })
    .unwrap();
  let container = services.build().unwrap();
  let first = container.create_async_scope().unwrap();
  let second = container.create_async_scope().unwrap();

  let a = first.resolve_async::<Session>().await.unwrap();
  let a_again = first.resolve_async::<Session>().await.unwrap();
  let b = second.resolve_async::<Session>().await.unwrap();

  assert!(Arc::ptr_eq(&a, &a_again));
  assert!(!Arc::ptr_eq(&a, &b));
  assert!(Arc::ptr_eq(&a.pool, &b.pool));
  assert_eq!(a.pool.id, 7);

  first.dispose().await.unwrap();
  assert!(matches!(
    first.resolve_async::<Session>().await,
    Err(Error::ScopeDisposed { .. })
  ));
  second.resolve_async::<Session>().await.unwrap();
}

#[tokio::test]
async fn test_sync_path_requires_constructed_async_services() {
  let mut services = ServiceCollection::new();
  services
    .add_singleton_async(|_| async { Ok::<_, BoxError>(Pool { id: 1 }) })
    .unwrap();
  let container = services.build().unwrap();

  let err = container.resolve::<Pool>().err().unwrap();
  assert!(matches!(err, Error::AsyncResolutionRequired { ref key } if *key == ServiceKey::of::<Pool>()));

  let built = container.resolve_async::<Pool>().await.unwrap();
  // Once constructed, the cached instance is visible to synchronous callers.
  assert!(Arc::ptr_eq(&built, &container.resolve::<Pool>().unwrap()));
}

#[tokio::test]
async fn test_async_factories_mix_with_sync_ones() {
  struct Settings {
    size: usize,
  }

  let mut services = ServiceCollection::new();
  services
    .add_singleton(|_| Ok(Settings { size: 4 }))
    .unwrap()
    .add_transient_async(|r| async move {
      let settings = r.resolve::<Settings>()?;
      Ok::<_, BoxError>(Pool { id: settings.size })
    })
    .unwrap()
    .add_scoped(|r| {
      let settings = r.resolve::<Settings>()?;
      Ok(Session {
        pool: Arc::new(Pool { id: settings.size }),
      })
    })
    .unwrap();
  let container = services.build().unwrap();
  let scope = container.create_async_scope().unwrap();

  let first = scope.resolve_async::<Pool>().await.unwrap();
  let second = scope.resolve_async::<Pool>().await.unwrap();
  assert_eq!(first.id, 4);
  assert!(!Arc::ptr_eq(&first, &second));

  // Sync factories are reachable from the async path as well.
  let session = scope.resolve_async::<Session>().await.unwrap();
  assert_eq!(session.pool.id, 4);
  scope.dispose().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_construction_leaves_no_trace() {
  struct Slow;

  let attempts = Arc::new(AtomicUsize::new(0));
  let counter = attempts.clone();
  let mut services = ServiceCollection::new();
  services
    .add_singleton_async(move |_| {
      let counter = counter.clone();
      async move {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
          tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok::<_, BoxError>(Slow)
      }
    })
    .unwrap();
  let container = services.build().unwrap();

  let timed_out =
    tokio::time::timeout(Duration::from_millis(20), container.resolve_async::<Slow>()).await;
  assert!(timed_out.is_err());
  assert!(!container.registrations()[0].constructed);

  container.resolve_async::<Slow>().await.unwrap();
  assert_eq!(attempts.load(Ordering::SeqCst), 2);
  assert!(container.registrations()[0].constructed);
}

#[tokio::test]
async fn test_async_teardown_is_awaited_in_reverse_order() {
  struct Channel(&'static str);
  struct Consumer {
    _channel: Arc<Channel>,
  }

  let journal = Journal::default();
  let log = journal.clone();
  let closing = move |channel: Arc<Channel>| {
    let log = log.clone();
    async move {
      tokio::task::yield_now().await;
      log.lock().push(channel.0);
      Ok::<_, BoxError>(())
    }
  };
  let consumer_log = journal.clone();

  let mut services = ServiceCollection::new();
  services
    .register(
      Registration::scoped_async(|_| async { Ok::<_, BoxError>(Channel("channel")) })
        .on_dispose_async(closing),
    )
    .unwrap()
    .register(
      Registration::scoped_async(|r| async move {
        let channel = r.resolve_async::<Channel>().await?;
        Ok::<_, BoxError>(Consumer { _channel: channel })
      })
      .on_dispose(move |_: &Consumer| {
        consumer_log.lock().push("consumer");
        Ok(())
      }),
    )
    .unwrap();
  let container = services.build().unwrap();
  let scope = container.create_async_scope().unwrap();

  scope.resolve_async::<Consumer>().await.unwrap();
  scope.dispose().await.unwrap();

  assert_eq!(*journal.lock(), vec!["consumer", "channel"]);
}

#[tokio::test]
async fn test_sync_disposal_reports_async_teardown() {
  struct Stream;

  let mut services = ServiceCollection::new();
  services
    .register(
      Registration::scoped_async(|_| async { Ok::<_, BoxError>(Stream) })
        .on_dispose_async(|_stream: Arc<Stream>| async { Ok::<_, BoxError>(()) }),
    )
    .unwrap();
  let container = services.build().unwrap();
  let scope = container.create_async_scope().unwrap();
  let nested = scope.create_scope().unwrap();

  nested.resolve_async::<Stream>().await.unwrap();
  let err = nested.dispose().unwrap_err();

  assert_eq!(err.failures().len(), 1);
  assert_eq!(err.failures()[0].key, ServiceKey::of::<Stream>());
  assert!(err.failures()[0].source.is::<AsyncTeardownSkipped>());
  scope.dispose().await.unwrap();
}

#[tokio::test]
async fn test_async_dispose_trait_and_container_disposal() {
  struct Broker {
    closed: Arc<AtomicUsize>,
  }

  #[uno_ioc::async_trait]
  impl AsyncDispose for Broker {
    async fn dispose(&self) -> FactoryResult<()> {
      tokio::task::yield_now().await;
      self.closed.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  }

  let closed = Arc::new(AtomicUsize::new(0));
  let flag = closed.clone();
  let mut services = ServiceCollection::new();
  services
    .register(
      Registration::singleton_async(move |_| {
        let closed = flag.clone();
        async move { Ok::<_, BoxError>(Broker { closed }) }
      })
      .async_disposable(),
    )
    .unwrap();
  let container = services.build().unwrap();
  container.resolve_async::<Broker>().await.unwrap();

  container.dispose_async().await.unwrap();
  container.dispose_async().await.unwrap();
  assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_async_cycle_is_detected() {
  struct A;
  struct B;

  let mut services = ServiceCollection::new();
  services
    .add_scoped_async(|r| async move {
      r.resolve_async::<B>().await?;
      Ok::<_, BoxError>(A)
    })
    .unwrap()
    .add_scoped(|r| {
      r.resolve::<A>()?;
      Ok(B)
    })
    .unwrap();
  let container = services.build().unwrap();
  let scope = container.create_async_scope().unwrap();

  let err = scope.resolve_async::<A>().await.err().unwrap();
  assert_eq!(
    err.cycle().unwrap(),
    &[ServiceKey::of::<A>(), ServiceKey::of::<B>(), ServiceKey::of::<A>()]
  );
}

#[tokio::test]
async fn test_async_self_resolution_through_a_captured_scope_is_a_cycle() {
  struct Feed;

  let handle: Arc<Mutex<Option<AsyncScope>>> = Arc::default();
  let captured = handle.clone();
  let mut services = ServiceCollection::new();
  services
    .add_scoped_async(move |_| {
      let scope = captured.lock().clone();
      async move {
        if let Some(scope) = scope {
          scope.resolve_async::<Feed>().await?;
        }
        Ok::<_, BoxError>(Feed)
      }
    })
    .unwrap();
  let container = services.build().unwrap();
  let scope = container.create_async_scope().unwrap();
  *handle.lock() = Some(scope.clone());

  let err = tokio::time::timeout(Duration::from_secs(5), scope.resolve_async::<Feed>())
    .await
    .expect("self resolution must not wait on its own cell")
    .err()
    .unwrap();
  assert_eq!(
    err.cycle().unwrap(),
    &[ServiceKey::of::<Feed>(), ServiceKey::of::<Feed>()]
  );

  handle.lock().take();
  assert!(scope.resolve_async::<Feed>().await.is_ok());
  scope.dispose().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_branches_of_one_factory() {
  struct Shard(usize);
  struct Cluster {
    shards: Vec<Arc<Shard>>,
  }

  let next = Arc::new(AtomicUsize::new(0));
  let mut services = ServiceCollection::new();
  services
    .add_transient_async(move |_| {
      let next = next.clone();
      async move {
        tokio::task::yield_now().await;
        Ok::<_, BoxError>(Shard(next.fetch_add(1, Ordering::SeqCst)))
      }
    })
    .unwrap()
    .add_scoped_async(|r| async move {
      // Sibling resolutions of the same key are not a cycle.
      let (a, b) = tokio::join!(r.resolve_async::<Shard>(), r.resolve_async::<Shard>());
      Ok::<_, BoxError>(Cluster { shards: vec![a?, b?] })
    })
    .unwrap();
  let container = services.build().unwrap();

  let cluster = container
    .run_in_async_scope(|scope| async move { scope.resolve_async::<Cluster>().await })
    .await
    .unwrap();
  let mut ids: Vec<_> = cluster.shards.iter().map(|shard| shard.0).collect();
  ids.sort_unstable();
  assert_eq!(ids, vec![0, 1]);
}
