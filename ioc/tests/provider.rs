use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use uno_ioc::{
  BoxError, ContainerOptions, Error, Registration, ServiceCollection, ServiceModule,
  ServiceProvider, ServiceResolver,
};

// --- Fixtures ---

trait UserRepository: Send + Sync {
  fn find(&self, id: u32) -> Option<String>;
}

struct InMemoryUsers;
impl UserRepository for InMemoryUsers {
  fn find(&self, id: u32) -> Option<String> {
    (id == 1).then(|| "ada".to_string())
  }
}

struct UserService {
  users: Arc<dyn UserRepository>,
}

struct UnitOfWork;

/// The users bounded context.
struct UsersModule;

impl ServiceModule for UsersModule {
  fn name(&self) -> &str {
    "users"
  }

  fn configure(&self, services: &mut ServiceCollection) -> uno_ioc::Result<()> {
    services
      .register(Registration::<dyn UserRepository>::factory(
        uno_ioc::Lifecycle::Singleton,
        |_| Ok(Arc::new(InMemoryUsers) as Arc<dyn UserRepository>),
      ))?
      .add_scoped(|r| Ok(UserService { users: r.resolve()? }))?
      .add_scoped(|_| Ok(UnitOfWork))?;
    Ok(())
  }
}

// --- Tests ---

#[test]
fn test_configures_once_on_first_use() {
  let runs = Arc::new(AtomicUsize::new(0));
  let counter = runs.clone();
  let provider = ServiceProvider::default()
    .with_module(UsersModule)
    .with_module(move |services: &mut ServiceCollection| -> uno_ioc::Result<()> {
      counter.fetch_add(1, Ordering::SeqCst);
      services.add_instance(String::from("settings"))?;
      Ok(())
    });
  assert!(!provider.is_configured());

  let users = provider.get_service::<UserService>().unwrap();
  assert_eq!(users.users.find(1).as_deref(), Some("ada"));
  assert!(provider.is_configured());

  // The ambient scope is reused between calls.
  assert!(Arc::ptr_eq(&users, &provider.get_service::<UserService>().unwrap()));
  assert_eq!(*provider.get_service::<String>().unwrap(), "settings");
  provider.create_scope().unwrap();
  assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_first_use_configures_once() {
  let runs = Arc::new(AtomicUsize::new(0));
  let counter = runs.clone();
  let provider = ServiceProvider::default().with_module(
    move |services: &mut ServiceCollection| -> uno_ioc::Result<()> {
      counter.fetch_add(1, Ordering::SeqCst);
      thread::sleep(std::time::Duration::from_millis(20));
      services.add_singleton(|_| Ok(InMemoryUsers))?;
      Ok(())
    },
  );

  thread::scope(|s| {
    for _ in 0..8 {
      s.spawn(|| provider.get_service::<InMemoryUsers>().unwrap());
    }
  });
  assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failed_configuration_is_retried() {
  let attempts = Arc::new(AtomicUsize::new(0));
  let counter = attempts.clone();
  let provider = ServiceProvider::default().with_module(
    move |services: &mut ServiceCollection| -> uno_ioc::Result<()> {
      services.add_instance(1_u8)?;
      if counter.fetch_add(1, Ordering::SeqCst) == 0 {
        // A second registration of the same key is a startup error.
        services.add_instance(2_u8)?;
      }
      Ok(())
    },
  );

  assert!(matches!(
    provider.get_service::<u8>(),
    Err(Error::DuplicateRegistration { .. })
  ));
  assert!(!provider.is_configured());
  assert_eq!(*provider.get_service::<u8>().unwrap(), 1);
  assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_request_scopes_are_separate_from_the_ambient_scope() {
  let provider = ServiceProvider::default().with_module(UsersModule);

  let ambient = provider.get_service::<UnitOfWork>().unwrap();
  let request = provider.create_scope().unwrap();
  let in_request = request.resolve::<UnitOfWork>().unwrap();
  assert!(!Arc::ptr_eq(&ambient, &in_request));

  // The provider itself resolves through the ambient scope.
  assert!(Arc::ptr_eq(&ambient, &provider.resolve::<UnitOfWork>().unwrap()));
  request.dispose().unwrap();
}

#[test]
fn test_dispose_tears_down_ambient_scope_then_container() {
  struct Connection;

  let journal: Arc<Mutex<Vec<&'static str>>> = Arc::default();
  let scoped_log = journal.clone();
  let singleton_log = journal.clone();
  let provider = ServiceProvider::default().with_module(
    move |services: &mut ServiceCollection| -> uno_ioc::Result<()> {
      let scoped_log = scoped_log.clone();
      let singleton_log = singleton_log.clone();
      services
        .register(Registration::singleton(|_| Ok(Connection)).on_dispose(
          move |_: &Connection| {
            singleton_log.lock().push("connection");
            Ok(())
          },
        ))?
        .register(Registration::scoped(|_| Ok(UnitOfWork)).on_dispose(
          move |_: &UnitOfWork| {
            scoped_log.lock().push("unit of work");
            Ok(())
          },
        ))?;
      Ok(())
    },
  );

  provider.get_service::<UnitOfWork>().unwrap();
  provider.get_service::<Connection>().unwrap();
  provider.dispose().unwrap();

  assert_eq!(*journal.lock(), vec!["unit of work", "connection"]);
  assert!(matches!(
    provider.get_service::<Connection>(),
    Err(Error::ContainerDisposed)
  ));
  // Disposing again is harmless.
  provider.dispose().unwrap();
}

#[test]
fn test_ambient_transients_are_not_retained() {
  struct Job;

  let teardowns = Arc::new(AtomicUsize::new(0));
  let counter = teardowns.clone();
  let provider = ServiceProvider::default().with_module(
    move |services: &mut ServiceCollection| -> uno_ioc::Result<()> {
      let counter = counter.clone();
      services.register(Registration::transient(|_| Ok(Job)).on_dispose(move |_: &Job| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
      }))?;
      Ok(())
    },
  );

  for _ in 0..3 {
    let job = provider.get_service::<Job>().unwrap();
    let weak = Arc::downgrade(&job);
    drop(job);
    assert!(weak.upgrade().is_none());
  }
  provider.dispose().unwrap();
  assert_eq!(teardowns.load(Ordering::SeqCst), 0);
}

#[test]
fn test_dispose_before_configuration_is_a_no_op() {
  let provider = ServiceProvider::new(ContainerOptions::default()).with_module(UsersModule);
  provider.dispose().unwrap();
  assert!(!provider.is_configured());
}

#[test]
fn test_modules_run_in_order_and_see_the_options() {
  let order: Arc<Mutex<Vec<&'static str>>> = Arc::default();
  let first = order.clone();
  let second = order.clone();
  let mut provider = ServiceProvider::new(
    ContainerOptions::from_yaml_str("duplicate_policy: overwrite\n").unwrap(),
  );
  provider
    .add_module(move |services: &mut ServiceCollection| -> uno_ioc::Result<()> {
      first.lock().push("defaults");
      services.add_instance(String::from("default"))?;
      Ok(())
    })
    .add_module(move |services: &mut ServiceCollection| -> uno_ioc::Result<()> {
      second.lock().push("overrides");
      services.add_instance(String::from("override"))?;
      Ok(())
    });

  assert_eq!(*provider.get_service::<String>().unwrap(), "override");
  assert_eq!(*order.lock(), vec!["defaults", "overrides"]);
  assert_eq!(UsersModule.name(), "users");
}

#[tokio::test]
async fn test_async_access_through_the_provider() {
  struct Client(&'static str);

  let provider = ServiceProvider::default().with_module(
    |services: &mut ServiceCollection| -> uno_ioc::Result<()> {
      services.add_singleton_async(|_| async { Ok::<_, BoxError>(Client("ready")) })?;
      Ok(())
    },
  );

  let client = provider.get_service_async::<Client>().await.unwrap();
  assert_eq!(client.0, "ready");
  assert!(Arc::ptr_eq(&client, &provider.get_service::<Client>().unwrap()));

  let scope = provider.create_async_scope().unwrap();
  assert!(Arc::ptr_eq(&client, &scope.resolve_async::<Client>().await.unwrap()));
  scope.dispose().await.unwrap();
  provider.dispose_async().await.unwrap();
}
