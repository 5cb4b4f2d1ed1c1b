use std::sync::Arc;
use uno_ioc::{resolve, Registration, ServiceCollection};

// --- Abstraction and Implementations ---
trait MessageSender: Send + Sync {
  fn send(&self, to: &str, message: &str) -> String;
}

struct EmailSender;
impl MessageSender for EmailSender {
  fn send(&self, to: &str, message: &str) -> String {
    format!("Sending email to {}: '{}'", to, message)
  }
}

struct SmsSender;
impl MessageSender for SmsSender {
  fn send(&self, to: &str, message: &str) -> String {
    format!("Sending SMS to {}: '{}'", to, message)
  }
}

fn main() {
  // --- Registration ---
  // Both implementations share a type and differ by qualifier.
  let mut services = ServiceCollection::new();
  services
    .register(Registration::<dyn MessageSender>::shared(Arc::new(EmailSender)).named("email"))
    .unwrap()
    .register(Registration::<dyn MessageSender>::shared(Arc::new(SmsSender)).named("sms"))
    .unwrap();
  let container = services.build().unwrap();

  // --- Resolution ---
  let email_notifier = resolve!(container, trait MessageSender, "email");
  let sms_notifier = resolve!(container, trait MessageSender, "sms");

  let result1 = email_notifier.send("test@example.com", "Hello from Uno!");
  let result2 = sms_notifier.send("+123456789", "Hello from Uno!");

  println!("{}", result1);
  println!("{}", result2);

  assert!(result1.contains("email"));
  assert!(result2.contains("SMS"));
}
