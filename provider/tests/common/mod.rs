#![allow(dead_code)]

use fibre_provider::{ProviderInfo, ProviderObserver};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// Counts factory runs. Factories must be `Send + Sync`, hence the atomic.
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn hit(&self) {
    self.0.fetch_add(1, Ordering::SeqCst);
  }

  pub fn get(&self) -> usize {
    self.0.load(Ordering::SeqCst)
  }
}

// An ordered log that factories and dispose hooks can append to.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, entry: impl Into<String>) {
    self.0.lock().unwrap().push(entry.into());
  }

  pub fn entries(&self) -> Vec<String> {
    self.0.lock().unwrap().clone()
  }
}

// Collects every value a listener is called with.
pub fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, impl Fn(&T) + 'static) {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let sink = seen.clone();
  (seen, move |value: &T| sink.borrow_mut().push(value.clone()))
}

// An observer that records a line per event.
#[derive(Clone, Default)]
pub struct RecordingObserver {
  pub events: Rc<RefCell<Vec<String>>>,
}

fn label(provider: &ProviderInfo) -> String {
  provider.name.as_deref().unwrap_or("?").to_string()
}

impl ProviderObserver for RecordingObserver {
  fn did_add_provider(&self, provider: &ProviderInfo, value: &dyn Any) {
    let shown = value.downcast_ref::<i32>().map(|v| v.to_string()).unwrap_or_default();
    self.events.borrow_mut().push(format!("add {} {}", label(provider), shown));
  }

  fn did_update_provider(&self, provider: &ProviderInfo, previous: &dyn Any, next: &dyn Any) {
    let shown = |v: &dyn Any| v.downcast_ref::<i32>().map(|v| v.to_string()).unwrap_or_default();
    self
      .events
      .borrow_mut()
      .push(format!("update {} {} -> {}", label(provider), shown(previous), shown(next)));
  }

  fn did_dispose_provider(&self, provider: &ProviderInfo) {
    self.events.borrow_mut().push(format!("dispose {}", label(provider)));
  }

  fn listener_failed(&self, provider: &ProviderInfo, message: &str) {
    self.events.borrow_mut().push(format!("listener failed {}: {}", label(provider), message));
  }
}

pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}
