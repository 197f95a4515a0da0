use crate::core::{OwnerId, ProviderId};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Describes the provider an observer event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
  pub id: ProviderId,
  pub name: Option<Arc<str>>,
  /// The owner the provider's state lives in.
  pub owner: OwnerId,
}

impl fmt::Display for ProviderInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.name {
      Some(name) => write!(f, "{} ({})", name, self.id),
      None => write!(f, "{}", self.id),
    }
  }
}

/// A listener that can be registered on an owner to receive lifecycle
/// notifications for every provider state in it and in its child owners.
///
/// All methods have empty default bodies. They are called synchronously on
/// the owner's thread after the graph has been updated, so an observer may
/// read providers but should not expect to see a half-applied change.
pub trait ProviderObserver {
  /// A provider state was created and its first value computed.
  fn did_add_provider(&self, _provider: &ProviderInfo, _value: &dyn Any) {}

  /// A provider state committed a value that differs from the previous one.
  fn did_update_provider(&self, _provider: &ProviderInfo, _previous: &dyn Any, _next: &dyn Any) {}

  /// A provider state was torn down.
  fn did_dispose_provider(&self, _provider: &ProviderInfo) {}

  /// A listener panicked. The panic was caught and the remaining listeners
  /// were still notified.
  fn listener_failed(&self, _provider: &ProviderInfo, _message: &str) {}
}
