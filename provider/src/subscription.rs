use crate::core::ListenerId;
use crate::error::{ProviderError, Result};
use crate::graph::NodeId;
use crate::shared::Shared;

use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

/// The handle returned by [`ProviderStateOwner::watch`](crate::ProviderStateOwner::watch).
///
/// The listener stays registered until [`close`](Self::close) is called or
/// the state is disposed. Dropping the handle does not close it; this lets
/// fire-and-forget listeners live as long as the owner.
#[must_use = "keep the subscription to be able to close it"]
pub struct ProviderSubscription<T> {
  shared: Weak<Shared>,
  node: NodeId,
  listener: ListenerId,
  _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ProviderSubscription<T> {
  pub(crate) fn new(shared: Weak<Shared>, node: NodeId, listener: ListenerId) -> Self {
    Self {
      shared,
      node,
      listener,
      _marker: PhantomData,
    }
  }

  /// Deregisters the listener. An auto-dispose provider left without
  /// listeners or dependents is disposed. Closing twice, or after the owner
  /// was disposed, does nothing.
  pub fn close(&self) {
    if let Some(shared) = self.shared.upgrade() {
      if shared.remove_listener(self.node, self.listener) {
        tracing::trace!(provider = %shared.label(self.node), listener = %self.listener, "subscription closed");
      }
    }
  }

  /// Whether the listener is still registered.
  pub fn is_active(&self) -> bool {
    match self.shared.upgrade() {
      Some(shared) => shared.has_listener(self.node, self.listener),
      None => false,
    }
  }

  /// The current value of the watched state.
  pub fn read(&self) -> Result<Rc<T>> {
    let shared = self.shared.upgrade().ok_or_else(|| ProviderError::Unmounted {
      provider: "<dropped owner>".to_string(),
    })?;
    shared.refresh(self.node)?;
    shared.value_as::<T>(self.node)
  }
}

impl<T> fmt::Debug for ProviderSubscription<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ProviderSubscription")
      .field("node", &self.node)
      .field("listener", &self.listener)
      .finish()
  }
}
