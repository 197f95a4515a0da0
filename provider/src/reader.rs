//! The capability handed to provider factories.

use crate::core::OwnerId;
use crate::definition::ProviderBase;
use crate::error::{BoxError, ProviderError, Result};
use crate::graph::NodeId;
use crate::kinds::state::{StateController, StateProvider};
use crate::runtime::TaskSpawner;
use crate::shared::Shared;

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

/// The signature of a provider factory.
pub type Create<T> = dyn Fn(&Reader) -> Result<T> + Send + Sync;

/// Passed to every provider factory. It is the only way a provider declares
/// a dependency on another provider.
///
/// A `Reader` is bound to the owner the provider's state lives in, so reads
/// honour that owner's overrides.
pub struct Reader {
  shared: Rc<Shared>,
  scope: OwnerId,
  node: NodeId,
  epoch: u64,
  first_build: bool,
}

impl Reader {
  pub(crate) fn new(shared: Rc<Shared>, scope: OwnerId, node: NodeId, epoch: u64, first_build: bool) -> Self {
    Self {
      shared,
      scope,
      node,
      epoch,
      first_build,
    }
  }

  /// Reads `provider` and makes this provider depend on it: whenever the
  /// value of `provider` changes, this provider's factory runs again.
  pub fn watch<P: ProviderBase>(&self, provider: &P) -> Result<Rc<P::Value>> {
    let dependency = self.shared.resolve(self.scope, provider)?;
    self.shared.depend(self.node, dependency)?;
    self.shared.value_as::<P::Value>(dependency)
  }

  /// Reads the current value of `provider` without depending on it.
  pub fn read<P: ProviderBase>(&self, provider: &P) -> Result<Rc<P::Value>> {
    let dependency = self.shared.resolve(self.scope, provider)?;
    let value = self.shared.value_as::<P::Value>(dependency)?;
    self.shared.release_if_unobserved(dependency);
    Ok(value)
  }

  /// Returns the controller of a state provider, without depending on it.
  pub fn controller<T: 'static>(&self, provider: &StateProvider<T>) -> Result<StateController<T>> {
    let node = self.shared.resolve(self.scope, provider)?;
    Ok(StateController::new(Rc::downgrade(&self.shared), node))
  }

  /// Registers a callback that runs once, right before this state is rebuilt
  /// or when it is disposed, whichever comes first.
  pub fn on_dispose(&self, hook: impl FnOnce() + 'static) {
    self.shared.add_dispose_hook(self.node, Box::new(hook));
  }

  /// A handle that can mark this provider for rebuild later, e.g. from a
  /// timer or from the completion of some unrelated task.
  pub fn invalidator(&self) -> Invalidator {
    Invalidator {
      shared: Rc::downgrade(&self.shared),
      node: self.node,
    }
  }

  /// Schedules a rebuild of this provider once the current build finished.
  pub fn invalidate_self(&self) {
    self.shared.invalidate(self.node);
  }

  /// Wraps an error raised inside the factory, labelled with this provider.
  pub fn fail(&self, source: impl Into<BoxError>) -> ProviderError {
    ProviderError::failed(self.shared.label(self.node), source)
  }

  /// Whether this is the first time the factory runs for this state.
  pub fn is_first_build(&self) -> bool {
    self.first_build
  }

  /// The name (or id) of the provider being built.
  pub fn provider_name(&self) -> String {
    self.shared.label(self.node)
  }

  /// The owner the factory's reads are resolved from: the owner the state
  /// was first read from on its first build, the owner it is homed in on
  /// every rebuild. Both see the same overrides.
  pub fn owner_id(&self) -> OwnerId {
    self.scope
  }

  // --- Crate-internal accessors used by the provider kinds ---

  /// The committed value of the previous build, if any.
  pub(crate) fn previous(&self) -> Option<Rc<dyn Any>> {
    self.shared.value_of(self.node).ok()
  }

  pub(crate) fn spawner(&self) -> Result<Rc<dyn TaskSpawner>> {
    self
      .shared
      .spawner(self.node, self.scope)
      .ok_or_else(|| ProviderError::SpawnerRequired {
        provider: self.shared.label(self.node),
      })
  }

  pub(crate) fn completion(&self) -> Completion {
    Completion {
      shared: Rc::downgrade(&self.shared),
      node: self.node,
      epoch: self.epoch,
    }
  }
}

impl fmt::Debug for Reader {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Reader")
      .field("provider", &self.shared.label(self.node))
      .field("owner", &self.scope)
      .field("epoch", &self.epoch)
      .finish()
  }
}

/// Marks a provider for rebuild from outside its factory.
#[derive(Clone)]
pub struct Invalidator {
  shared: Weak<Shared>,
  node: NodeId,
}

impl Invalidator {
  /// Schedules a rebuild of the provider and propagates the result.
  /// Returns `false` if the provider's state no longer exists.
  pub fn invalidate(&self) -> bool {
    let Some(shared) = self.shared.upgrade() else {
      return false;
    };
    if !shared.contains(self.node) {
      return false;
    }
    shared.invalidate(self.node);
    true
  }
}

impl fmt::Debug for Invalidator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Invalidator").field("node", &self.node).finish()
  }
}

/// Delivers the result of asynchronous work back into the graph, tagged with
/// the epoch of the build that started it.
pub(crate) struct Completion {
  shared: Weak<Shared>,
  node: NodeId,
  epoch: u64,
}

impl Completion {
  /// Whether the build that started this work is still the current one.
  pub(crate) fn is_current(&self) -> bool {
    match self.shared.upgrade() {
      Some(shared) => shared.node_epoch(self.node) == Some(self.epoch),
      None => false,
    }
  }

  pub(crate) fn apply(&self, next: impl FnOnce(Option<Rc<dyn Any>>) -> Rc<dyn Any>) {
    if let Some(shared) = self.shared.upgrade() {
      shared.complete(self.node, self.epoch, next);
    }
  }
}
