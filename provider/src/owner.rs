use crate::builder::OwnerBuilder;
use crate::core::OwnerId;
use crate::definition::ProviderBase;
use crate::error::{ProviderError, Result};
use crate::graph::{owner_label, Listener};
use crate::kinds::state::{StateController, StateProvider};
use crate::overrides::Overrides;
use crate::shared::Shared;
use crate::subscription::ProviderSubscription;

use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Holds the states of providers and is the entry point for reading and
/// watching them.
///
/// Owners form a tree: a child owner (see [`child`](Self::child)) shares
/// every state of its ancestors that its own overrides do not affect. All
/// owners of one tree live on one thread. Cloning an owner yields another
/// handle to the same scope.
///
/// ```
/// use fibre_provider::{Provider, ProviderStateOwner, StateProvider};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let counter = StateProvider::new(|_| Ok(0));
/// let doubled = {
///   let counter = counter.clone();
///   Provider::new(move |r| Ok(*r.watch(&counter)? * 2))
/// };
///
/// let owner = ProviderStateOwner::new();
/// let seen = Rc::new(Cell::new(0));
/// let sink = seen.clone();
/// let _sub = owner.watch(&doubled, move |v| sink.set(*v)).unwrap();
///
/// owner.controller(&counter).unwrap().set(5).unwrap();
/// assert_eq!(seen.get(), 10);
/// ```
#[derive(Clone)]
pub struct ProviderStateOwner {
  shared: Rc<Shared>,
  id: OwnerId,
  name: Option<Rc<str>>,
}

impl Default for ProviderStateOwner {
  fn default() -> Self {
    Self::new()
  }
}

impl ProviderStateOwner {
  /// Creates the root of a new owner tree, without overrides or spawner.
  pub fn new() -> Self {
    OwnerBuilder::new().assemble(Overrides::default())
  }

  /// A builder for the root of a new owner tree.
  pub fn builder() -> OwnerBuilder {
    OwnerBuilder::new()
  }

  /// A builder for an owner scoped below this one.
  pub fn child(&self) -> OwnerBuilder {
    OwnerBuilder::child_of(self.shared.clone(), self.id)
  }

  pub(crate) fn from_parts(shared: Rc<Shared>, id: OwnerId, name: Option<Rc<str>>) -> Self {
    Self { shared, id, name }
  }

  pub fn id(&self) -> OwnerId {
    self.id
  }

  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  /// Owners of this tree that are still alive, this one included if it is.
  /// Disposed owners are dropped from the tree.
  pub fn live_owners(&self) -> usize {
    self.shared.live_scopes()
  }

  fn ensure_live(&self) -> Result<()> {
    if self.is_disposed() {
      return Err(ProviderError::OwnerDisposed {
        owner: owner_label(self.name(), self.id),
      });
    }
    Ok(())
  }

  // --- Reading ---

  /// Returns the current value of `provider`, creating its state on first
  /// use. No listener is registered: an auto-dispose provider that nothing
  /// else observes is disposed again right after the read.
  pub fn read<P: ProviderBase>(&self, provider: &P) -> Result<Rc<P::Value>> {
    let result = self.ensure_live().and_then(|()| self.shared.resolve(self.id, provider)).and_then(|node| {
      let value = self.shared.value_as::<P::Value>(node);
      self.shared.release_if_unobserved(node);
      value
    });
    self.shared.flush();
    result
  }

  /// Registers `listener` for every future change of `provider`, creating
  /// its state if needed. The listener is not called with the current value;
  /// read it from the returned subscription.
  pub fn watch<P, F>(&self, provider: &P, listener: F) -> Result<ProviderSubscription<P::Value>>
  where
    P: ProviderBase,
    F: Fn(&P::Value) + 'static,
  {
    let result = self.ensure_live().and_then(|()| self.shared.resolve(self.id, provider)).and_then(|node| {
      let erased: Listener = Rc::new(move |value: &dyn Any| {
        if let Some(value) = value.downcast_ref::<P::Value>() {
          listener(value);
        }
      });
      let id = self.shared.add_listener(node, erased)?;
      Ok(ProviderSubscription::new(Rc::downgrade(&self.shared), node, id))
    });
    self.shared.flush();
    result
  }

  /// Returns the controller of a state provider's state in this owner.
  pub fn controller<T: 'static>(&self, provider: &StateProvider<T>) -> Result<StateController<T>> {
    let result = self
      .ensure_live()
      .and_then(|()| self.shared.resolve(self.id, provider))
      .map(|node| StateController::new(Rc::downgrade(&self.shared), node));
    self.shared.flush();
    result
  }

  // --- Invalidation ---

  /// Marks the state of `provider` for rebuild and propagates the result.
  /// Returns `false` if no state exists for it yet, in which case nothing
  /// needs to happen: the next read builds it.
  pub fn invalidate<P: ProviderBase>(&self, provider: &P) -> bool {
    match self.shared.find(self.id, provider) {
      Some(node) => {
        tracing::trace!(provider = %self.shared.label(node), owner = %self.id, "provider invalidated");
        self.shared.invalidate(node);
        true
      }
      None => false,
    }
  }

  /// Rebuilds `provider` and returns its new value.
  pub fn refresh<P: ProviderBase>(&self, provider: &P) -> Result<Rc<P::Value>> {
    self.invalidate(provider);
    self.read(provider)
  }

  /// Whether a state for `provider` exists as seen from this owner.
  pub fn contains<P: ProviderBase>(&self, provider: &P) -> bool {
    self.shared.find(self.id, provider).is_some()
  }

  // --- Lifecycle ---

  /// Disposes every child owner, then every state held by this owner, most
  /// recently created first. Later reads fail with
  /// [`ProviderError::OwnerDisposed`](crate::ProviderError::OwnerDisposed).
  /// Disposing twice does nothing.
  pub fn dispose(&self) {
    self.shared.dispose_scope(self.id);
  }

  pub fn is_disposed(&self) -> bool {
    self.shared.is_disposed(self.id)
  }
}

impl fmt::Debug for ProviderStateOwner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ProviderStateOwner")
      .field("id", &self.id)
      .field("name", &self.name())
      .field("disposed", &self.is_disposed())
      .finish()
  }
}
