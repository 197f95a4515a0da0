use crate::definition::{compare, impl_definition_common, sealed::Sealed, structural, Equality, Meta, ProviderBase, Recipe, ValueRecipe};
use crate::error::{ProviderError, Result};
use crate::graph::NodeId;
use crate::overrides::Override;
use crate::reader::{Create, Reader};
use crate::shared::Shared;

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// A provider holding a value that can be replaced from outside through a
/// [`StateController`].
///
/// The factory computes the initial state. If it watches other providers and
/// one of them changes, the state is reset to a freshly computed value.
pub struct StateProvider<T> {
  meta: Meta,
  create: Arc<Create<T>>,
  eq: Equality<T>,
}

impl_definition_common!(StateProvider);

impl<T: 'static> StateProvider<T> {
  /// Setting a value equal to the current one notifies nobody.
  pub fn new(create: impl Fn(&Reader) -> Result<T> + Send + Sync + 'static) -> Self
  where
    T: PartialEq,
  {
    Self {
      meta: Meta::new(),
      create: Arc::new(create),
      eq: structural::<T>(),
    }
  }

  /// Every `set` notifies listeners and dependents.
  pub fn opaque(create: impl Fn(&Reader) -> Result<T> + Send + Sync + 'static) -> Self {
    Self {
      meta: Meta::new(),
      create: Arc::new(create),
      eq: None,
    }
  }

  pub fn with_equality(mut self, eq: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
    self.eq = Some(Arc::new(eq));
    self
  }

  pub fn override_with(&self, replacement: StateProvider<T>) -> Override {
    Override::provider(&self.meta, replacement.recipe())
  }

  /// Starts the state at `value` inside an owner subtree. It can still be
  /// changed through a controller.
  pub fn override_with_value(&self, value: T) -> Override
  where
    T: Clone,
  {
    let recipe = ValueRecipe {
      value,
      eq: self.eq.clone(),
    };
    Override::provider(&self.meta, Rc::new(recipe))
  }
}

struct StateRecipe<T> {
  create: Arc<Create<T>>,
  eq: Equality<T>,
}

impl<T: 'static> Recipe for StateRecipe<T> {
  fn build(&self, reader: &Reader) -> Result<Rc<dyn Any>> {
    let initial = (self.create)(reader)?;
    Ok(Rc::new(initial))
  }

  fn same(&self, previous: &dyn Any, next: &dyn Any) -> bool {
    compare(&self.eq, previous, next)
  }
}

impl<T: 'static> Sealed for StateProvider<T> {
  fn meta(&self) -> &Meta {
    &self.meta
  }

  fn meta_mut(&mut self) -> &mut Meta {
    &mut self.meta
  }

  fn recipe(&self) -> Rc<dyn Recipe> {
    Rc::new(StateRecipe {
      create: self.create.clone(),
      eq: self.eq.clone(),
    })
  }
}

impl<T: 'static> ProviderBase for StateProvider<T> {
  type Value = T;
}

/// Reads and replaces the value of one [`StateProvider`] state.
///
/// A controller is bound to the state it was obtained for. Once that state is
/// disposed, every method returns [`ProviderError::Unmounted`].
pub struct StateController<T> {
  shared: Weak<Shared>,
  node: NodeId,
  _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> StateController<T> {
  pub(crate) fn new(shared: Weak<Shared>, node: NodeId) -> Self {
    Self {
      shared,
      node,
      _marker: PhantomData,
    }
  }

  fn shared(&self) -> Result<Rc<Shared>> {
    match self.shared.upgrade() {
      Some(shared) if shared.contains(self.node) => Ok(shared),
      Some(shared) => Err(ProviderError::Unmounted {
        provider: shared.label(self.node),
      }),
      None => Err(ProviderError::Unmounted {
        provider: "<dropped owner>".to_string(),
      }),
    }
  }

  /// The current state.
  pub fn get(&self) -> Result<Rc<T>> {
    let shared = self.shared()?;
    shared.refresh(self.node)?;
    shared.value_as::<T>(self.node)
  }

  /// Replaces the state. Listeners and dependents are updated before this
  /// returns, unless a provider factory is currently running, in which case
  /// they are updated once it completes. Returns whether the state changed.
  pub fn set(&self, value: T) -> Result<bool> {
    let shared = self.shared()?;
    shared.set_value(self.node, Rc::new(value))
  }

  /// Replaces the state with a value computed from the current one.
  pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<bool> {
    let current = self.get()?;
    self.set(f(&current))
  }

  /// Whether the state this controller is bound to still exists.
  pub fn is_mounted(&self) -> bool {
    self.shared().is_ok()
  }
}

impl<T> Clone for StateController<T> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
      node: self.node,
      _marker: PhantomData,
    }
  }
}

impl<T> fmt::Debug for StateController<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StateController").field("node", &self.node).finish()
  }
}
