use crate::definition::{compare, impl_definition_common, sealed::Sealed, structural, Equality, Meta, ProviderBase, Recipe, ValueRecipe};
use crate::error::Result;
use crate::overrides::Override;
use crate::reader::{Create, Reader};

use std::any::Any;
use std::rc::Rc;
use std::sync::Arc;

/// A synchronously computed, read-only value.
///
/// The factory runs the first time the provider is read from an owner, and
/// again whenever a provider it watched changes.
///
/// ```
/// use fibre_provider::{Provider, ProviderStateOwner};
///
/// let greeting = Provider::new(|_| Ok("hello".to_string()));
/// let shout = {
///   let greeting = greeting.clone();
///   Provider::new(move |r| Ok(r.watch(&greeting)?.to_uppercase()))
/// };
///
/// let owner = ProviderStateOwner::new();
/// assert_eq!(*owner.read(&shout).unwrap(), "HELLO");
/// ```
pub struct Provider<T> {
  meta: Meta,
  create: Arc<Create<T>>,
  eq: Equality<T>,
}

impl_definition_common!(Provider);

impl<T: 'static> Provider<T> {
  /// Creates a provider whose dependents are only rebuilt when a new value
  /// differs from the previous one.
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

  /// Creates a provider for values without a notion of equality. Every
  /// rebuild counts as a change.
  pub fn opaque(create: impl Fn(&Reader) -> Result<T> + Send + Sync + 'static) -> Self {
    Self {
      meta: Meta::new(),
      create: Arc::new(create),
      eq: None,
    }
  }

  /// Replaces the comparison used to decide whether a rebuilt value changed.
  pub fn with_equality(mut self, eq: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
    self.eq = Some(Arc::new(eq));
    self
  }

  /// Replaces this provider with `replacement` inside an owner subtree.
  pub fn override_with(&self, replacement: Provider<T>) -> Override {
    Override::provider(&self.meta, replacement.recipe())
  }

  /// Replaces this provider with a fixed value inside an owner subtree.
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

struct SyncRecipe<T> {
  create: Arc<Create<T>>,
  eq: Equality<T>,
}

impl<T: 'static> Recipe for SyncRecipe<T> {
  fn build(&self, reader: &Reader) -> Result<Rc<dyn Any>> {
    let value = (self.create)(reader)?;
    Ok(Rc::new(value))
  }

  fn same(&self, previous: &dyn Any, next: &dyn Any) -> bool {
    compare(&self.eq, previous, next)
  }
}

impl<T: 'static> Sealed for Provider<T> {
  fn meta(&self) -> &Meta {
    &self.meta
  }

  fn meta_mut(&mut self) -> &mut Meta {
    &mut self.meta
  }

  fn recipe(&self) -> Rc<dyn Recipe> {
    Rc::new(SyncRecipe {
      create: self.create.clone(),
      eq: self.eq.clone(),
    })
  }
}

impl<T: 'static> ProviderBase for Provider<T> {
  type Value = T;
}
