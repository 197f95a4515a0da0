//! The type-erased description of a provider that the owner graph works with.

use crate::core::{FamilyId, ProviderId};
use crate::error::Result;
use crate::reader::Reader;

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Comparison used to decide whether a recomputed value differs from the
/// committed one. `None` means every recomputation counts as a change.
pub(crate) type Equality<T> = Option<Arc<dyn Fn(&T, &T) -> bool + Send + Sync>>;

pub(crate) fn structural<T: PartialEq + 'static>() -> Equality<T> {
  Some(Arc::new(|a: &T, b: &T| a == b))
}

/// Compares two erased values with an optional equality function.
pub(crate) fn compare<T: 'static>(eq: &Equality<T>, previous: &dyn Any, next: &dyn Any) -> bool {
  match (eq, previous.downcast_ref::<T>(), next.downcast_ref::<T>()) {
    (Some(eq), Some(previous), Some(next)) => eq(previous, next),
    _ => false,
  }
}

/// Binds a family member to its family and argument.
#[derive(Clone)]
pub struct FamilyKey {
  pub(crate) id: FamilyId,
  pub(crate) arg: Arc<dyn Any + Send + Sync>,
}

/// Identity and static configuration of a definition.
#[derive(Clone)]
pub struct Meta {
  pub(crate) id: ProviderId,
  pub(crate) name: Option<Arc<str>>,
  pub(crate) auto_dispose: bool,
  pub(crate) family: Option<FamilyKey>,
}

impl Meta {
  pub(crate) fn new() -> Self {
    Self {
      id: ProviderId::next(),
      name: None,
      auto_dispose: false,
      family: None,
    }
  }

  pub(crate) fn label(&self) -> String {
    match &self.name {
      Some(name) => name.to_string(),
      None => self.id.to_string(),
    }
  }

  pub(crate) fn family_id(&self) -> Option<FamilyId> {
    self.family.as_ref().map(|key| key.id)
  }
}

impl fmt::Debug for Meta {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Meta")
      .field("id", &self.id)
      .field("name", &self.name)
      .field("auto_dispose", &self.auto_dispose)
      .field("family", &self.family_id())
      .finish()
  }
}

/// The variant-specific part of a provider: how to build its value and how
/// to tell whether a rebuilt value changed.
pub trait Recipe {
  fn build(&self, reader: &Reader) -> Result<Rc<dyn Any>>;

  fn same(&self, previous: &dyn Any, next: &dyn Any) -> bool;
}

/// A recipe that always produces a clone of a fixed value. Used by
/// `override_with_value`.
pub(crate) struct ValueRecipe<V> {
  pub(crate) value: V,
  pub(crate) eq: Equality<V>,
}

impl<V: Clone + 'static> Recipe for ValueRecipe<V> {
  fn build(&self, _reader: &Reader) -> Result<Rc<dyn Any>> {
    Ok(Rc::new(self.value.clone()))
  }

  fn same(&self, previous: &dyn Any, next: &dyn Any) -> bool {
    compare(&self.eq, previous, next)
  }
}

pub(crate) mod sealed {
  use super::{FamilyKey, Meta, Recipe};
  use std::rc::Rc;

  pub trait Sealed {
    fn meta(&self) -> &Meta;

    fn meta_mut(&mut self) -> &mut Meta;

    fn recipe(&self) -> Rc<dyn Recipe>;

    fn in_family(mut self, key: FamilyKey) -> Self
    where
      Self: Sized,
    {
      self.meta_mut().family = Some(key);
      self
    }
  }
}

/// Common behavior of every provider kind.
///
/// This trait is sealed: the provider kinds of this crate are the only
/// implementors. It is what [`ProviderStateOwner::read`](crate::ProviderStateOwner::read)
/// and [`Reader::watch`] accept.
pub trait ProviderBase: sealed::Sealed + Clone + 'static {
  /// The value held by the provider's state and passed to listeners.
  type Value: 'static;

  /// The identity of this definition.
  fn id(&self) -> ProviderId {
    self.meta().id
  }

  /// The debug name given with `named`, if any.
  fn name(&self) -> Option<&str> {
    self.meta().name.as_deref()
  }

  /// Whether this provider's state is dropped as soon as nothing observes it.
  fn is_auto_dispose(&self) -> bool {
    self.meta().auto_dispose
  }
}

/// Builder methods shared by every provider kind.
macro_rules! impl_definition_common {
  ($kind:ident) => {
    impl<T> $kind<T> {
      /// Gives this provider a name used in logs, errors and observer events.
      pub fn named(mut self, name: impl Into<std::sync::Arc<str>>) -> Self {
        self.meta.name = Some(name.into());
        self
      }

      /// Marks the provider so that its state is destroyed once it has
      /// neither listeners nor dependent providers.
      pub fn auto_dispose(mut self) -> Self {
        self.meta.auto_dispose = true;
        self
      }
    }

    impl<T> Clone for $kind<T> {
      fn clone(&self) -> Self {
        Self {
          meta: self.meta.clone(),
          create: self.create.clone(),
          eq: self.eq.clone(),
        }
      }
    }

    impl<T> std::fmt::Debug for $kind<T> {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!($kind))
          .field("id", &self.meta.id)
          .field("name", &self.meta.name)
          .field("auto_dispose", &self.meta.auto_dispose)
          .finish_non_exhaustive()
      }
    }
  };
}

pub(crate) use impl_definition_common;
