//! Parameterised providers.

use crate::core::FamilyId;
use crate::definition::{sealed::Sealed, FamilyKey, ProviderBase};
use crate::overrides::Override;

use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;
use std::sync::Arc;

/// A factory of provider definitions keyed by an argument.
///
/// `get(arg)` returns the same definition (same [`ProviderId`](crate::ProviderId))
/// for equal arguments, so every owner caches one state per argument.
///
/// ```
/// use fibre_provider::{Family, Provider, ProviderBase, ProviderStateOwner};
///
/// let square = Family::new(|n: &u32| {
///   let n = *n;
///   Provider::new(move |_| Ok(n * n))
/// });
///
/// let owner = ProviderStateOwner::new();
/// assert_eq!(*owner.read(&square.get(4)).unwrap(), 16);
/// assert_eq!(square.get(4).id(), square.get(4).id());
/// ```
pub struct Family<A, P> {
  id: FamilyId,
  name: Option<Arc<str>>,
  build: Arc<dyn Fn(&A) -> P + Send + Sync>,
  members: Arc<DashMap<A, P>>,
}

impl<A, P> Family<A, P>
where
  A: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  P: ProviderBase,
{
  pub fn new(build: impl Fn(&A) -> P + Send + Sync + 'static) -> Self {
    Self {
      id: FamilyId::next(),
      name: None,
      build: Arc::new(build),
      members: Arc::new(DashMap::new()),
    }
  }

  /// Names the family. Members are named `name(arg)` unless the builder
  /// named them itself.
  pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// The definition for `arg`, created on first use.
  pub fn get(&self, arg: A) -> P {
    if let Some(member) = self.members.get(&arg) {
      return member.value().clone();
    }

    let mut member = (self.build)(&arg);
    if member.meta().name.is_none() {
      if let Some(name) = &self.name {
        member.meta_mut().name = Some(format!("{}({:?})", name, arg).into());
      }
    }
    let member = member.in_family(FamilyKey {
      id: self.id,
      arg: Arc::new(arg.clone()),
    });
    // A concurrent `get` may have won the race; keep whichever landed first.
    self.members.entry(arg).or_insert(member).value().clone()
  }

  pub fn id(&self) -> FamilyId {
    self.id
  }

  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  /// Number of distinct arguments requested so far.
  pub fn len(&self) -> usize {
    self.members.len()
  }

  pub fn is_empty(&self) -> bool {
    self.members.is_empty()
  }

  /// Replaces every member of the family inside an owner subtree with the
  /// definition `replace` returns for its argument.
  pub fn override_with(&self, replace: impl Fn(&A) -> P + 'static) -> Override {
    let recipe = Rc::new(move |arg: &(dyn Any + Send + Sync)| {
      let arg = arg.downcast_ref::<A>()?;
      Some(replace(arg).recipe())
    });
    Override::family(self.id, self.label(), recipe)
  }

  fn label(&self) -> String {
    match &self.name {
      Some(name) => name.to_string(),
      None => self.id.to_string(),
    }
  }
}

impl<A, P> Clone for Family<A, P> {
  fn clone(&self) -> Self {
    Self {
      id: self.id,
      name: self.name.clone(),
      build: self.build.clone(),
      members: self.members.clone(),
    }
  }
}

impl<A: Eq + Hash, P> fmt::Debug for Family<A, P> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Family")
      .field("id", &self.id)
      .field("name", &self.name)
      .field("members", &self.members.len())
      .finish_non_exhaustive()
  }
}
