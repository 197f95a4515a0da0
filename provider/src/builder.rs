use crate::core::OwnerId;
use crate::error::BuildError;
use crate::graph::Scope;
use crate::observer::ProviderObserver;
use crate::overrides::{Override, Overrides};
use crate::owner::ProviderStateOwner;
use crate::runtime::TaskSpawner;
use crate::shared::Shared;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A builder for root and child [`ProviderStateOwner`]s.
///
/// Obtained from [`ProviderStateOwner::builder`] for a new owner tree, or
/// from [`ProviderStateOwner::child`] for a scope below an existing owner.
pub struct OwnerBuilder {
  parent: Option<(Rc<Shared>, OwnerId)>,
  name: Option<String>,
  overrides: Vec<Override>,
  spawner: Option<Rc<dyn TaskSpawner>>,
  observers: Vec<Rc<dyn ProviderObserver>>,
}

impl fmt::Debug for OwnerBuilder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("OwnerBuilder")
      .field("parent", &self.parent.as_ref().map(|(_, id)| *id))
      .field("name", &self.name)
      .field("overrides", &self.overrides)
      .field("has_spawner", &self.spawner.is_some())
      .field("observers", &self.observers.len())
      .finish()
  }
}

impl Default for OwnerBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl OwnerBuilder {
  /// A builder for the root of a new owner tree.
  pub fn new() -> Self {
    Self {
      parent: None,
      name: None,
      overrides: Vec::new(),
      spawner: None,
      observers: Vec::new(),
    }
  }

  pub(crate) fn child_of(shared: Rc<Shared>, parent: OwnerId) -> Self {
    Self {
      parent: Some((shared, parent)),
      ..Self::new()
    }
  }

  /// Sets a name used in logs and errors.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Adds overrides. They apply to reads from the new owner and from every
  /// owner below it.
  pub fn overrides(mut self, overrides: impl IntoIterator<Item = Override>) -> Self {
    self.overrides.extend(overrides);
    self
  }

  /// Adds a single override.
  pub fn override_with(mut self, item: Override) -> Self {
    self.overrides.push(item);
    self
  }

  /// Sets the spawner used by asynchronous providers. Child owners inherit
  /// their parent's spawner unless they set their own.
  pub fn spawner(mut self, spawner: Rc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }

  /// Registers an observer. Child owners inherit every observer of their
  /// parent in addition to their own.
  pub fn observer<O>(mut self, observer: O) -> Self
  where
    O: ProviderObserver + 'static,
  {
    self.observers.push(Rc::new(observer));
    self
  }

  /// Builds the owner.
  ///
  /// Fails if the same provider or family was overridden twice, or if the
  /// parent owner has already been disposed.
  pub fn build(mut self) -> Result<ProviderStateOwner, BuildError> {
    self.validate()?;
    let overrides = Overrides::from_list(std::mem::take(&mut self.overrides))?;
    Ok(self.assemble(overrides))
  }

  fn validate(&self) -> Result<(), BuildError> {
    if let Some((shared, parent)) = &self.parent {
      if shared.is_disposed(*parent) {
        return Err(BuildError::ParentDisposed);
      }
    }
    Ok(())
  }

  pub(crate) fn assemble(self, overrides: Overrides) -> ProviderStateOwner {
    let id = OwnerId::next();
    let override_count = overrides.len();

    let (shared, parent, depth, spawner, observers) = match self.parent {
      Some((shared, parent)) => {
        let (depth, inherited_spawner, mut inherited) = shared
          .with_scope(parent, |s| (s.depth + 1, s.spawner.clone(), s.observers.clone()))
          .unwrap_or((1, None, Vec::new()));
        inherited.extend(self.observers);
        (shared, Some(parent), depth, self.spawner.or(inherited_spawner), inherited)
      }
      None => (Shared::new(), None, 0, self.spawner, self.observers),
    };

    let name: Option<Rc<str>> = self.name.map(Rc::from);
    let scope = Scope {
      name: name.clone(),
      parent,
      depth,
      children: Vec::new(),
      overrides,
      cache: HashMap::new(),
      order: Vec::new(),
      spawner,
      observers,
      disposed: false,
    };
    shared.add_scope(id, scope);

    tracing::debug!(
      owner = %shared.scope_label(id),
      parent = ?parent,
      depth,
      overrides = override_count,
      "provider owner created"
    );
    ProviderStateOwner::from_parts(shared, id, name)
  }
}
