//! Substitution of provider definitions inside an owner subtree.

use crate::core::{FamilyId, ProviderId};
use crate::definition::{FamilyKey, Meta, Recipe};
use crate::error::BuildError;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

type FamilyRecipe = Rc<dyn Fn(&(dyn Any + Send + Sync)) -> Option<Rc<dyn Recipe>>>;

pub(crate) enum OverrideTarget {
  Provider(ProviderId, Rc<dyn Recipe>),
  Family(FamilyId, FamilyRecipe),
}

/// A replacement for a provider (or a whole family) registered on an owner.
///
/// Overrides are created from the definition they replace, e.g.
/// `provider.override_with(other)` or `provider.override_with_value(v)`, and
/// handed to [`OwnerBuilder::overrides`](crate::OwnerBuilder::overrides).
/// Every read of the overridden definition in that owner and its descendants
/// sees the replacement, and so does every provider that depends on it.
pub struct Override {
  pub(crate) label: String,
  pub(crate) target: OverrideTarget,
}

impl Override {
  pub(crate) fn provider(meta: &Meta, recipe: Rc<dyn Recipe>) -> Self {
    Self {
      label: meta.label(),
      target: OverrideTarget::Provider(meta.id, recipe),
    }
  }

  pub(crate) fn family(id: FamilyId, label: String, recipe: FamilyRecipe) -> Self {
    Self {
      label,
      target: OverrideTarget::Family(id, recipe),
    }
  }
}

impl fmt::Debug for Override {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let target = match &self.target {
      OverrideTarget::Provider(id, _) => format!("{}", id),
      OverrideTarget::Family(id, _) => format!("{}", id),
    };
    f.debug_struct("Override")
      .field("label", &self.label)
      .field("target", &target)
      .finish()
  }
}

/// The overrides declared directly on one owner.
#[derive(Default)]
pub(crate) struct Overrides {
  providers: HashMap<ProviderId, Rc<dyn Recipe>>,
  families: HashMap<FamilyId, FamilyRecipe>,
}

impl Overrides {
  pub(crate) fn from_list(list: Vec<Override>) -> Result<Self, BuildError> {
    let mut overrides = Self::default();
    for item in list {
      let duplicate = match item.target {
        OverrideTarget::Provider(id, recipe) => overrides.providers.insert(id, recipe).is_some(),
        OverrideTarget::Family(id, recipe) => overrides.families.insert(id, recipe).is_some(),
      };
      if duplicate {
        return Err(BuildError::DuplicateOverride {
          provider: item.label,
        });
      }
    }
    Ok(overrides)
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.providers.is_empty() && self.families.is_empty()
  }

  pub(crate) fn len(&self) -> usize {
    self.providers.len() + self.families.len()
  }

  /// Whether this set replaces the definition described by `meta`.
  pub(crate) fn covers(&self, meta: &Meta) -> bool {
    if self.providers.contains_key(&meta.id) {
      return true;
    }
    matches!(meta.family_id(), Some(family) if self.families.contains_key(&family))
  }

  /// The replacement recipe for `meta`, if this set overrides it.
  pub(crate) fn recipe_for(&self, meta: &Meta) -> Option<Rc<dyn Recipe>> {
    if let Some(recipe) = self.providers.get(&meta.id) {
      return Some(recipe.clone());
    }
    let FamilyKey { id, arg } = meta.family.as_ref()?;
    let build = self.families.get(id)?;
    build(arg.as_ref())
  }
}
