mod common;

use common::Calls;
use fibre_provider::{BuildError, Family, Provider, ProviderBase, ProviderStateOwner, StateProvider};
use pretty_assertions::assert_eq;
use std::rc::Rc;

struct Fixture {
  base: Provider<i32>,
  derived: Provider<i32>,
  unrelated: Provider<String>,
  derived_calls: Calls,
  unrelated_calls: Calls,
}

fn fixture() -> Fixture {
  let base = Provider::new(|_| Ok(1)).named("base");
  let derived_calls = Calls::new();
  let unrelated_calls = Calls::new();
  let derived = {
    let (base, calls) = (base.clone(), derived_calls.clone());
    Provider::new(move |r| {
      calls.hit();
      Ok(*r.watch(&base)? * 100)
    })
    .named("derived")
  };
  let unrelated = {
    let calls = unrelated_calls.clone();
    Provider::new(move |_| {
      calls.hit();
      Ok("shared".to_string())
    })
    .named("unrelated")
  };
  Fixture {
    base,
    derived,
    unrelated,
    derived_calls,
    unrelated_calls,
  }
}

#[test]
fn test_override_applies_to_child_and_its_dependents_only() {
  // Arrange
  let f = fixture();
  let root = ProviderStateOwner::new();
  assert_eq!(*root.read(&f.derived).unwrap(), 100);

  // Act
  let child = root
    .child()
    .name("child")
    .override_with(f.base.override_with_value(2))
    .build()
    .unwrap();

  // Assert
  assert_eq!(*child.read(&f.base).unwrap(), 2);
  assert_eq!(*child.read(&f.derived).unwrap(), 200);
  assert_eq!(*root.read(&f.derived).unwrap(), 100);
  assert_eq!(f.derived_calls.get(), 2);
}

#[test]
fn test_unaffected_providers_are_shared_with_the_parent() {
  // Arrange
  let f = fixture();
  let root = ProviderStateOwner::new();
  let child = root.child().override_with(f.base.override_with_value(2)).build().unwrap();

  // Act
  let from_child = child.read(&f.unrelated).unwrap();
  let from_root = root.read(&f.unrelated).unwrap();

  // Assert
  assert!(Rc::ptr_eq(&from_child, &from_root));
  assert_eq!(f.unrelated_calls.get(), 1);
}

#[test]
fn test_override_with_another_definition() {
  // Arrange
  let f = fixture();
  let replacement = Provider::new(|_| Ok(7));
  let owner = ProviderStateOwner::builder()
    .overrides([f.base.override_with(replacement)])
    .build()
    .unwrap();

  // Act
  let derived = owner.read(&f.derived).unwrap();

  // Assert
  assert_eq!(*derived, 700);
}

#[test]
fn test_grandchild_inherits_the_override() {
  // Arrange
  let f = fixture();
  let root = ProviderStateOwner::new();
  let child = root.child().override_with(f.base.override_with_value(3)).build().unwrap();
  let grandchild = child.child().build().unwrap();

  // Act
  let from_grandchild = grandchild.read(&f.derived).unwrap();
  let from_child = child.read(&f.derived).unwrap();

  // Assert
  assert_eq!(*from_grandchild, 300);
  assert!(Rc::ptr_eq(&from_grandchild, &from_child));
  assert_eq!(f.derived_calls.get(), 1);
}

#[test]
fn test_overridden_state_is_independent_per_scope() {
  // Arrange
  let counter = StateProvider::new(|_| Ok(0));
  let root = ProviderStateOwner::new();
  let child = root.child().override_with(counter.override_with_value(10)).build().unwrap();

  // Act
  child.controller(&counter).unwrap().update(|n| n + 1).unwrap();
  root.controller(&counter).unwrap().update(|n| n + 5).unwrap();

  // Assert
  assert_eq!(*child.read(&counter).unwrap(), 11);
  assert_eq!(*root.read(&counter).unwrap(), 5);
}

#[test]
fn test_duplicate_override_is_rejected() {
  // Arrange
  let f = fixture();

  // Act
  let result = ProviderStateOwner::builder()
    .overrides([f.base.override_with_value(1), f.base.override_with_value(2)])
    .build();

  // Assert
  assert_eq!(
    result.unwrap_err(),
    BuildError::DuplicateOverride {
      provider: "base".to_string()
    }
  );
}

#[test]
fn test_child_of_disposed_owner_cannot_be_built() {
  // Arrange
  let root = ProviderStateOwner::new();
  root.dispose();

  // Act
  let result = root.child().build();

  // Assert
  assert_eq!(result.unwrap_err(), BuildError::ParentDisposed);
}

#[test]
fn test_family_memoises_one_definition_per_argument() {
  // Arrange
  let user = Family::new(|id: &u32| {
    let id = *id;
    Provider::new(move |_| Ok(format!("user-{}", id)))
  })
  .named("user");
  let owner = ProviderStateOwner::new();

  // Act
  let first = user.get(7);
  let again = user.get(7);
  let other = user.get(8);

  // Assert
  assert_eq!(first.id(), again.id());
  assert_ne!(first.id(), other.id());
  assert_eq!(user.len(), 2);
  assert_eq!(first.name(), Some("user(7)"));
  assert_eq!(*owner.read(&again).unwrap(), "user-7");
}

#[test]
fn test_family_override_replaces_every_member_in_scope() {
  // Arrange
  let user = Family::new(|id: &u32| {
    let id = *id;
    Provider::new(move |_| Ok(format!("user-{}", id)))
  });
  let greeting = {
    let user = user.clone();
    Provider::new(move |r| Ok(format!("hi {}", r.watch(&user.get(1))?)))
  };
  let root = ProviderStateOwner::new();
  let child = root
    .child()
    .override_with(user.override_with(|id| {
      let id = *id;
      Provider::new(move |_| Ok(format!("fake-{}", id)))
    }))
    .build()
    .unwrap();

  // Act & Assert
  assert_eq!(*child.read(&user.get(42)).unwrap(), "fake-42");
  assert_eq!(*child.read(&greeting).unwrap(), "hi fake-1");
  assert_eq!(*root.read(&user.get(42)).unwrap(), "user-42");
  assert_eq!(*root.read(&greeting).unwrap(), "hi user-1");
}

#[test]
fn test_member_override_beats_family_default() {
  // Arrange
  let square = Family::new(|n: &i32| {
    let n = *n;
    Provider::new(move |_| Ok(n * n))
  });
  let owner = ProviderStateOwner::builder()
    .override_with(square.get(3).override_with_value(-1))
    .build()
    .unwrap();

  // Act & Assert
  assert_eq!(*owner.read(&square.get(3)).unwrap(), -1);
  assert_eq!(*owner.read(&square.get(4)).unwrap(), 16);
}

#[test]
fn test_override_of_already_instantiated_provider_in_new_child() {
  // Arrange
  let f = fixture();
  let root = ProviderStateOwner::new();
  let _ = root.read(&f.base).unwrap();
  let _ = root.read(&f.derived).unwrap();

  // Act
  let child = root.child().override_with(f.derived.override_with_value(-5)).build().unwrap();

  // Assert
  assert_eq!(*child.read(&f.derived).unwrap(), -5);
  assert_eq!(*root.read(&f.derived).unwrap(), 100);
}
