use fibre_provider::{provider, Provider, ProviderError, ProviderStateOwner, StateProvider};
use pretty_assertions::assert_eq;

provider!(SELFISH: Provider<i32> = Provider::new(|r| Ok(*r.watch(&*SELFISH)? + 1)));

provider!(PING: Provider<i32> = Provider::new(|r| Ok(*r.watch(&*PONG)? + 1)));
provider!(PONG: Provider<i32> = Provider::new(|r| Ok(*r.watch(&*PING)? + 1)));

provider!(SWITCH: StateProvider<bool> = StateProvider::new(|_| Ok(false)));
provider!(LEFT: Provider<i32> = Provider::new(|r| {
  if *r.watch(&*SWITCH)? {
    Ok(*r.watch(&*RIGHT)? + 1)
  } else {
    Ok(0)
  }
}));
provider!(RIGHT: Provider<i32> = Provider::new(|r| Ok(*r.watch(&*LEFT)? + 1)));

fn chain_of<T: std::fmt::Debug>(result: Result<T, ProviderError>) -> Vec<String> {
  match result {
    Err(ProviderError::CircularDependency { chain }) => chain,
    other => panic!("expected a circular dependency, got {:?}", other),
  }
}

#[test]
fn test_provider_reading_itself_is_a_cycle() {
  // Arrange
  let owner = ProviderStateOwner::new();

  // Act
  let chain = chain_of(owner.read(&*SELFISH));

  // Assert
  assert_eq!(chain, vec!["SELFISH", "SELFISH"]);
  assert!(!owner.contains(&*SELFISH), "a failed first build caches nothing");
}

#[test]
fn test_mutual_dependency_is_reported_with_its_chain() {
  // Arrange
  let owner = ProviderStateOwner::new();

  // Act
  let chain = chain_of(owner.read(&*PING));

  // Assert
  assert_eq!(chain, vec!["PING", "PONG", "PING"]);
  assert!(!owner.contains(&*PING));
  assert!(!owner.contains(&*PONG));
}

#[test]
fn test_owner_stays_usable_after_a_cycle() {
  // Arrange
  let owner = ProviderStateOwner::new();
  let fine = Provider::new(|_| Ok("fine"));
  let _ = owner.read(&*PING);

  // Act
  let value = owner.read(&fine);

  // Assert
  assert_eq!(*value.unwrap(), "fine");
}

#[test]
fn test_cycle_introduced_by_a_rebuild_is_detected() {
  // Arrange
  let owner = ProviderStateOwner::new();
  assert_eq!(*owner.read(&*RIGHT).unwrap(), 1);

  // Act
  owner.controller(&*SWITCH).unwrap().set(true).unwrap();
  let result = owner.read(&*RIGHT);

  // Assert
  assert!(matches!(result, Err(ProviderError::CircularDependency { .. })));
}
