mod common;

use common::{recorder, Calls};
use fibre_provider::{AsyncValue, FutureProvider, Provider, ProviderError, ProviderStateOwner, StateProvider, StreamProvider};
use futures_executor::LocalPool;
use futures_util::stream;
use pretty_assertions::assert_eq;
use std::io;
use std::rc::Rc;

fn owner_on(pool: &LocalPool) -> ProviderStateOwner {
  ProviderStateOwner::builder()
    .spawner(Rc::new(pool.spawner()))
    .build()
    .unwrap()
}

#[test]
fn test_future_provider_moves_from_loading_to_data() {
  // Arrange
  let mut pool = LocalPool::new();
  let owner = owner_on(&pool);
  let answer = FutureProvider::new(|_| Ok(async { Ok::<_, io::Error>(42) }));
  let (seen, listener) = recorder::<AsyncValue<i32>>();
  let _subscription = owner.watch(&answer, listener).unwrap();

  // Act
  let before = owner.read(&answer).unwrap();
  pool.run_until_stalled();

  // Assert
  assert!(before.is_loading());
  assert_eq!(*seen.borrow(), vec![AsyncValue::Data(42)]);
  assert_eq!(owner.read(&answer).unwrap().as_data(), Some(&42));
}

#[test]
fn test_future_error_becomes_async_error() {
  // Arrange
  let mut pool = LocalPool::new();
  let owner = owner_on(&pool);
  let broken = FutureProvider::<i32>::opaque(|_| Ok(async { Err::<i32, _>(io::Error::new(io::ErrorKind::Other, "offline")) }));
  let _subscription = owner.watch(&broken, |_| {}).unwrap();

  // Act
  pool.run_until_stalled();
  let value = owner.read(&broken).unwrap();

  // Assert
  assert!(value.has_error());
  let error = value.as_error().unwrap();
  assert_eq!(error.to_string(), "offline");
  assert_eq!(error.downcast_ref::<io::Error>().map(|e| e.kind()), Some(io::ErrorKind::Other));
}

#[test]
fn test_stale_completion_is_never_committed() {
  // Arrange
  let mut pool = LocalPool::new();
  let owner = owner_on(&pool);
  let completed = Calls::new();
  let query = StateProvider::new(|_| Ok(1));
  let search = {
    let (query, completed) = (query.clone(), completed.clone());
    FutureProvider::new(move |r| {
      let query = *r.watch(&query)?;
      let completed = completed.clone();
      Ok(async move {
        completed.hit();
        Ok::<_, io::Error>(query * 10)
      })
    })
  };
  let (seen, listener) = recorder::<AsyncValue<i32>>();
  let _subscription = owner.watch(&search, listener).unwrap();

  // Act
  owner.controller(&query).unwrap().set(2).unwrap();
  pool.run_until_stalled();

  // Assert
  assert_eq!(*seen.borrow(), vec![AsyncValue::Data(20)]);
  assert_eq!(completed.get(), 1, "the superseded future must be aborted before it runs");
}

#[test]
fn test_rebuild_keeps_previous_data_while_loading() {
  // Arrange
  let mut pool = LocalPool::new();
  let owner = owner_on(&pool);
  let page = StateProvider::new(|_| Ok(1));
  let content = {
    let page = page.clone();
    FutureProvider::new(move |r| {
      let page = *r.watch(&page)?;
      Ok(async move { Ok::<_, io::Error>(format!("page {}", page)) })
    })
  };
  let _subscription = owner.watch(&content, |_| {}).unwrap();
  pool.run_until_stalled();

  // Act
  owner.controller(&page).unwrap().set(2).unwrap();
  let reloading = owner.read(&content).unwrap();
  pool.run_until_stalled();

  // Assert
  assert_eq!(*reloading, AsyncValue::Loading { previous: Some("page 1".to_string()) });
  assert_eq!(*owner.read(&content).unwrap(), AsyncValue::Data("page 2".to_string()));
}

#[test]
fn test_dispose_aborts_in_flight_work() {
  // Arrange
  let mut pool = LocalPool::new();
  let owner = owner_on(&pool);
  let completed = Calls::new();
  let slow = {
    let completed = completed.clone();
    FutureProvider::new(move |_| {
      let completed = completed.clone();
      Ok(async move {
        completed.hit();
        Ok::<_, io::Error>(())
      })
    })
  };
  let _subscription = owner.watch(&slow, |_| {}).unwrap();

  // Act
  owner.dispose();
  pool.run_until_stalled();

  // Assert
  assert_eq!(completed.get(), 0);
}

#[test]
fn test_async_provider_without_spawner_fails() {
  // Arrange
  let owner = ProviderStateOwner::new();
  let answer = FutureProvider::new(|_| Ok(async { Ok::<_, io::Error>(1) })).named("answer");

  // Act
  let result = owner.read(&answer);

  // Assert
  match result {
    Err(ProviderError::SpawnerRequired { provider }) => assert_eq!(provider, "answer"),
    other => panic!("expected SpawnerRequired, got {:?}", other),
  }
}

#[test]
fn test_async_override_needs_no_spawner() {
  // Arrange
  let user = FutureProvider::new(|_| Ok(async { Ok::<_, io::Error>("real".to_string()) }));
  let owner = ProviderStateOwner::builder()
    .override_with(user.override_with_data("fake".to_string()))
    .build()
    .unwrap();

  // Act
  let value = owner.read(&user).unwrap();

  // Assert
  assert_eq!(*value, AsyncValue::Data("fake".to_string()));
}

#[test]
fn test_sync_provider_can_derive_from_async_state() {
  // Arrange
  let mut pool = LocalPool::new();
  let owner = owner_on(&pool);
  let count = FutureProvider::new(|_| Ok(async { Ok::<_, io::Error>(3) }));
  let summary = {
    let count = count.clone();
    Provider::new(move |r| {
      Ok(r.watch(&count)?.when(
        || "loading".to_string(),
        |n| format!("{} items", n),
        |e| format!("failed: {}", e),
      ))
    })
  };
  let (seen, listener) = recorder::<String>();
  let _subscription = owner.watch(&summary, listener).unwrap();
  let initial = owner.read(&summary).unwrap();

  // Act
  pool.run_until_stalled();

  // Assert
  assert_eq!(*initial, "loading");
  assert_eq!(*seen.borrow(), vec!["3 items".to_string()]);
}

#[test]
fn test_stream_provider_follows_each_item() {
  // Arrange
  let mut pool = LocalPool::new();
  let owner = owner_on(&pool);
  let ticks = StreamProvider::new(|_| {
    Ok(stream::iter(vec![
      Ok(1),
      Err(io::Error::new(io::ErrorKind::Other, "hiccup")),
      Ok(3),
    ]))
  });
  let (seen, listener) = recorder::<AsyncValue<i32>>();
  let _subscription = owner.watch(&ticks, listener).unwrap();

  // Act
  pool.run_until_stalled();

  // Assert
  let seen = seen.borrow();
  assert_eq!(seen.len(), 3);
  assert_eq!(seen[0], AsyncValue::Data(1));
  assert!(seen[1].has_error());
  assert_eq!(seen[1].value(), Some(&1), "an error keeps the last data");
  assert_eq!(seen[2], AsyncValue::Data(3));
}

#[test]
fn test_stream_override_with_data_pins_the_state() {
  // Arrange
  let ticks = StreamProvider::new(|_| Ok(stream::iter(vec![Ok::<_, io::Error>(1), Ok(2)])));
  let owner = ProviderStateOwner::builder()
    .override_with(ticks.override_with_data(42))
    .build()
    .unwrap();

  // Act
  let value = owner.read(&ticks).unwrap();

  // Assert
  assert_eq!(*value, AsyncValue::Data(42));
}

#[test]
fn test_rebuild_after_sharing_with_the_root_keeps_the_child_spawner() {
  // Arrange
  let mut pool = LocalPool::new();
  let calls = Calls::new();
  let version = {
    let calls = calls.clone();
    FutureProvider::new(move |_| {
      calls.hit();
      let n = calls.get();
      Ok(async move { Ok::<_, io::Error>(n) })
    })
  };
  let root = ProviderStateOwner::new();
  let screen = root.child().spawner(Rc::new(pool.spawner())).build().unwrap();
  screen.read(&version).unwrap();
  pool.run_until_stalled();

  // Act
  let invalidated = screen.invalidate(&version);
  let reloading = screen.read(&version).unwrap();
  pool.run_until_stalled();

  // Assert
  assert!(invalidated);
  assert!(root.contains(&version), "no dependency on the child, so the state lives in the root");
  assert_eq!(*reloading, AsyncValue::Loading { previous: Some(1) });
  assert_eq!(*screen.read(&version).unwrap(), AsyncValue::Data(2));
}
