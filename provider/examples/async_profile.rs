//! Loads a user profile asynchronously and shows how a dependent provider
//! keeps the previous data while a new profile loads.
//!
//! Run with `RUST_LOG=fibre_provider=trace` to see the graph at work.

use fibre_provider::{AsyncValue, FutureProvider, Provider, ProviderStateOwner, StateProvider};
use futures_executor::LocalPool;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct Profile {
  id: u32,
  display_name: String,
}

async fn fetch_profile(id: u32) -> Result<Profile, String> {
  // Stands in for a network call.
  std::thread::sleep(Duration::from_millis(20));
  if id == 0 {
    return Err("no such user".to_string());
  }
  Ok(Profile {
    id,
    display_name: format!("user #{}", id),
  })
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let user_id = StateProvider::new(|_| Ok(1u32)).named("user_id");
  let profile = {
    let user_id = user_id.clone();
    FutureProvider::new(move |r| {
      let id = *r.watch(&user_id)?;
      Ok(async move { fetch_profile(id).await })
    })
    .named("profile")
  };
  let headline = {
    let profile = profile.clone();
    Provider::new(move |r| {
      let state = r.watch(&profile)?;
      let text = match &*state {
        AsyncValue::Data(p) => format!("Hello, {}", p.display_name),
        AsyncValue::Loading { previous: Some(p) } => format!("Hello, {} (refreshing)", p.display_name),
        AsyncValue::Loading { previous: None } => "Loading...".to_string(),
        AsyncValue::Error { error, .. } => format!("Could not load profile: {}", error),
      };
      Ok(text)
    })
    .named("headline")
  };

  let mut pool = LocalPool::new();
  let owner = ProviderStateOwner::builder()
    .name("app")
    .spawner(Rc::new(pool.spawner()))
    .build()
    .expect("owner configuration is valid");

  let subscription = owner
    .watch(&headline, |text| println!("headline changed: {}", text))
    .expect("headline can be watched");
  println!("initial headline: {}", subscription.read().expect("headline is mounted"));

  pool.run_until_stalled();

  let controller = owner.controller(&user_id).expect("user_id is a state provider");
  for next in [2, 0] {
    controller.set(next).expect("user_id is mounted");
    pool.run_until_stalled();
  }

  if let Ok(profile) = owner.read(&profile) {
    println!("final profile state: {:?}", profile.value().map(|p| p.id));
  }

  subscription.close();
  owner.dispose();
}
