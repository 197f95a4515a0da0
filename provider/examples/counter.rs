//! The classic counter: a settable state, a derived value, scoped overrides.

use fibre_provider::{provider, Provider, ProviderStateOwner, StateProvider};

provider!(COUNTER: StateProvider<i64> = StateProvider::new(|_| Ok(0)));
provider!(DOUBLED: Provider<i64> = Provider::new(|r| Ok(*r.watch(&*COUNTER)? * 2)));
provider!(DESCRIPTION: Provider<String> = Provider::new(|r| {
  let doubled = *r.watch(&*DOUBLED)?;
  Ok(if doubled % 4 == 0 { format!("{} (multiple of four)", doubled) } else { doubled.to_string() })
}));

fn main() -> Result<(), Box<dyn std::error::Error>> {
  let root = ProviderStateOwner::builder().name("root").build()?;
  let subscription = root.watch(&*DESCRIPTION, |text| println!("[root] description: {}", text))?;

  let counter = root.controller(&*COUNTER)?;
  for _ in 0..3 {
    counter.update(|n| n + 1)?;
  }

  // A child scope that pins the counter; DOUBLED and DESCRIPTION are
  // recomputed for it while the root keeps its own values.
  let preview = root
    .child()
    .name("preview")
    .override_with(COUNTER.override_with_value(100))
    .build()?;
  println!("[preview] description: {}", preview.read(&*DESCRIPTION)?);
  println!("[root] description: {}", root.read(&*DESCRIPTION)?);

  subscription.close();
  root.dispose();
  Ok(())
}
