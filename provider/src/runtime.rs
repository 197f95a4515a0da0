use futures_util::future::LocalBoxFuture;

/// A trait for spawning a future onto the event loop that owns a
/// [`ProviderStateOwner`](crate::ProviderStateOwner).
///
/// The owner graph is single-threaded, so spawned futures are not required
/// to be `Send` and must be polled on the owner's thread. Asynchronous
/// providers complete by touching the graph from inside the spawned task.
pub trait TaskSpawner: 'static {
  /// Spawns a type-erased future.
  fn spawn(&self, future: LocalBoxFuture<'static, ()>);
}

#[cfg(feature = "executor")]
impl TaskSpawner for futures_executor::LocalSpawner {
  fn spawn(&self, future: LocalBoxFuture<'static, ()>) {
    use futures_util::task::LocalSpawnExt;

    if let Err(error) = self.spawn_local(future) {
      tracing::warn!(%error, "local executor rejected a provider task");
    }
  }
}

/// Spawns provider tasks with `tokio::task::spawn_local`.
///
/// Must be used from inside a `tokio::task::LocalSet`; spawning outside one
/// panics, as `spawn_local` does.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLocalSpawner;

#[cfg(feature = "tokio")]
impl TokioLocalSpawner {
  pub fn new() -> Self {
    Self
  }
}

#[cfg(feature = "tokio")]
impl TaskSpawner for TokioLocalSpawner {
  fn spawn(&self, future: LocalBoxFuture<'static, ()>) {
    tokio::task::spawn_local(future);
  }
}
