use fibre_provider::{AsyncValue, FutureProvider, ProviderStateOwner, TokioLocalSpawner};
use std::io;
use std::rc::Rc;
use std::time::Duration;

#[tokio::test]
async fn test_tokio_local_spawner_drives_future_providers() {
  let local = tokio::task::LocalSet::new();
  local
    .run_until(async {
      // Arrange
      let owner = ProviderStateOwner::builder()
        .spawner(Rc::new(TokioLocalSpawner::new()))
        .build()
        .unwrap();
      let delayed = FutureProvider::new(|_| {
        Ok(async {
          tokio::time::sleep(Duration::from_millis(5)).await;
          Ok::<_, io::Error>("ready".to_string())
        })
      });

      // Act
      let initial = owner.read(&delayed).unwrap();
      let _subscription = owner.watch(&delayed, |_| {}).unwrap();
      let mut current = owner.read(&delayed).unwrap();
      for _ in 0..100 {
        if !current.is_loading() {
          break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        current = owner.read(&delayed).unwrap();
      }

      // Assert
      assert!(initial.is_loading());
      assert_eq!(*current, AsyncValue::Data("ready".to_string()));
    })
    .await;
}
