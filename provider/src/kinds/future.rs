use crate::async_value::{AsyncError, AsyncValue};
use crate::definition::{impl_definition_common, sealed::Sealed, structural, Equality, Meta, ProviderBase, Recipe, ValueRecipe};
use crate::error::{BoxError, Result};
use crate::overrides::Override;
use crate::reader::Reader;

use futures_util::future::{abortable, LocalBoxFuture};
use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

type FutureCreate<T> = dyn Fn(&Reader) -> Result<LocalBoxFuture<'static, Result<T, BoxError>>> + Send + Sync;

/// A provider whose value is produced by a future.
///
/// Its state is an [`AsyncValue<T>`]: `Loading` until the future resolves,
/// then `Data` or `Error`. When the provider rebuilds, the previous data is
/// kept in `Loading { previous }` and the future of the superseded build is
/// aborted; its result is never committed.
///
/// Reading a future provider requires an owner with a
/// [`TaskSpawner`](crate::TaskSpawner).
pub struct FutureProvider<T> {
  meta: Meta,
  create: Arc<FutureCreate<T>>,
  eq: Equality<T>,
}

impl_definition_common!(FutureProvider);

/// Lifts a payload comparison to the `AsyncValue` wrapper.
pub(crate) fn async_equality<T: 'static>(eq: &Equality<T>) -> Equality<AsyncValue<T>> {
  let eq = eq.clone()?;
  Some(Arc::new(move |a: &AsyncValue<T>, b: &AsyncValue<T>| a.eq_by(b, |x, y| eq(x, y))))
}

impl<T: Clone + 'static> FutureProvider<T> {
  /// The factory runs synchronously (so it can watch other providers) and
  /// returns the future to spawn.
  pub fn new<F, Fut, E>(create: F) -> Self
  where
    T: PartialEq,
    F: Fn(&Reader) -> Result<Fut> + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + 'static,
    E: Into<BoxError> + 'static,
  {
    Self {
      meta: Meta::new(),
      create: erase(create),
      eq: structural::<T>(),
    }
  }

  /// Like [`new`](Self::new), for data without a notion of equality.
  pub fn opaque<F, Fut, E>(create: F) -> Self
  where
    F: Fn(&Reader) -> Result<Fut> + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + 'static,
    E: Into<BoxError> + 'static,
  {
    Self {
      meta: Meta::new(),
      create: erase(create),
      eq: None,
    }
  }

  pub fn with_equality(mut self, eq: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
    self.eq = Some(Arc::new(eq));
    self
  }

  pub fn override_with(&self, replacement: FutureProvider<T>) -> Override {
    Override::provider(&self.meta, replacement.recipe())
  }

  /// Pins the provider to a fixed state inside an owner subtree. No task is
  /// spawned, so this also works on owners without a spawner.
  pub fn override_with_value(&self, value: AsyncValue<T>) -> Override {
    let recipe = ValueRecipe {
      value,
      eq: async_equality(&self.eq),
    };
    Override::provider(&self.meta, Rc::new(recipe))
  }

  /// Shorthand for `override_with_value(AsyncValue::Data(value))`.
  pub fn override_with_data(&self, value: T) -> Override {
    self.override_with_value(AsyncValue::Data(value))
  }
}

fn erase<T, F, Fut, E>(create: F) -> Arc<FutureCreate<T>>
where
  T: 'static,
  F: Fn(&Reader) -> Result<Fut> + Send + Sync + 'static,
  Fut: Future<Output = std::result::Result<T, E>> + 'static,
  E: Into<BoxError> + 'static,
{
  Arc::new(move |reader: &Reader| {
    let future = create(reader)?;
    Ok(future.map(|result| result.map_err(Into::into)).boxed_local())
  })
}

/// The committed `AsyncValue` of the build being replaced, if any.
pub(crate) fn previous_async<T: 'static>(reader: &Reader) -> Option<Rc<AsyncValue<T>>> {
  reader.previous()?.downcast::<AsyncValue<T>>().ok()
}

pub(crate) fn async_same<T: 'static>(eq: &Equality<T>, previous: &dyn Any, next: &dyn Any) -> bool {
  match (eq, previous.downcast_ref::<AsyncValue<T>>(), next.downcast_ref::<AsyncValue<T>>()) {
    (Some(eq), Some(previous), Some(next)) => previous.eq_by(next, |a, b| eq(a, b)),
    _ => false,
  }
}

struct FutureRecipe<T> {
  create: Arc<FutureCreate<T>>,
  eq: Equality<T>,
}

impl<T: Clone + 'static> Recipe for FutureRecipe<T> {
  fn build(&self, reader: &Reader) -> Result<Rc<dyn Any>> {
    let spawner = reader.spawner()?;
    let previous = previous_async::<T>(reader);

    let future = match (self.create)(reader) {
      Ok(future) => future,
      Err(error) if error.is_fatal() => return Err(error),
      Err(error) => {
        let failed = AsyncValue::<T>::error(error).with_previous(previous.as_deref());
        return Ok(Rc::new(failed));
      }
    };

    let completion = reader.completion();
    let (task, handle) = abortable(async move {
      let result = future.await;
      completion.apply(move |current| {
        let current = current.and_then(|c| c.downcast::<AsyncValue<T>>().ok());
        let next = match result {
          Ok(data) => AsyncValue::Data(data),
          Err(error) => AsyncValue::error(AsyncError::new(error)).with_previous(current.as_deref()),
        };
        Rc::new(next) as Rc<dyn Any>
      });
    });
    spawner.spawn(task.map(drop).boxed_local());
    reader.on_dispose(move || handle.abort());

    let loading = match previous.as_deref() {
      Some(previous) => previous.to_loading(),
      None => AsyncValue::loading(),
    };
    Ok(Rc::new(loading))
  }

  fn same(&self, previous: &dyn Any, next: &dyn Any) -> bool {
    async_same(&self.eq, previous, next)
  }
}

impl<T: Clone + 'static> Sealed for FutureProvider<T> {
  fn meta(&self) -> &Meta {
    &self.meta
  }

  fn meta_mut(&mut self) -> &mut Meta {
    &mut self.meta
  }

  fn recipe(&self) -> Rc<dyn Recipe> {
    Rc::new(FutureRecipe {
      create: self.create.clone(),
      eq: self.eq.clone(),
    })
  }
}

impl<T: Clone + 'static> ProviderBase for FutureProvider<T> {
  type Value = AsyncValue<T>;
}
