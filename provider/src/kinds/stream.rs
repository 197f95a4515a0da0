use crate::async_value::{AsyncError, AsyncValue};
use crate::definition::{impl_definition_common, sealed::Sealed, structural, Equality, Meta, ProviderBase, Recipe, ValueRecipe};
use crate::error::{BoxError, Result};
use crate::kinds::future::{async_equality, async_same, previous_async};
use crate::overrides::Override;
use crate::reader::Reader;

use futures_util::future::{abortable, FutureExt};
use futures_util::stream::{LocalBoxStream, Stream, StreamExt};
use std::any::Any;
use std::rc::Rc;
use std::sync::Arc;

type StreamCreate<T> = dyn Fn(&Reader) -> Result<LocalBoxStream<'static, Result<T, BoxError>>> + Send + Sync;

/// A provider whose value follows a stream.
///
/// The state starts as `Loading` and every item of the stream replaces it
/// with `Data` (for `Ok`) or `Error` (for `Err`, keeping the last data as
/// `previous`). The stream of a superseded build is dropped.
pub struct StreamProvider<T> {
  meta: Meta,
  create: Arc<StreamCreate<T>>,
  eq: Equality<T>,
}

impl_definition_common!(StreamProvider);

impl<T: Clone + 'static> StreamProvider<T> {
  pub fn new<F, S, E>(create: F) -> Self
  where
    T: PartialEq,
    F: Fn(&Reader) -> Result<S> + Send + Sync + 'static,
    S: Stream<Item = std::result::Result<T, E>> + 'static,
    E: Into<BoxError> + 'static,
  {
    Self {
      meta: Meta::new(),
      create: erase(create),
      eq: structural::<T>(),
    }
  }

  pub fn opaque<F, S, E>(create: F) -> Self
  where
    F: Fn(&Reader) -> Result<S> + Send + Sync + 'static,
    S: Stream<Item = std::result::Result<T, E>> + 'static,
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

  pub fn override_with(&self, replacement: StreamProvider<T>) -> Override {
    Override::provider(&self.meta, replacement.recipe())
  }

  pub fn override_with_value(&self, value: AsyncValue<T>) -> Override {
    let recipe = ValueRecipe {
      value,
      eq: async_equality(&self.eq),
    };
    Override::provider(&self.meta, Rc::new(recipe))
  }

  pub fn override_with_data(&self, value: T) -> Override {
    self.override_with_value(AsyncValue::Data(value))
  }
}

fn erase<T, F, S, E>(create: F) -> Arc<StreamCreate<T>>
where
  T: 'static,
  F: Fn(&Reader) -> Result<S> + Send + Sync + 'static,
  S: Stream<Item = std::result::Result<T, E>> + 'static,
  E: Into<BoxError> + 'static,
{
  Arc::new(move |reader: &Reader| {
    let stream = create(reader)?;
    Ok(stream.map(|item| item.map_err(Into::into)).boxed_local())
  })
}

struct StreamRecipe<T> {
  create: Arc<StreamCreate<T>>,
  eq: Equality<T>,
}

impl<T: Clone + 'static> Recipe for StreamRecipe<T> {
  fn build(&self, reader: &Reader) -> Result<Rc<dyn Any>> {
    let spawner = reader.spawner()?;
    let previous = previous_async::<T>(reader);

    let mut stream = match (self.create)(reader) {
      Ok(stream) => stream,
      Err(error) if error.is_fatal() => return Err(error),
      Err(error) => {
        let failed = AsyncValue::<T>::error(error).with_previous(previous.as_deref());
        return Ok(Rc::new(failed));
      }
    };

    let completion = reader.completion();
    let (task, handle) = abortable(async move {
      while let Some(item) = stream.next().await {
        if !completion.is_current() {
          break;
        }
        completion.apply(move |current| {
          let current = current.and_then(|c| c.downcast::<AsyncValue<T>>().ok());
          let next = match item {
            Ok(data) => AsyncValue::Data(data),
            Err(error) => AsyncValue::error(AsyncError::new(error)).with_previous(current.as_deref()),
          };
          Rc::new(next) as Rc<dyn Any>
        });
      }
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

impl<T: Clone + 'static> Sealed for StreamProvider<T> {
  fn meta(&self) -> &Meta {
    &self.meta
  }

  fn meta_mut(&mut self) -> &mut Meta {
    &mut self.meta
  }

  fn recipe(&self) -> Rc<dyn Recipe> {
    Rc::new(StreamRecipe {
      create: self.create.clone(),
      eq: self.eq.clone(),
    })
  }
}

impl<T: Clone + 'static> ProviderBase for StreamProvider<T> {
  type Value = AsyncValue<T>;
}
