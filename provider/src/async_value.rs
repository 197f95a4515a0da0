//! A snapshot of a possibly still running computation.

use crate::error::BoxError;

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// The error half of an [`AsyncValue`]: the failure itself plus the stack
/// trace captured where it was recorded.
///
/// Two `AsyncError`s are equal when they share the same underlying error
/// object, so re-delivering one failure does not count as a change.
#[derive(Clone)]
pub struct AsyncError {
  error: Arc<dyn StdError + Send + Sync + 'static>,
  backtrace: Arc<Backtrace>,
}

impl AsyncError {
  pub fn new(error: impl Into<BoxError>) -> Self {
    Self {
      error: Arc::from(error.into()),
      backtrace: Arc::new(Backtrace::capture()),
    }
  }

  pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
    self.error.as_ref()
  }

  /// The stack trace captured when the error was recorded. Empty unless
  /// `RUST_BACKTRACE` (or `RUST_LIB_BACKTRACE`) is set.
  pub fn backtrace(&self) -> &Backtrace {
    &self.backtrace
  }

  /// Attempts to view the error as a concrete type.
  pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
    self.error.downcast_ref::<E>()
  }
}

impl<E> From<E> for AsyncError
where
  E: StdError + Send + Sync + 'static,
{
  fn from(error: E) -> Self {
    Self::new(error)
  }
}

impl PartialEq for AsyncError {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.error, &other.error)
  }
}

impl fmt::Debug for AsyncError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AsyncError").field("error", &self.error).finish_non_exhaustive()
  }
}

impl fmt::Display for AsyncError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.error, f)
  }
}

/// The state of an asynchronous provider.
///
/// `Loading` and `Error` may carry the data of an earlier successful run in
/// `previous`, so a refresh can keep showing stale data.
#[derive(Debug, Clone)]
pub enum AsyncValue<T> {
  Loading { previous: Option<T> },
  Data(T),
  Error { error: AsyncError, previous: Option<T> },
}

impl<T> AsyncValue<T> {
  pub fn loading() -> Self {
    AsyncValue::Loading { previous: None }
  }

  pub fn data(value: T) -> Self {
    AsyncValue::Data(value)
  }

  pub fn error(error: impl Into<AsyncError>) -> Self {
    AsyncValue::Error {
      error: error.into(),
      previous: None,
    }
  }

  /// Exhaustive dispatch over the three states.
  pub fn when<R>(
    &self,
    loading: impl FnOnce() -> R,
    data: impl FnOnce(&T) -> R,
    error: impl FnOnce(&AsyncError) -> R,
  ) -> R {
    match self {
      AsyncValue::Loading { .. } => loading(),
      AsyncValue::Data(value) => data(value),
      AsyncValue::Error { error: e, .. } => error(e),
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, AsyncValue::Loading { .. })
  }

  pub fn has_error(&self) -> bool {
    matches!(self, AsyncValue::Error { .. })
  }

  /// The fresh data, if this is `Data`.
  pub fn as_data(&self) -> Option<&T> {
    match self {
      AsyncValue::Data(value) => Some(value),
      _ => None,
    }
  }

  /// The fresh data, or the data kept from an earlier run.
  pub fn value(&self) -> Option<&T> {
    match self {
      AsyncValue::Data(value) => Some(value),
      AsyncValue::Loading { previous } | AsyncValue::Error { previous, .. } => previous.as_ref(),
    }
  }

  pub fn as_error(&self) -> Option<&AsyncError> {
    match self {
      AsyncValue::Error { error, .. } => Some(error),
      _ => None,
    }
  }

  pub fn map<U>(self, f: impl Fn(T) -> U) -> AsyncValue<U> {
    match self {
      AsyncValue::Loading { previous } => AsyncValue::Loading {
        previous: previous.map(&f),
      },
      AsyncValue::Data(value) => AsyncValue::Data(f(value)),
      AsyncValue::Error { error, previous } => AsyncValue::Error {
        error,
        previous: previous.map(&f),
      },
    }
  }

  /// Structural comparison with a custom equality for the payload.
  pub fn eq_by(&self, other: &Self, eq: impl Fn(&T, &T) -> bool) -> bool {
    let same_previous = |a: &Option<T>, b: &Option<T>| match (a, b) {
      (None, None) => true,
      (Some(a), Some(b)) => eq(a, b),
      _ => false,
    };
    match (self, other) {
      (AsyncValue::Loading { previous: a }, AsyncValue::Loading { previous: b }) => same_previous(a, b),
      (AsyncValue::Data(a), AsyncValue::Data(b)) => eq(a, b),
      (
        AsyncValue::Error { error: ea, previous: a },
        AsyncValue::Error { error: eb, previous: b },
      ) => ea == eb && same_previous(a, b),
      _ => false,
    }
  }
}

impl<T: Clone> AsyncValue<T> {
  /// The loading state that follows this one: keeps whatever data is known.
  pub fn to_loading(&self) -> Self {
    AsyncValue::Loading {
      previous: self.value().cloned(),
    }
  }

  /// Copy-with evolution: a `Loading` or `Error` without data of its own
  /// inherits the data known to `previous`. `Data` is returned unchanged.
  pub fn with_previous(self, previous: Option<&AsyncValue<T>>) -> Self {
    let inherited = || previous.and_then(|p| p.value().cloned());
    match self {
      AsyncValue::Loading { previous: None } => AsyncValue::Loading {
        previous: inherited(),
      },
      AsyncValue::Error { error, previous: None } => AsyncValue::Error {
        error,
        previous: inherited(),
      },
      other => other,
    }
  }
}

impl<T: PartialEq> PartialEq for AsyncValue<T> {
  fn eq(&self, other: &Self) -> bool {
    self.eq_by(other, |a, b| a == b)
  }
}

impl<T> Default for AsyncValue<T> {
  fn default() -> Self {
    AsyncValue::loading()
  }
}

impl<T> From<Result<T, AsyncError>> for AsyncValue<T> {
  fn from(result: Result<T, AsyncError>) -> Self {
    match result {
      Ok(value) => AsyncValue::Data(value),
      Err(error) => AsyncValue::error(error),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io;

  #[test]
  fn when_dispatches_on_every_state() {
    let describe = |v: &AsyncValue<i32>| v.when(|| "loading".to_string(), |d| format!("data {}", d), |e| format!("error {}", e));

    assert_eq!(describe(&AsyncValue::loading()), "loading");
    assert_eq!(describe(&AsyncValue::data(3)), "data 3");
    assert_eq!(
      describe(&AsyncValue::error(io::Error::new(io::ErrorKind::Other, "boom"))),
      "error boom"
    );
  }

  #[test]
  fn loading_keeps_previous_data() {
    let data = AsyncValue::data(7);
    let loading = data.to_loading();

    assert!(loading.is_loading());
    assert_eq!(loading.value(), Some(&7));
    assert_eq!(loading.as_data(), None);
  }

  #[test]
  fn error_inherits_previous_data_via_with_previous() {
    let before = AsyncValue::data("cached".to_string());
    let failed = AsyncValue::<String>::error(io::Error::new(io::ErrorKind::Other, "offline")).with_previous(Some(&before));

    assert!(failed.has_error());
    assert_eq!(failed.value().map(String::as_str), Some("cached"));
  }

  #[test]
  fn equality_is_structural_and_errors_compare_by_identity() {
    assert_eq!(AsyncValue::data(1), AsyncValue::data(1));
    assert_ne!(AsyncValue::data(1), AsyncValue::data(2));
    assert_ne!(AsyncValue::data(1), AsyncValue::Loading { previous: Some(1) });

    let error = AsyncError::new(io::Error::new(io::ErrorKind::Other, "x"));
    let a: AsyncValue<i32> = AsyncValue::error(error.clone());
    let b: AsyncValue<i32> = AsyncValue::error(error);
    let c: AsyncValue<i32> = AsyncValue::error(io::Error::new(io::ErrorKind::Other, "x"));
    assert_eq!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn map_transforms_data_and_previous() {
    let loading = AsyncValue::Loading { previous: Some(2) }.map(|v| v * 10);
    assert_eq!(loading.value(), Some(&20));
  }
}
