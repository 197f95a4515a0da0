use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// A shareable, type-erased error produced by a provider factory.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The main error type for `fibre_provider` operations.
///
/// Errors are cheap to clone so the same failure can be handed to several
/// readers (and stored inside an [`AsyncValue`](crate::AsyncValue)).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
  /// A provider's factory read itself, directly or through other providers.
  #[error("Circular dependency detected while resolving provider: {}", .chain.join(" -> "))]
  CircularDependency { chain: Vec<String> },

  /// A synchronous factory returned an error. Nothing was cached for it and
  /// the next read will run the factory again.
  #[error("Provider '{provider}' failed: {source}")]
  Failed {
    provider: String,
    #[source]
    source: Arc<dyn StdError + Send + Sync + 'static>,
  },

  /// The owner this operation was issued against has been disposed.
  #[error("Provider owner {owner} has been disposed")]
  OwnerDisposed { owner: String },

  /// The state behind a controller, subscription or reader no longer exists.
  #[error("Provider '{provider}' is no longer mounted")]
  Unmounted { provider: String },

  /// An asynchronous provider was read on an owner without a task spawner.
  #[error("Provider '{provider}' is asynchronous and requires a task spawner")]
  SpawnerRequired { provider: String },

  /// The stored value did not have the type the definition promised.
  #[error("Provider '{provider}' holds a value of an unexpected type")]
  TypeMismatch { provider: String },
}

impl ProviderError {
  /// Wraps an arbitrary error raised by a factory.
  pub fn failed(provider: impl Into<String>, source: impl Into<BoxError>) -> Self {
    ProviderError::Failed {
      provider: provider.into(),
      source: Arc::from(source.into()),
    }
  }

  /// Returns `true` for errors that indicate a programming defect rather than
  /// a runtime failure of a factory.
  pub fn is_fatal(&self) -> bool {
    matches!(self, ProviderError::CircularDependency { .. })
  }
}

/// Errors produced while building a [`ProviderStateOwner`](crate::ProviderStateOwner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// Two overrides were registered for the same provider (or family) on one owner.
  DuplicateOverride { provider: String },
  /// A child owner was requested from an owner that is already disposed.
  ParentDisposed,
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::DuplicateOverride { provider } => {
        write!(f, "provider '{}' was overridden more than once", provider)
      }
      BuildError::ParentDisposed => write!(f, "cannot create a child of a disposed owner"),
    }
  }
}

impl std::error::Error for BuildError {}

/// A specialized `Result` type for `fibre_provider` operations.
pub type Result<T, E = ProviderError> = std::result::Result<T, E>;
