//! # Fibre Provider
//!
//! A lazily evaluated, scoped provider graph for reactive application state.
//!
//! A *provider* declares how to compute a value and which other providers it
//! depends on. Values live in a [`ProviderStateOwner`], which creates them on
//! first read, caches them, recomputes dependents when something upstream
//! changes and notifies listeners. Owners form a tree: a child owner can
//! *override* providers, and every provider that depends on an overridden one
//! is recomputed in the child instead of being shared with the parent.
//!
//! ## Core Concepts
//!
//! - **Definitions**: [`Provider`], [`StateProvider`], [`FutureProvider`],
//!   [`StreamProvider`] and parameterised [`Family`] members. A definition's
//!   identity is the object itself: clones are the same provider.
//! - **Reader**: passed to every factory. [`Reader::watch`] records a
//!   dependency, [`Reader::read`] only takes a snapshot.
//! - **Owners**: [`ProviderStateOwner`] holds states, configured through an
//!   [`OwnerBuilder`] with overrides, a [`TaskSpawner`] and observers.
//! - **Async**: asynchronous providers expose an [`AsyncValue`]; results of
//!   superseded builds are never committed.
//!
//! ## Quick Start
//!
//! ```
//! use fibre_provider::{Provider, ProviderStateOwner, StateProvider};
//!
//! let counter = StateProvider::new(|_| Ok(1)).named("counter");
//! let label = {
//!   let counter = counter.clone();
//!   Provider::new(move |r| Ok(format!("count = {}", r.watch(&counter)?))).named("label")
//! };
//!
//! let owner = ProviderStateOwner::new();
//! assert_eq!(*owner.read(&label).unwrap(), "count = 1");
//!
//! owner.controller(&counter).unwrap().update(|n| n + 1).unwrap();
//! assert_eq!(*owner.read(&label).unwrap(), "count = 2");
//!
//! // A child owner with the counter pinned to 10 sees its own label.
//! let pinned = owner.child().override_with(counter.override_with_value(10)).build().unwrap();
//! assert_eq!(*pinned.read(&label).unwrap(), "count = 10");
//! assert_eq!(*owner.read(&label).unwrap(), "count = 2");
//! ```

pub mod async_value;
pub mod builder;
pub mod error;
pub mod family;
pub mod kinds;
pub mod observer;
pub mod owner;
pub mod reader;
pub mod runtime;
pub mod subscription;

// Internal, crate-only modules
mod core;
mod definition;
mod graph;
mod macros;
mod overrides;
mod shared;

pub use crate::core::{FamilyId, ListenerId, OwnerId, ProviderId};
pub use async_value::{AsyncError, AsyncValue};
pub use builder::OwnerBuilder;
pub use definition::ProviderBase;
pub use error::{BoxError, BuildError, ProviderError, Result};
pub use family::Family;
pub use kinds::future::FutureProvider;
pub use kinds::provider::Provider;
pub use kinds::state::{StateController, StateProvider};
pub use kinds::stream::StreamProvider;
pub use observer::{ProviderInfo, ProviderObserver};
pub use overrides::Override;
pub use owner::ProviderStateOwner;
pub use reader::{Create, Invalidator, Reader};
pub use runtime::TaskSpawner;
#[cfg(feature = "tokio")]
pub use runtime::TokioLocalSpawner;
pub use subscription::ProviderSubscription;

#[doc(hidden)]
pub mod __private {
  pub use once_cell::sync::Lazy;
}
