//! The provider kinds: how each flavour of definition builds its value.

pub mod future;
pub mod provider;
pub mod state;
pub mod stream;
