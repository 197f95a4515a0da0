//! Core, mostly non-public identity types shared by definitions and owners.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! identity {
  ($(#[$meta:meta])* $name:ident, $label:literal) => {
    $(#[$meta])*
    #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct $name(u64);

    impl $name {
      pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
      }

      /// The raw numeric value of this identity.
      pub fn as_u64(self) -> u64 {
        self.0
      }
    }

    impl fmt::Debug for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, concat!($label, "#{}"), self.0)
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
      }
    }
  };
}

identity!(
  /// The identity of a provider definition. Clones of a definition share it;
  /// two separately constructed definitions never do, even if their factories
  /// are identical.
  ProviderId,
  "Provider"
);

identity!(
  /// The identity of a provider family.
  FamilyId,
  "Family"
);

identity!(
  /// The identity of a [`ProviderStateOwner`](crate::ProviderStateOwner) scope.
  OwnerId,
  "Owner"
);

identity!(
  /// The identity of a registered listener.
  ListenerId,
  "Listener"
);
