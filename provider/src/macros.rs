//! Public macros for declaring providers.

/// Declares a provider as a lazily initialised `static`, named after the item.
///
/// The right-hand side is any provider definition expression. The `static`
/// name becomes the provider's debug name, so logs, errors and observer
/// events refer to it.
///
/// # Examples
///
/// ```
/// use fibre_provider::{provider, Provider, ProviderStateOwner, StateProvider};
///
/// provider!(COUNTER: StateProvider<i32> = StateProvider::new(|_| Ok(0)));
/// provider!(pub DOUBLED: Provider<i32> = Provider::new(|r| Ok(*r.watch(&*COUNTER)? * 2)));
///
/// let owner = ProviderStateOwner::new();
/// owner.controller(&COUNTER).unwrap().set(21).unwrap();
/// assert_eq!(*owner.read(&*DOUBLED).unwrap(), 42);
/// assert_eq!(fibre_provider::ProviderBase::name(&*DOUBLED), Some("DOUBLED"));
/// ```
#[macro_export]
macro_rules! provider {
  ($(#[$attr:meta])* $vis:vis $name:ident : $ty:ty = $init:expr) => {
    $(#[$attr])*
    $vis static $name: $crate::__private::Lazy<$ty> =
      $crate::__private::Lazy::new(|| ($init).named(stringify!($name)));
  };
}
