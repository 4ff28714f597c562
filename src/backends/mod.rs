//! Provider implementations.

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "arm")]
pub mod arm;

/// Registers all compiled providers with the factory.
///
/// This is called automatically by [`init`](crate::init), but can also be
/// called explicitly if needed.
pub fn register_all() {
    #[cfg(feature = "mock")]
    mock::register();

    #[cfg(feature = "arm")]
    arm::register();
}
