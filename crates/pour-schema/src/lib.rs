//! Shared types for pour.
//!
//! Everything here is plain data: validated newtypes for package identity and
//! the [`HostPlatform`] descriptor that drives every platform-specific branch
//! in `pour-core`.

pub mod arch;
pub mod hash;
pub mod platform;
pub mod types;

// Re-exports
pub use arch::*;
pub use hash::*;
pub use platform::*;
pub use types::*;
