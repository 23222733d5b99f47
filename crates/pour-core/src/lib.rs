pub mod adapter;
pub mod config;
pub mod error;
pub mod install;
pub mod io;
pub mod linker;
pub mod npm;
pub mod paths;
pub mod receipt;
pub mod recipe;
pub mod smoke;

pub mod reporter;

pub use error::InstallError;
pub use paths::*;
pub use reporter::{NullReporter, Reporter};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("pour-core/", env!("CARGO_PKG_VERSION"));
