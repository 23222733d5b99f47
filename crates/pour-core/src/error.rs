//! Domain-specific errors for install operations

use std::path::PathBuf;

use pour_schema::Arch;
use thiserror::Error;

use crate::io::download::DownloadError;
use crate::recipe::RecipeError;

#[derive(Error, Debug)]
pub enum InstallError {
    /// An expected path inside the installed dependency tree is missing.
    /// Usually means the upstream dependency changed its layout.
    #[error("Expected path not found: {}", path.display())]
    PathNotFound { path: PathBuf },

    /// A command-path name is already claimed by something we did not create.
    #[error("Link conflict: '{name}' already exists and points to {}", existing.display())]
    Conflict { name: String, existing: PathBuf },

    /// A binary claims to be universal but cannot be reduced to the host slice.
    #[error("Unsupported binary format in {}: {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("Failed to resolve dependency '{package}': {detail}")]
    DependencyResolution { package: String, detail: String },

    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Dependency install failed: {0}")]
    DependencyInstall(String),

    #[error("Smoke test failed: {0}")]
    SmokeTest(String),

    #[error("Invalid recipe: {0}")]
    Recipe(#[from] RecipeError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{context}: {message}")]
    Context {
        context: &'static str,
        message: String,
    },
}

impl InstallError {
    /// Create an error with context for better debugging.
    pub fn context(ctx: &'static str, msg: impl std::fmt::Display) -> Self {
        Self::Context {
            context: ctx,
            message: msg.to_string(),
        }
    }

    /// No slice in a universal binary matches the host architecture.
    pub fn missing_slice(path: impl Into<PathBuf>, arch: Arch, found: &[Arch]) -> Self {
        let found = found
            .iter()
            .map(Arch::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Self::UnsupportedFormat {
            path: path.into(),
            reason: format!("no {arch} slice (found: {found})"),
        }
    }

    /// Wrap an I/O error with the path it happened on.
    pub fn io_at(ctx: &'static str, path: &std::path::Path, err: std::io::Error) -> Self {
        Self::context(ctx, format!("{}: {err}", path.display()))
    }
}

impl From<anyhow::Error> for InstallError {
    fn from(err: anyhow::Error) -> Self {
        Self::context("Unexpected failure", format!("{err:#}"))
    }
}
