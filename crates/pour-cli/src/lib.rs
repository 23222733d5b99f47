//! pour - install npm-distributed CLI tools the way a package manager would
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! # Overview
//!
//! `pour install` fetches a recipe's tarball, installs its whole npm
//! dependency graph into a private prefix, adapts that tree to the host
//! (vendored helper binaries replaced, universal Mach-O binaries thinned),
//! exposes its executables on the command path and smoke-tests the result.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.pour/
//! ├── bin/        # Symlinks to installed executables
//! ├── cellar/     # Install Targets by name/version
//! ├── opt/        # name -> active Install Target
//! ├── cache/      # Verified tarballs (by hash), npm cache
//! ├── logs/       # npm install logs
//! └── config.toml
//! ```

pub mod cmd;
pub mod ui;

pub use pour_core::USER_AGENT;
pub use pour_core::paths::*;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pour")]
#[command(author, version, about = "pour - install, adapt and verify npm-distributed CLI tools")]
pub struct Cli {
    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Show debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use DIR instead of ~/.pour (also POUR_HOME)
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install a package from its recipe
    Install {
        /// Recipe file (defaults to the built-in httpyac recipe)
        #[arg(long, value_name = "FILE")]
        recipe: Option<PathBuf>,
        /// Do not run the smoke test after installing
        #[arg(long)]
        skip_test: bool,
        /// Show what would happen without making changes
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove a package's links, opt link and Install Targets
    Uninstall {
        /// Package name
        #[arg(default_value = "httpyac")]
        name: String,
    },
    /// Re-run the smoke test against the installed version
    Test {
        #[arg(long, value_name = "FILE")]
        recipe: Option<PathBuf>,
    },
    /// Run platform adaptation on an existing npm prefix
    Adapt {
        /// The npm prefix (an Install Target's libexec/)
        libexec: PathBuf,
        #[arg(long, value_name = "FILE")]
        recipe: Option<PathBuf>,
    },
    /// List installed packages
    List,
    /// Show the detected host platform
    Host,
}
