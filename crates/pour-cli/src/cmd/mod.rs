use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use pour_core::config::Config;
use pour_core::paths::Layout;
use pour_core::recipe::Recipe;
use pour_schema::HostPlatform;

use crate::ui::ConsoleReporter;

pub mod adapt;
pub mod host;
pub mod install;
pub mod list;
pub mod test;
pub mod uninstall;

/// Everything a command needs, resolved once at startup.
#[derive(Debug)]
pub struct Context {
    pub layout: Layout,
    pub config: Config,
    pub host: HostPlatform,
    pub reporter: ConsoleReporter,
}

impl Context {
    pub fn load(home: Option<PathBuf>, quiet: bool) -> Result<Self> {
        let layout = match home {
            Some(home) => Layout::new(home),
            None => Layout::from_env()?,
        };
        let config = Config::load(&layout)?;
        let host = config.host().context("Invalid host override")?;
        Ok(Self {
            layout,
            config,
            host,
            reporter: ConsoleReporter::new(quiet),
        })
    }
}

/// The recipe at `path`, or the built-in httpyac recipe.
pub fn load_recipe(path: Option<&Path>) -> Result<Recipe> {
    match path {
        Some(path) => Recipe::from_file(path)
            .with_context(|| format!("Failed to load recipe {}", path.display())),
        None => Recipe::builtin("httpyac").context("Built-in recipe is missing"),
    }
}
