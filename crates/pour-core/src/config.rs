//! User configuration.
//!
//! Values come from `<home>/config.toml` and are then overridden by
//! `POUR_*` environment variables.

use std::time::Duration;

use anyhow::{Context, Result};
use pour_schema::{Arch, HostPlatform, Os};
use serde::{Deserialize, Serialize};

use crate::paths::Layout;

const DEFAULT_SMOKE_TIMEOUT_SECS: u64 = 120;

/// Settings read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// npm program to run (name on PATH or absolute path)
    pub npm: Option<String>,
    /// Pretend to be this OS (e.g. when staging a tree for another machine)
    pub host_os: Option<String>,
    /// Pretend to be this architecture
    pub host_arch: Option<String>,
    /// Upper bound for each smoke-test invocation
    pub smoke_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            npm: None,
            host_os: None,
            host_arch: None,
            smoke_timeout_secs: DEFAULT_SMOKE_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load `config.toml` from the layout (if present) and apply environment overrides.
    pub fn load(layout: &Layout) -> Result<Self> {
        let path = layout.config_file();
        let config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))?
        } else {
            Self::default()
        };
        Ok(config.apply_env())
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `POUR_NPM`, `POUR_HOST_OS`, `POUR_HOST_ARCH` and `POUR_SMOKE_TIMEOUT`.
    pub fn apply_env(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Same as [`apply_env`](Self::apply_env) with an injectable lookup.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(npm) = get("POUR_NPM") {
            self.npm = Some(npm);
        }
        if let Some(os) = get("POUR_HOST_OS") {
            self.host_os = Some(os);
        }
        if let Some(arch) = get("POUR_HOST_ARCH") {
            self.host_arch = Some(arch);
        }
        if let Some(secs) = get("POUR_SMOKE_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.smoke_timeout_secs = secs;
        }
        self
    }

    /// The Host Platform Descriptor, detected and then overridden by config.
    pub fn host(&self) -> Result<HostPlatform> {
        let mut host = HostPlatform::detect();
        if let Some(os) = &self.host_os {
            host.os = Os::from(os.as_str());
        }
        if let Some(arch) = &self.host_arch {
            host.arch = arch.parse::<Arch>().map_err(anyhow::Error::msg)?;
        }
        Ok(host)
    }

    pub fn npm_program(&self) -> &str {
        self.npm.as_deref().unwrap_or("npm")
    }

    pub fn smoke_timeout(&self) -> Duration {
        Duration::from_secs(self.smoke_timeout_secs)
    }
}
