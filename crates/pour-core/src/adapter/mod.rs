//! Platform adaptation of a freshly installed npm prefix.
//!
//! Two passes, always in this order:
//!
//! 1. vendored fallback binaries are discarded and, where the host needs a
//!    helper, replaced by a link to a sibling package's binary ([`fallback`]);
//! 2. universal Mach-O binaries are reduced to the host slice ([`macho`]).

pub mod fallback;
pub mod macho;

use std::path::Path;

use pour_schema::{HostPlatform, Os};
use tracing::debug;

use crate::error::InstallError;
use crate::paths::Layout;
use crate::recipe::{FallbackSpec, HelperSpec, Recipe};

pub use fallback::FallbackOutcome;
pub use macho::ThinnedBinary;

/// How the host OS is treated by the fallback pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformClass {
    /// The vendored binary is replaced with one from a sibling package.
    NeedsHelper(HelperSpec),
    /// The OS provides the facility itself; nothing is linked.
    NativeFacilities,
    /// Unknown OS: the directory is reset and left empty.
    Unsupported,
}

impl PlatformClass {
    pub fn classify(os: &Os, spec: &FallbackSpec) -> Self {
        if !os.is_supported() {
            return Self::Unsupported;
        }
        match spec.helper_for(os) {
            Some(helper) => Self::NeedsHelper(helper.clone()),
            None => Self::NativeFacilities,
        }
    }
}

/// Result of adapting one install.
#[derive(Debug, Clone, Default)]
pub struct AdaptReport {
    pub fallback: Option<FallbackOutcome>,
    pub thinned: Vec<ThinnedBinary>,
}

/// Adapts an installed prefix to one host.
#[derive(Debug)]
pub struct PlatformAdapter<'a> {
    host: &'a HostPlatform,
    layout: &'a Layout,
}

impl<'a> PlatformAdapter<'a> {
    pub fn new(host: &'a HostPlatform, layout: &'a Layout) -> Self {
        Self { host, layout }
    }

    /// Run both passes over `prefix` (the npm prefix) and `root` (the tree
    /// scanned for universal binaries, normally the whole Install Target).
    pub fn adapt(
        &self,
        recipe: &Recipe,
        prefix: &Path,
        root: &Path,
    ) -> Result<AdaptReport, InstallError> {
        let fallback = match &recipe.fallbacks {
            Some(spec) => {
                let dir =
                    fallback::locate(prefix, &spec.relative_path(&recipe.package.name))?;
                let class = PlatformClass::classify(&self.host.os, spec);
                debug!(host = %self.host, ?class, "classified host");
                Some(fallback::replace_fallbacks(
                    &dir,
                    &class,
                    &self.host.os,
                    self.layout,
                )?)
            }
            None => None,
        };

        let thinned = macho::deuniversalize(root, self.host.arch)?;
        Ok(AdaptReport { fallback, thinned })
    }
}
