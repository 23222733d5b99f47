//! Install orchestration.
//!
//! One install runs, in order:
//!
//! 1. runtime / OS dependency check
//! 2. fetch and verify the tarball
//! 3. npm install into a staging `libexec` under `cellar/<name>/`
//! 4. platform adaptation (fallbacks, then universal binaries)
//! 5. link `libexec/bin/*` into `<home>/bin`
//! 6. point `opt/<name>` at the Install Target and write the receipt
//! 7. smoke test
//!
//! Steps 3-4 run in a staging tree beside the Install Target. A failure
//! there, or in step 5, leaves any previous install of the same version and
//! its links as they were.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pour_schema::{HostPlatform, PackageName};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::Reporter;
use crate::adapter::{AdaptReport, PlatformAdapter, PlatformClass};
use crate::error::InstallError;
use crate::io::download;
use crate::io::tarball::verify_tarball;
use crate::linker::{DirLinkRegistry, LinkRecord, link_executables, unlink};
use crate::npm::DependencyInstaller;
use crate::paths::{Layout, relative_path};
use crate::receipt::{self, InstallReceipt};
use crate::recipe::Recipe;
use crate::smoke::{SmokeReport, SmokeTest};

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    pub skip_test: bool,
}

/// What an install would do, without doing it.
#[derive(Debug, Clone)]
pub struct InstallPlan {
    pub target: PathBuf,
    pub libexec: PathBuf,
    pub fallback_dir: Option<PathBuf>,
    pub class: Option<PlatformClass>,
    pub dependencies: Vec<String>,
    pub replaces_existing: bool,
}

pub struct Installer<'a> {
    layout: &'a Layout,
    host: &'a HostPlatform,
    deps: &'a dyn DependencyInstaller,
    reporter: &'a dyn Reporter,
    client: Client,
    smoke_timeout: Duration,
}

impl<'a> Installer<'a> {
    pub fn new(
        layout: &'a Layout,
        host: &'a HostPlatform,
        deps: &'a dyn DependencyInstaller,
        reporter: &'a dyn Reporter,
    ) -> Result<Self, InstallError> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()
            .map_err(|e| InstallError::context("Failed to build HTTP client", e))?;
        Ok(Self {
            layout,
            host,
            deps,
            reporter,
            client,
            smoke_timeout: Duration::from_secs(120),
        })
    }

    #[must_use]
    pub fn with_smoke_timeout(mut self, timeout: Duration) -> Self {
        self.smoke_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn plan(&self, recipe: &Recipe) -> InstallPlan {
        let pkg = &recipe.package;
        let target = self.layout.install_target(&pkg.name, &pkg.version);
        let libexec = Layout::libexec(&target);
        let (fallback_dir, class) = match &recipe.fallbacks {
            Some(spec) => (
                Some(libexec.join(spec.relative_path(&pkg.name))),
                Some(PlatformClass::classify(&self.host.os, spec)),
            ),
            None => (None, None),
        };
        InstallPlan {
            replaces_existing: target.exists(),
            target,
            libexec,
            fallback_dir,
            class,
            dependencies: recipe
                .dependencies
                .for_os(&self.host.os)
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// Fail unless every dependency is installed under `opt/` or on `PATH`.
    pub fn check_dependencies(&self, recipe: &Recipe) -> Result<(), InstallError> {
        for dep in recipe.dependencies.for_os(&self.host.os) {
            if self.layout.opt_dir(dep).exists() {
                debug!(dep, "dependency found in opt");
                continue;
            }
            match which::which(dep) {
                Ok(path) => debug!(dep, path = %path.display(), "dependency found on PATH"),
                Err(_) => {
                    return Err(InstallError::DependencyResolution {
                        package: dep.to_string(),
                        detail: format!(
                            "not installed in {} and not found on PATH",
                            self.layout.opt_dir(dep).display()
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    pub async fn install(
        &self,
        recipe: &Recipe,
        options: InstallOptions,
    ) -> Result<InstallReceipt, InstallError> {
        let pkg = &recipe.package;
        let (name, version) = (&pkg.name, &pkg.version);
        info!(%name, %version, host = %self.host, "installing");

        self.check_dependencies(recipe)?;

        self.reporter.step(name, version, "fetching");
        let tarball =
            download::fetch(&self.client, pkg, &self.layout.cache_dir(), self.reporter).await?;
        verify_tarball(&tarball, pkg)?;

        let target = self.layout.install_target(name, version);
        let links = match self.build(recipe, &tarball, &target) {
            Ok(links) => links,
            Err(e) => {
                self.reporter.failed(name, version, &e.to_string());
                return Err(e);
            }
        };

        self.link_opt(name, &target)?;
        let receipt = InstallReceipt {
            name: name.clone(),
            version: version.clone(),
            sha256: pkg.sha256.as_str().to_string(),
            host: self.host.clone(),
            links,
            installed_at: chrono::Utc::now(),
        };
        receipt.write(&target)?;

        if !options.skip_test {
            self.smoke_test(recipe)?;
        }

        self.reporter.done(name, version, "installed", None);
        Ok(receipt)
    }

    /// Build into a staging tree next to `target`, then move it into place
    /// and link it.
    ///
    /// The staging tree sits at the same depth as `target`, so relative links
    /// made while adapting stay valid after the rename. An existing install of
    /// the same version is only replaced once its successor is complete, and
    /// is restored if linking fails.
    fn build(
        &self,
        recipe: &Recipe,
        tarball: &Path,
        target: &Path,
    ) -> Result<Vec<LinkRecord>, InstallError> {
        let pkg = &recipe.package;
        let package_dir = self.layout.package_dir(&pkg.name);
        std::fs::create_dir_all(&package_dir)?;
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}-staging", pkg.version))
            .tempdir_in(&package_dir)?;
        let libexec = Layout::libexec(staging.path());

        self.reporter.step(&pkg.name, &pkg.version, "installing dependencies");
        let log_path = self.layout.install_log_path(&pkg.name, &pkg.version);
        self.deps.install(&pkg.name, tarball, &libexec, &log_path)?;

        self.reporter.step(&pkg.name, &pkg.version, "adapting");
        let report =
            PlatformAdapter::new(self.host, self.layout).adapt(recipe, &libexec, staging.path())?;
        self.report_adaptation(&report);

        let retired = package_dir.join(format!(".{}-retired", pkg.version));
        if retired.exists() {
            std::fs::remove_dir_all(&retired)?;
        }
        let replacing = target.exists();
        if replacing {
            debug!(target = %target.display(), "moving previous install of this version aside");
            std::fs::rename(target, &retired)
                .map_err(|e| InstallError::io_at("Failed to move previous install aside", target, e))?;
        }
        let staged = staging.keep();
        if let Err(e) = std::fs::rename(&staged, target) {
            let _ = std::fs::remove_dir_all(&staged);
            if replacing {
                let _ = std::fs::rename(&retired, target);
            }
            return Err(InstallError::io_at("Failed to move install into place", target, e));
        }

        self.reporter.step(&pkg.name, &pkg.version, "linking");
        let linked = self.link(&pkg.name, target);
        match linked {
            Ok(links) => {
                if replacing {
                    if let Err(e) = std::fs::remove_dir_all(&retired) {
                        warn!(path = %retired.display(), error = %e, "failed to remove previous install");
                    }
                }
                Ok(links)
            }
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir_all(target) {
                    warn!(target = %target.display(), error = %cleanup, "failed to remove partial install");
                }
                if replacing {
                    let _ = std::fs::rename(&retired, target);
                }
                Err(e)
            }
        }
    }

    fn link(&self, name: &PackageName, target: &Path) -> Result<Vec<LinkRecord>, InstallError> {
        let bin_dir = self.layout.bin_dir();
        std::fs::create_dir_all(&bin_dir)?;
        let links = link_executables(
            &Layout::libexec(target).join("bin"),
            &self.layout.package_dir(name),
            &DirLinkRegistry::new(bin_dir),
        )?;
        info!(count = links.len(), "linked executables");
        Ok(links)
    }

    fn report_adaptation(&self, report: &AdaptReport) {
        if let Some(fallback) = &report.fallback {
            match &fallback.helper_link {
                Some(link) => self.reporter.info(&format!(
                    "Replaced {} vendored fallback file(s) with {}",
                    fallback.removed,
                    link.display()
                )),
                None => self.reporter.info(&format!(
                    "Removed {} vendored fallback file(s)",
                    fallback.removed
                )),
            }
        }
        for thinned in &report.thinned {
            self.reporter.info(&format!(
                "Thinned {} to {}",
                thinned.path.display(),
                thinned.arch
            ));
        }
    }

    /// Point `opt/<name>` at `target` with a relative link.
    fn link_opt(&self, name: &PackageName, target: &Path) -> Result<(), InstallError> {
        let opt = self.layout.opt_dir(name);
        let opt_parent = self.layout.home().join("opt");
        std::fs::create_dir_all(&opt_parent)?;

        match std::fs::symlink_metadata(&opt) {
            Ok(meta) if meta.file_type().is_symlink() => std::fs::remove_file(&opt)?,
            Ok(_) => {
                return Err(InstallError::Conflict {
                    name: format!("opt/{name}"),
                    existing: opt,
                });
            }
            Err(_) => {}
        }
        symlink_dir(&relative_path(&opt_parent, target), &opt)?;
        Ok(())
    }

    /// Run the recipe's smoke test against the linked executable.
    pub fn smoke_test(&self, recipe: &Recipe) -> Result<Vec<SmokeReport>, InstallError> {
        let Some(spec) = &recipe.test else {
            debug!("recipe has no smoke test");
            return Ok(Vec::new());
        };
        let pkg = &recipe.package;
        self.reporter.step(&pkg.name, &pkg.version, "testing");
        let executable = self.layout.bin_dir().join(recipe.test_executable());
        let reports = SmokeTest::new(spec, executable, self.smoke_timeout).run(&pkg.version)?;
        self.reporter.success(&format!("{} {} passed its smoke test", pkg.name, pkg.version));
        Ok(reports)
    }
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

/// Remove every installed version of `name`: links, opt link, Install Target.
///
/// Returns the number of versions removed.
pub fn uninstall(layout: &Layout, name: &PackageName) -> Result<usize, InstallError> {
    let versions = receipt::installed_versions(layout, name)?;
    if versions.is_empty() {
        return Err(InstallError::Validation(format!("{name} is not installed")));
    }

    let registry = DirLinkRegistry::new(layout.bin_dir());
    let active = receipt::active_target(layout, name);
    for (target, receipt) in &versions {
        if let Some(receipt) = receipt {
            let removed = unlink(&receipt.links, &registry)?;
            debug!(version = %receipt.version, removed, "removed links");
        }
        let is_active = active
            .as_deref()
            .is_some_and(|a| same_dir(a, target));
        if is_active {
            std::fs::remove_file(layout.opt_dir(name))?;
        }
        std::fs::remove_dir_all(target)
            .map_err(|e| InstallError::io_at("Failed to remove install", target, e))?;
        info!(target = %target.display(), "removed install");
    }

    let package_dir = layout.package_dir(name);
    if std::fs::read_dir(&package_dir).is_ok_and(|mut d| d.next().is_none()) {
        std::fs::remove_dir(&package_dir)?;
    }
    Ok(versions.len())
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
