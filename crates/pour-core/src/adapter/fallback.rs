//! Vendored fallback replacement.
//!
//! Some npm dependencies ship pre-built helper binaries for every OS (clipboardy
//! carries `xsel` for Linux and a clipboard tool for Windows). Those are thrown
//! away and, where the host needs one, replaced with a link to the binary a
//! sibling package built on this machine.
//!
//! The replacement directory is built next to the original and swapped in with
//! renames, so a failure part way leaves the vendored directory as it was.

use std::fs;
use std::path::{Path, PathBuf};

use pour_schema::Os;
use tracing::{debug, info};

use crate::adapter::PlatformClass;
use crate::error::InstallError;
use crate::paths::{relative_path, Layout};

/// What the fallback pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackOutcome {
    /// The fallback directory that was reset.
    pub dir: PathBuf,
    /// Number of vendored files discarded.
    pub removed: usize,
    /// The helper link created, if any.
    pub helper_link: Option<PathBuf>,
}

/// Locate the vendored fallback directory under `prefix`.
pub fn locate(prefix: &Path, relative: &Path) -> Result<PathBuf, InstallError> {
    let dir = prefix.join(relative);
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(InstallError::PathNotFound { path: dir })
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

fn count_files(dir: &Path) -> usize {
    walkdir::WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| !e.file_type().is_dir())
        .count()
}

/// Discard the contents of `dir` and repopulate it for `class`.
pub fn replace_fallbacks(
    dir: &Path,
    class: &PlatformClass,
    os: &Os,
    layout: &Layout,
) -> Result<FallbackOutcome, InstallError> {
    if !dir.is_dir() {
        return Err(InstallError::PathNotFound {
            path: dir.to_path_buf(),
        });
    }
    let parent = dir
        .parent()
        .ok_or_else(|| InstallError::PathNotFound {
            path: dir.to_path_buf(),
        })?;
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "fallbacks".to_string());

    let removed = count_files(dir);
    let staging = tempfile::Builder::new()
        .prefix(&format!(".{name}-staging-"))
        .tempdir_in(parent)
        .map_err(|e| InstallError::io_at("Failed to create staging directory", parent, e))?;
    let original_perms = fs::metadata(dir)?.permissions();
    fs::set_permissions(staging.path(), original_perms)?;

    let helper_link = match class {
        PlatformClass::NeedsHelper(helper) => {
            let source = layout.opt_bin(&helper.package, &helper.binary);
            if !is_executable(&source) {
                return Err(InstallError::DependencyResolution {
                    package: helper.package.clone(),
                    detail: format!(
                        "{} is not an installed executable; install '{}' first",
                        source.display(),
                        helper.package
                    ),
                });
            }

            let os_dir = dir.join(os.as_str());
            let staged_os_dir = staging.path().join(os.as_str());
            fs::create_dir_all(&staged_os_dir)?;
            // Relative to where the link will live after the swap.
            let target = relative_path(&os_dir, &source);
            symlink(&target, &staged_os_dir.join(&helper.binary))
                .map_err(|e| InstallError::io_at("Failed to link helper", &staged_os_dir, e))?;
            debug!(link = %os_dir.join(&helper.binary).display(), target = %target.display(), "staged helper link");
            Some(os_dir.join(&helper.binary))
        }
        PlatformClass::NativeFacilities => None,
        PlatformClass::Unsupported => {
            debug!(os = %os, "no fallback policy for this OS, leaving directory empty");
            None
        }
    };

    swap_in(staging.keep(), dir, parent, &name)?;
    info!(dir = %dir.display(), removed, "replaced vendored fallbacks");

    Ok(FallbackOutcome {
        dir: dir.to_path_buf(),
        removed,
        helper_link,
    })
}

/// Move `dir` aside, rename `staged` into its place, then delete the old one.
fn swap_in(staged: PathBuf, dir: &Path, parent: &Path, name: &str) -> Result<(), InstallError> {
    let retired = parent.join(format!(".{name}-retired"));
    if retired.exists() {
        fs::remove_dir_all(&retired)?;
    }

    if let Err(e) = fs::rename(dir, &retired) {
        let _ = fs::remove_dir_all(&staged);
        return Err(InstallError::io_at("Failed to move fallbacks aside", dir, e));
    }
    if let Err(e) = fs::rename(&staged, dir) {
        let _ = fs::rename(&retired, dir);
        let _ = fs::remove_dir_all(&staged);
        return Err(InstallError::io_at("Failed to swap in fallbacks", dir, e));
    }
    fs::remove_dir_all(&retired)
        .map_err(|e| InstallError::io_at("Failed to remove old fallbacks", &retired, e))
}
