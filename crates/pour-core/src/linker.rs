//! Binary linker.
//!
//! Exposes an Install Target's executables on the command path, one symlink
//! per entry of `libexec/bin`. The command path is global state shared with
//! every other package, so all access goes through a [`LinkRegistry`] and
//! names are treated as write-once: a name is only ever (re)written when it
//! is free or already belongs to the same package.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::InstallError;

/// What currently occupies a name on the command path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEntry {
    /// A symlink and the (unresolved) target it points to.
    Symlink(PathBuf),
    /// Something that is not a symlink: a copied binary, a directory.
    Other(PathBuf),
}

/// Access to the command-path namespace.
pub trait LinkRegistry {
    fn lookup(&self, name: &str) -> io::Result<Option<LinkEntry>>;
    fn create(&self, name: &str, target: &Path) -> io::Result<()>;
    fn remove(&self, name: &str) -> io::Result<()>;
}

/// One link of a package's Link Set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub name: String,
    pub target: PathBuf,
}

/// A real command-path directory such as `~/.pour/bin`.
#[derive(Debug, Clone)]
pub struct DirLinkRegistry {
    dir: PathBuf,
}

impl DirLinkRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl LinkRegistry for DirLinkRegistry {
    fn lookup(&self, name: &str) -> io::Result<Option<LinkEntry>> {
        let path = self.dir.join(name);
        match path.symlink_metadata() {
            Ok(meta) if meta.is_symlink() => Ok(Some(LinkEntry::Symlink(std::fs::read_link(&path)?))),
            Ok(_) => Ok(Some(LinkEntry::Other(path))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create(&self, name: &str, target: &Path) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, self.dir.join(name))
        }
        #[cfg(not(unix))]
        {
            let _ = (name, target);
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "symlinked command paths require a unix host",
            ))
        }
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        std::fs::remove_file(self.dir.join(name))
    }
}

/// In-memory registry for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLinkRegistry {
    entries: Mutex<BTreeMap<String, LinkEntry>>,
}

impl MemoryLinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a name, e.g. with a link owned by another package.
    pub fn insert(&self, name: &str, entry: LinkEntry) {
        self.lock().insert(name.to_string(), entry);
    }

    pub fn snapshot(&self) -> BTreeMap<String, LinkEntry> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, LinkEntry>> {
        // A poisoned map is still a valid map; keep using it.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl LinkRegistry for MemoryLinkRegistry {
    fn lookup(&self, name: &str) -> io::Result<Option<LinkEntry>> {
        Ok(self.lock().get(name).cloned())
    }

    fn create(&self, name: &str, target: &Path) -> io::Result<()> {
        let mut entries = self.lock();
        if entries.contains_key(name) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, name.to_string()));
        }
        entries.insert(name.to_string(), LinkEntry::Symlink(target.to_path_buf()));
        Ok(())
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        self.lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkAction {
    Create,
    Replace,
    Keep,
}

/// Executables found in `bin_dir`, sorted by name.
pub fn list_executables(bin_dir: &Path) -> Result<Vec<String>, InstallError> {
    let entries = match std::fs::read_dir(bin_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(InstallError::PathNotFound {
                path: bin_dir.to_path_buf(),
            });
        }
        Err(e) => return Err(InstallError::io_at("Failed to read bin directory", bin_dir, e)),
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| {
            e.file_type()
                .map(|t| t.is_file() || t.is_symlink())
                .unwrap_or(false)
        })
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    Ok(names)
}

/// Link every executable in `bin_dir` into the registry.
///
/// `owner_root` is the directory holding all versions of this package
/// (`cellar/<name>`); links pointing anywhere under it belong to us and are
/// replaced, which is how an upgrade moves the Link Set to a new version.
/// Identical links are left alone, so relinking is idempotent.
///
/// All names are checked before anything is written: a conflict leaves the
/// command path exactly as it was.
pub fn link_executables<L: LinkRegistry + ?Sized>(
    bin_dir: &Path,
    owner_root: &Path,
    registry: &L,
) -> Result<Vec<LinkRecord>, InstallError> {
    let mut plan = Vec::new();

    for name in list_executables(bin_dir)? {
        let target = bin_dir.join(&name);
        let existing = registry
            .lookup(&name)
            .map_err(|e| InstallError::context("Failed to inspect command path", e))?;

        let action = match existing {
            None => LinkAction::Create,
            Some(LinkEntry::Symlink(current)) if current == target => LinkAction::Keep,
            Some(LinkEntry::Symlink(current)) if current.starts_with(owner_root) => {
                LinkAction::Replace
            }
            Some(LinkEntry::Symlink(existing) | LinkEntry::Other(existing)) => {
                return Err(InstallError::Conflict { name, existing });
            }
        };
        plan.push((name, target, action));
    }

    let mut records = Vec::with_capacity(plan.len());
    for (name, target, action) in plan {
        match action {
            LinkAction::Keep => debug!(%name, "link already in place"),
            LinkAction::Replace => {
                debug!(%name, target = %target.display(), "relinking");
                registry
                    .remove(&name)
                    .and_then(|()| registry.create(&name, &target))
                    .map_err(|e| InstallError::context("Failed to replace link", e))?;
            }
            LinkAction::Create => {
                debug!(%name, target = %target.display(), "linking");
                registry
                    .create(&name, &target)
                    .map_err(|e| InstallError::context("Failed to create link", e))?;
            }
        }
        records.push(LinkRecord { name, target });
    }

    Ok(records)
}

/// Remove the links of a recorded Link Set.
///
/// Only links still pointing at their recorded target are removed; anything
/// that has since been replaced is someone else's and is left alone.
/// Returns the number of links removed.
pub fn unlink<L: LinkRegistry + ?Sized>(
    records: &[LinkRecord],
    registry: &L,
) -> Result<usize, InstallError> {
    let mut removed = 0;
    for record in records {
        match registry
            .lookup(&record.name)
            .map_err(|e| InstallError::context("Failed to inspect command path", e))?
        {
            Some(LinkEntry::Symlink(current)) if current == record.target => {
                registry
                    .remove(&record.name)
                    .map_err(|e| InstallError::context("Failed to remove link", e))?;
                removed += 1;
            }
            Some(_) => warn!(name = %record.name, "link no longer ours, leaving it"),
            None => debug!(name = %record.name, "link already gone"),
        }
    }
    Ok(removed)
}
