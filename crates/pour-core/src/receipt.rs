//! Install receipts.
//!
//! Every Install Target carries a `.pour-receipt.json` describing what was
//! installed and which links were created for it. Uninstall and `pour list`
//! work from receipts only.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pour_schema::{HostPlatform, PackageName, Version};
use serde::{Deserialize, Serialize};

use crate::error::InstallError;
use crate::linker::LinkRecord;
use crate::paths::Layout;

pub const RECEIPT_FILE: &str = ".pour-receipt.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: PackageName,
    pub version: Version,
    pub sha256: String,
    pub host: HostPlatform,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
    pub installed_at: DateTime<Utc>,
}

impl InstallReceipt {
    pub fn path(install_target: &Path) -> PathBuf {
        install_target.join(RECEIPT_FILE)
    }

    pub fn write(&self, install_target: &Path) -> Result<(), InstallError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| InstallError::context("Failed to serialize receipt", e))?;
        std::fs::write(Self::path(install_target), content)?;
        Ok(())
    }

    /// Read the receipt of an Install Target; `None` if it has none.
    pub fn read(install_target: &Path) -> Result<Option<Self>, InstallError> {
        let path = Self::path(install_target);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(InstallError::io_at("Failed to read receipt", &path, e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| InstallError::context("Corrupt install receipt", format!("{}: {e}", path.display())))
    }
}

/// The Install Target `<home>/opt/<name>` points at, if any.
pub fn active_target(layout: &Layout, name: &str) -> Option<PathBuf> {
    let opt = layout.opt_dir(name);
    let link = std::fs::read_link(&opt).ok()?;
    let target = match opt.parent() {
        Some(parent) if link.is_relative() => parent.join(link),
        _ => link,
    };
    target.is_dir().then_some(target)
}

/// Receipt of the active version of `name`.
pub fn active_receipt(layout: &Layout, name: &str) -> Result<Option<InstallReceipt>, InstallError> {
    match active_target(layout, name) {
        Some(target) => InstallReceipt::read(&target),
        None => Ok(None),
    }
}

/// Every Install Target of `name`, with its receipt if it has one.
pub fn installed_versions(
    layout: &Layout,
    name: &PackageName,
) -> Result<Vec<(PathBuf, Option<InstallReceipt>)>, InstallError> {
    let dir = layout.package_dir(name);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(InstallError::io_at("Failed to read cellar", &dir, e)),
    };

    let mut versions = Vec::new();
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        // staging and retired trees of an install in progress
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if path.is_dir() {
            let receipt = InstallReceipt::read(&path)?;
            versions.push((path, receipt));
        }
    }
    versions.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(versions)
}

/// Receipts of everything in the cellar, sorted by name and version.
pub fn list_installed(layout: &Layout) -> Result<Vec<InstallReceipt>, InstallError> {
    let cellar = layout.cellar();
    let Ok(packages) = std::fs::read_dir(&cellar) else {
        return Ok(Vec::new());
    };

    let mut receipts = Vec::new();
    for package in packages.filter_map(Result::ok) {
        let name = PackageName::from(package.file_name().to_string_lossy().as_ref());
        receipts.extend(
            installed_versions(layout, &name)?
                .into_iter()
                .filter_map(|(_, receipt)| receipt),
        );
    }
    receipts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
    Ok(receipts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pour_schema::{Arch, Os};

    fn receipt(name: &str, version: &str) -> InstallReceipt {
        InstallReceipt {
            name: PackageName::new(name),
            version: Version::new(version),
            sha256: "ab".repeat(32),
            host: HostPlatform::new(Os::Linux, Arch::X86_64),
            links: vec![LinkRecord {
                name: name.to_string(),
                target: PathBuf::from(format!("/h/cellar/{name}/{version}/libexec/bin/{name}")),
            }],
            installed_at: Utc::now(),
        }
    }

    #[test]
    fn test_write_and_read() {
        let tmp = tempfile::tempdir().unwrap();
        let r = receipt("httpyac", "6.3.4");
        r.write(tmp.path()).unwrap();
        assert_eq!(InstallReceipt::read(tmp.path()).unwrap(), Some(r));
    }

    #[test]
    fn test_missing_receipt_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(InstallReceipt::read(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_receipt_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(RECEIPT_FILE), "{not json").unwrap();
        assert!(InstallReceipt::read(tmp.path()).is_err());
    }

    #[test]
    fn test_list_installed_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        for (name, version) in [("httpyac", "6.3.4"), ("httpyac", "6.10.0"), ("aaa", "1.0.0")] {
            let target = layout.install_target(&PackageName::new(name), &Version::new(version));
            std::fs::create_dir_all(&target).unwrap();
            receipt(name, version).write(&target).unwrap();
        }
        // A directory without a receipt is not listed.
        std::fs::create_dir_all(layout.cellar().join("stray/0.1.0")).unwrap();

        let listed: Vec<_> = list_installed(&layout)
            .unwrap()
            .into_iter()
            .map(|r| format!("{}@{}", r.name, r.version))
            .collect();
        assert_eq!(listed, vec!["aaa@1.0.0", "httpyac@6.3.4", "httpyac@6.10.0"]);
    }

    #[test]
    fn test_staging_trees_are_not_versions() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let name = PackageName::new("httpyac");
        let target = layout.install_target(&name, &Version::new("6.3.4"));
        std::fs::create_dir_all(&target).unwrap();
        receipt("httpyac", "6.3.4").write(&target).unwrap();
        std::fs::create_dir_all(layout.package_dir(&name).join(".6.3.4-stagingAbc123")).unwrap();

        let versions = installed_versions(&layout, &name).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].0, target);
    }

    #[cfg(unix)]
    #[test]
    fn test_active_receipt_follows_opt_link() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let target = layout.install_target(&PackageName::new("httpyac"), &Version::new("6.3.4"));
        std::fs::create_dir_all(&target).unwrap();
        receipt("httpyac", "6.3.4").write(&target).unwrap();
        std::fs::create_dir_all(tmp.path().join("opt")).unwrap();
        std::os::unix::fs::symlink("../cellar/httpyac/6.3.4", layout.opt_dir("httpyac")).unwrap();

        let active = active_receipt(&layout, "httpyac").unwrap().unwrap();
        assert_eq!(active.version, "6.3.4");
        assert!(active_receipt(&layout, "xsel").unwrap().is_none());
    }
}
