//! On-disk layout.
//!
//! ```text
//! ~/.pour/
//! ├── bin/                      # Link Set: one symlink per exposed executable
//! ├── cellar/<name>/<version>/  # Install Target (one per installed version)
//! │   ├── libexec/              # npm prefix (bin/, lib/node_modules/...)
//! │   └── .pour-receipt.json
//! ├── opt/<name>                # -> cellar/<name>/<version> of the active install
//! ├── cache/                    # Verified downloads, npm cache
//! ├── logs/
//! └── config.toml
//! ```

use dirs::home_dir;
use std::path::{Component, Path, PathBuf};

use pour_schema::{PackageName, Version};

/// Returns the pour home directory, or None if the user's home cannot be resolved.
pub fn try_pour_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("POUR_HOME") {
        if !val.is_empty() {
            return Some(PathBuf::from(val));
        }
    }
    home_dir().map(|h| h.join(".pour"))
}

/// Every path pour reads or writes, rooted at one home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    home: PathBuf,
}

impl Layout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Layout rooted at `POUR_HOME` or `~/.pour`.
    pub fn from_env() -> anyhow::Result<Self> {
        try_pour_home()
            .map(Self::new)
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory. Set POUR_HOME."))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Command path that receives the Link Set: ~/.pour/bin
    pub fn bin_dir(&self) -> PathBuf {
        self.home.join("bin")
    }

    /// ~/.pour/cellar
    pub fn cellar(&self) -> PathBuf {
        self.home.join("cellar")
    }

    /// All installed versions of one package.
    pub fn package_dir(&self, name: &PackageName) -> PathBuf {
        self.cellar().join(name)
    }

    /// The Install Target for one version: ~/.pour/cellar/<name>/<version>
    pub fn install_target(&self, name: &PackageName, version: &Version) -> PathBuf {
        self.package_dir(name).join(version)
    }

    /// npm prefix inside an Install Target.
    pub fn libexec(install_target: &Path) -> PathBuf {
        install_target.join("libexec")
    }

    /// Stable per-package prefix: ~/.pour/opt/<name>
    pub fn opt_dir(&self, name: &str) -> PathBuf {
        self.home.join("opt").join(name)
    }

    /// An executable of a sibling package, resolved through its opt prefix.
    pub fn opt_bin(&self, package: &str, binary: &str) -> PathBuf {
        self.opt_dir(package).join("bin").join(binary)
    }

    /// Cache path: ~/.pour/cache
    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    /// npm's own download cache.
    pub fn npm_cache_dir(&self) -> PathBuf {
        self.cache_dir().join("npm")
    }

    /// Logs directory: ~/.pour/logs
    pub fn log_dir(&self) -> PathBuf {
        self.home.join("logs")
    }

    /// Generate an install log path for a package
    pub fn install_log_path(&self, name: &PackageName, version: &Version) -> PathBuf {
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        self.log_dir()
            .join(format!("install-{name}-{version}-{timestamp}.log"))
    }

    /// ~/.pour/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.home.join("config.toml")
    }
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    url.split('/').next_back().unwrap_or("")
}

/// Compute a relative path from `from_dir` to `to_path`.
///
/// Both arguments must be absolute paths. The function walks up from
/// `from_dir` to the common ancestor and then descends into `to_path`.
/// `.` and `..` components are folded lexically first; symlinks are not
/// resolved.
///
/// Example: `relative_path("/a/b/c", "/a/b/d/e")` returns `"../../d/e"`.
pub fn relative_path(from_dir: &Path, to_path: &Path) -> PathBuf {
    let from = normalize(from_dir);
    let to = normalize(to_path);
    let from_components: Vec<_> = from.components().collect();
    let to_components: Vec<_> = to.components().collect();

    let common_len = from_components
        .iter()
        .zip(to_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common_len..from_components.len() {
        result.push("..");
    }
    for part in &to_components[common_len..] {
        result.push(part);
    }
    result
}

/// Fold `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = Layout::new("/h");
        let name = PackageName::from("httpyac");
        let version = Version::from("6.3.4");
        let target = layout.install_target(&name, &version);
        assert_eq!(target, PathBuf::from("/h/cellar/httpyac/6.3.4"));
        assert_eq!(Layout::libexec(&target), target.join("libexec"));
        assert_eq!(layout.opt_bin("xsel", "xsel"), PathBuf::from("/h/opt/xsel/bin/xsel"));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://registry.npmjs.org/httpyac/-/httpyac-6.3.4.tgz"),
            "httpyac-6.3.4.tgz"
        );
        assert_eq!(filename_from_url(""), "");
    }

    #[test]
    fn test_relative_path_same_dir() {
        let result = relative_path(Path::new("/a/b/c"), Path::new("/a/b/c/file"));
        assert_eq!(result, PathBuf::from("file"));
    }

    #[test]
    fn test_relative_path_cross_dir() {
        let result = relative_path(Path::new("/a/b/lib"), Path::new("/a/b/bin/tool"));
        assert_eq!(result, PathBuf::from("../bin/tool"));
    }

    #[test]
    fn test_relative_path_into_opt() {
        let linux_dir = Path::new(
            "/h/cellar/httpyac/6.3.4/libexec/lib/node_modules/httpyac/node_modules/clipboardy/fallbacks/linux",
        );
        let result = relative_path(linux_dir, Path::new("/h/opt/xsel/bin/xsel"));
        assert_eq!(
            result,
            PathBuf::from("../../../../../../../../../../../opt/xsel/bin/xsel")
        );
        assert_eq!(
            normalize(&linux_dir.join(&result)),
            PathBuf::from("/h/opt/xsel/bin/xsel")
        );
    }

    #[test]
    fn test_relative_path_folds_dot_dot() {
        let result = relative_path(Path::new("/a/b/../c"), Path::new("/a/c/d"));
        assert_eq!(result, PathBuf::from("d"));
    }
}
