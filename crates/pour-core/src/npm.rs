//! Dependency installation through npm.
//!
//! The package's whole dependency graph is installed into the Install
//! Target's `libexec/` prefix with a global-style layout:
//!
//! ```text
//! libexec/
//! ├── bin/<command>                     -> ../lib/node_modules/<name>/...
//! └── lib/node_modules/<name>/node_modules/...
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use pour_schema::PackageName;
use tracing::{debug, info};

use crate::error::InstallError;

/// Installs a package tarball and all of its dependencies into a prefix.
///
/// A run counts as successful only when the whole graph landed; any partial
/// result is reported as an error.
pub trait DependencyInstaller {
    fn install(
        &self,
        name: &PackageName,
        tarball: &Path,
        prefix: &Path,
        log_path: &Path,
    ) -> Result<(), InstallError>;
}

/// Runs `npm install --global --prefix <prefix> <tarball>`.
#[derive(Debug, Clone)]
pub struct NpmInstaller {
    program: PathBuf,
    cache_dir: PathBuf,
}

impl NpmInstaller {
    /// Locate `program` (a name on PATH or a path) and use `cache_dir` as npm's cache.
    pub fn locate(program: &str, cache_dir: impl Into<PathBuf>) -> Result<Self, InstallError> {
        let program = which::which(program).map_err(|e| InstallError::DependencyResolution {
            package: "node".to_string(),
            detail: format!("'{program}' not found: {e}"),
        })?;
        Ok(Self::new(program, cache_dir))
    }

    pub fn new(program: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Arguments for a global, from-source install into `prefix`.
    pub fn std_install_args(&self, prefix: &Path) -> Vec<OsString> {
        let mut cache = OsString::from("--cache=");
        cache.push(&self.cache_dir);
        let mut prefix_arg = OsString::from("--prefix=");
        prefix_arg.push(prefix);

        vec![
            "install".into(),
            "-ddd".into(),
            "--global".into(),
            "--build-from-source".into(),
            cache,
            prefix_arg,
        ]
    }
}

impl DependencyInstaller for NpmInstaller {
    fn install(
        &self,
        name: &PackageName,
        tarball: &Path,
        prefix: &Path,
        log_path: &Path,
    ) -> Result<(), InstallError> {
        std::fs::create_dir_all(prefix)?;
        std::fs::create_dir_all(&self.cache_dir)?;
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let args = self.std_install_args(prefix);
        info!(program = %self.program.display(), tarball = %tarball.display(), "running npm install");
        debug!(?args, "npm arguments");

        let log_file = std::fs::File::create(log_path)?;
        let status = Command::new(&self.program)
            .args(&args)
            .arg(tarball)
            .env("npm_config_update_notifier", "false")
            .env("npm_config_fund", "false")
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file.try_clone()?))
            .stderr(Stdio::from(log_file))
            .status()
            .map_err(|e| {
                InstallError::DependencyInstall(format!(
                    "failed to spawn {}: {e}",
                    self.program.display()
                ))
            })?;

        if !status.success() {
            let tail = read_last_lines(log_path, 20).unwrap_or_default();
            return Err(InstallError::DependencyInstall(format!(
                "npm exited with {status}\n{tail}\nFull log: {}",
                log_path.display()
            )));
        }

        // npm can exit 0 having skipped optional and failed sub-installs;
        // without the package root the tree is unusable.
        let package_root = prefix.join("lib/node_modules").join(name);
        if !package_root.is_dir() {
            return Err(InstallError::DependencyInstall(format!(
                "npm reported success but {} is missing",
                package_root.display()
            )));
        }

        Ok(())
    }
}

/// Read the last N lines from a file.
///
/// Seeks to near the end and reads a fixed-size tail buffer so large npm
/// logs (`-ddd` is verbose) are never loaded whole.
fn read_last_lines(path: &Path, n: usize) -> std::io::Result<String> {
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    const TAIL_SIZE: u64 = 16 * 1024;

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let seek_pos = file_len.saturating_sub(TAIL_SIZE);
    file.seek(SeekFrom::Start(seek_pos))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let buffer = String::from_utf8_lossy(&bytes);

    // If we seeked mid-file, skip the first (partial) line
    let content = if seek_pos > 0 {
        buffer.find('\n').map_or(&*buffer, |idx| &buffer[idx + 1..])
    } else {
        &*buffer
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_std_install_args() {
        let npm = NpmInstaller::new("/usr/bin/npm", "/h/cache/npm");
        let args = npm.std_install_args(Path::new("/h/cellar/httpyac/6.3.4/libexec"));
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec![
                "install",
                "-ddd",
                "--global",
                "--build-from-source",
                "--cache=/h/cache/npm",
                "--prefix=/h/cellar/httpyac/6.3.4/libexec",
            ]
        );
    }

    #[test]
    fn test_locate_missing_program() {
        let err = NpmInstaller::locate("definitely-not-npm-4f2a", "/tmp").unwrap_err();
        assert!(matches!(err, InstallError::DependencyResolution { .. }));
    }

    #[test]
    fn test_read_last_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("npm.log");
        let content: String = (1..=30).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&log, content).unwrap();

        let tail = read_last_lines(&log, 3).unwrap();
        assert_eq!(tail, "line 28\nline 29\nline 30");
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_install_reports_log_tail() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let fake_npm = tmp.path().join("npm");
        std::fs::write(&fake_npm, "#!/bin/sh\necho 'ERR! network unreachable' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&fake_npm, std::fs::Permissions::from_mode(0o755)).unwrap();

        let npm = NpmInstaller::new(&fake_npm, tmp.path().join("cache"));
        let err = npm
            .install(
                &PackageName::from("demo"),
                &tmp.path().join("demo.tgz"),
                &tmp.path().join("prefix"),
                &tmp.path().join("logs/npm.log"),
            )
            .unwrap_err();
        assert!(err.to_string().contains("network unreachable"));
    }

    #[cfg(unix)]
    #[test]
    fn test_success_without_package_root_is_failure() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let fake_npm = tmp.path().join("npm");
        std::fs::write(&fake_npm, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&fake_npm, std::fs::Permissions::from_mode(0o755)).unwrap();

        let npm = NpmInstaller::new(&fake_npm, tmp.path().join("cache"));
        let err = npm
            .install(
                &PackageName::from("demo"),
                &tmp.path().join("demo.tgz"),
                &tmp.path().join("prefix"),
                &tmp.path().join("npm.log"),
            )
            .unwrap_err();
        assert!(err.to_string().contains("is missing"));
    }
}
