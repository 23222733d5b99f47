//! npm tarball inspection.
//!
//! npm registry tarballs are gzip-compressed tar archives whose files live
//! under a top-level `package/` directory.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::InstallError;
use crate::recipe::PackageDescriptor;

/// The subset of `package.json` pour cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct NpmManifest {
    pub name: String,
    pub version: String,
    /// Either a single path or a map of command name to path.
    #[serde(default)]
    pub bin: Option<serde_json::Value>,
}

impl NpmManifest {
    /// Command names the package declares in `bin`.
    pub fn bin_names(&self) -> Vec<String> {
        match &self.bin {
            Some(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
            Some(serde_json::Value::String(_)) => {
                // A bare string means the command is named after the package
                // (without any @scope/ prefix).
                let name = self.name.rsplit('/').next().unwrap_or(&self.name);
                vec![name.to_string()]
            }
            _ => Vec::new(),
        }
    }
}

/// Read `package/package.json` out of an npm tarball.
pub fn read_manifest(archive_path: &Path) -> Result<NpmManifest> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    let gz_decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    let mut archive = tar::Archive::new(gz_decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let is_manifest = {
            let path = entry.path()?;
            let mut components = path.components();
            components.next().is_some()
                && components.as_path() == Path::new("package.json")
        };
        if !is_manifest {
            continue;
        }

        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        return serde_json::from_str(&content).context("Invalid package.json in tarball");
    }

    anyhow::bail!("No package.json found in {}", archive_path.display())
}

/// Check that a tarball really contains the release the descriptor names.
pub fn verify_tarball(archive_path: &Path, descriptor: &PackageDescriptor) -> Result<NpmManifest, InstallError> {
    let manifest = read_manifest(archive_path)
        .map_err(|e| InstallError::Validation(format!("{e:#}")))?;

    if descriptor.name != manifest.name.as_str() {
        return Err(InstallError::Validation(format!(
            "tarball contains package '{}', expected '{}'",
            manifest.name, descriptor.name
        )));
    }
    if descriptor.version != manifest.version.as_str() {
        return Err(InstallError::Validation(format!(
            "tarball contains version {}, expected {}",
            manifest.version, descriptor.version
        )));
    }
    Ok(manifest)
}
