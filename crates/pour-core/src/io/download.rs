//! Archive fetching with streaming SHA256 verification.
//!
//! Verified archives are cached under `<cache>/<sha256>--<filename>`, so a
//! reinstall of the same release never touches the network.

use std::io::Read;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::Reporter;
use crate::paths::filename_from_url;
use crate::recipe::PackageDescriptor;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Unsupported source URL: {0}")]
    UnsupportedUrl(String),
}

/// Where a tarball comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Remote(String),
    Local(PathBuf),
}

impl SourceLocation {
    pub fn parse(url: &str) -> Result<Self, DownloadError> {
        if url.starts_with("https://") || url.starts_with("http://") {
            Ok(Self::Remote(url.to_string()))
        } else if let Some(path) = url.strip_prefix("file://") {
            Ok(Self::Local(PathBuf::from(path)))
        } else if url.contains("://") {
            Err(DownloadError::UnsupportedUrl(url.to_string()))
        } else {
            Ok(Self::Local(PathBuf::from(url)))
        }
    }
}

/// Fetch the descriptor's tarball into `cache_dir`, verifying its checksum.
///
/// Returns the path of the verified archive.
pub async fn fetch<R: Reporter + ?Sized>(
    client: &Client,
    descriptor: &PackageDescriptor,
    cache_dir: &Path,
    reporter: &R,
) -> Result<PathBuf, DownloadError> {
    let expected = descriptor.sha256.as_str();
    let mut file_name = filename_from_url(&descriptor.url).to_string();
    if file_name.is_empty() {
        file_name = format!("{}-{}.tgz", descriptor.name, descriptor.version);
    }

    tokio::fs::create_dir_all(cache_dir).await?;
    let dest = cache_dir.join(format!("{expected}--{file_name}"));

    if dest.exists() {
        let cached = dest.clone();
        let actual = tokio::task::spawn_blocking(move || hash_file(&cached))
            .await
            .map_err(std::io::Error::other)??;
        if descriptor.sha256.matches(&actual) {
            debug!(path = %dest.display(), "using cached archive");
            reporter.info(&format!("Using cached {file_name}"));
            return Ok(dest);
        }
        tokio::fs::remove_file(&dest).await?;
    }

    // Write to a sibling first so an interrupted fetch never looks cached.
    let partial = cache_dir.join(format!("{expected}--{file_name}.part"));

    match SourceLocation::parse(&descriptor.url)? {
        SourceLocation::Remote(url) => {
            info!(%url, "downloading");
            download_and_verify(client, descriptor, &url, &partial, reporter).await?;
        }
        SourceLocation::Local(path) => {
            info!(path = %path.display(), "copying local archive");
            copy_and_verify(&path, &partial, expected).await?;
        }
    }

    tokio::fs::rename(&partial, &dest).await?;
    Ok(dest)
}

/// Perform a sequential download with streaming verification.
async fn download_and_verify<R: Reporter + ?Sized>(
    client: &Client,
    descriptor: &PackageDescriptor,
    url: &str,
    dest: &Path,
    reporter: &R,
) -> Result<String, DownloadError> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .send()
        .await?
        .error_for_status()?;

    let total_size = response.content_length();
    reporter.downloading(&descriptor.name, &descriptor.version, 0, total_size);

    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
        reporter.downloading(&descriptor.name, &descriptor.version, downloaded, total_size);
    }

    file.flush().await?;
    let actual_hash = hex::encode(hasher.finalize());

    if !descriptor.sha256.matches(&actual_hash) {
        reporter.failed(&descriptor.name, &descriptor.version, "hash mismatch");
        tokio::fs::remove_file(dest).await.ok();
        return Err(DownloadError::HashMismatch {
            expected: descriptor.sha256.to_string(),
            actual: actual_hash,
        });
    }

    Ok(actual_hash)
}

async fn copy_and_verify(src: &Path, dest: &Path, expected: &str) -> Result<String, DownloadError> {
    tokio::fs::copy(src, dest).await?;

    let to_hash = dest.to_path_buf();
    let actual_hash = tokio::task::spawn_blocking(move || hash_file(&to_hash))
        .await
        .map_err(std::io::Error::other)??;

    if !actual_hash.eq_ignore_ascii_case(expected) {
        tokio::fs::remove_file(dest).await.ok();
        return Err(DownloadError::HashMismatch {
            expected: expected.to_string(),
            actual: actual_hash,
        });
    }
    Ok(actual_hash)
}

/// Hex SHA256 of a file on disk.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
