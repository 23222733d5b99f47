//! Universal (fat) Mach-O handling.
//!
//! A fat file is a big-endian header followed by a table of architecture
//! entries, each pointing at a complete thin Mach-O image elsewhere in the
//! file:
//!
//! ```text
//! fat_header   { magic: u32, nfat_arch: u32 }
//! fat_arch     { cputype: u32, cpusubtype: u32, offset: u32, size: u32, align: u32 }
//! fat_arch_64  { cputype: u32, cpusubtype: u32, offset: u64, size: u64, align: u32, reserved: u32 }
//! ```
//!
//! Thinning copies the one slice matching the host out to a sibling temp file
//! and renames it over the original.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use pour_schema::Arch;
use tracing::{debug, info};

use crate::error::InstallError;

const FAT_MAGIC: u32 = 0xcafe_babe;
const FAT_MAGIC_64: u32 = 0xcafe_babf;

/// Java class files share `0xcafebabe`; their second word is the class file
/// version (>= 45), while real fat binaries carry a handful of slices.
const MAX_FAT_ARCHES: u32 = 30;

const CPU_SUBTYPE_MASK: u32 = 0xff00_0000;

/// A universal binary slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatSlice {
    pub arch: Arch,
    pub cpu_type: u32,
    pub cpu_subtype: u32,
    pub offset: u64,
    pub size: u64,
}

/// The parsed header of a universal binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatHeader {
    pub is_64: bool,
    pub slices: Vec<FatSlice>,
}

impl FatHeader {
    pub fn arches(&self) -> Vec<Arch> {
        self.slices.iter().map(|s| s.arch).collect()
    }

    /// The slice to keep for `arch`, preferring the generic subtype.
    pub fn select(&self, arch: Arch) -> Option<&FatSlice> {
        let cpu_type = arch.macho_cpu_type()?;
        let generic = arch.macho_generic_subtype();
        let mut candidates = self.slices.iter().filter(|s| s.cpu_type == cpu_type);
        let first = candidates.clone().next()?;
        Some(
            candidates
                .find(|s| Some(s.cpu_subtype & !CPU_SUBTYPE_MASK) == generic)
                .unwrap_or(first),
        )
    }
}

/// A binary that was reduced to one slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinnedBinary {
    pub path: PathBuf,
    pub arch: Arch,
    pub size_before: u64,
    pub size_after: u64,
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn be_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}

fn malformed(path: &Path, reason: impl Into<String>) -> InstallError {
    InstallError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Read the fat header of `path`.
///
/// Returns `Ok(None)` for anything that is not a universal binary (thin
/// Mach-O, ELF, scripts, Java classes, short files).
pub fn read_fat_header(path: &Path) -> Result<Option<FatHeader>, InstallError> {
    let mut file =
        File::open(path).map_err(|e| InstallError::io_at("Failed to open binary", path, e))?;
    let file_len = file
        .metadata()
        .map_err(|e| InstallError::io_at("Failed to stat binary", path, e))?
        .len();

    let mut header = [0u8; 8];
    if file.read_exact(&mut header).is_err() {
        return Ok(None);
    }

    let is_64 = match be_u32(&header[0..4]) {
        FAT_MAGIC => false,
        FAT_MAGIC_64 => true,
        _ => return Ok(None),
    };
    let nfat_arch = be_u32(&header[4..8]);
    if nfat_arch > MAX_FAT_ARCHES {
        return Ok(None);
    }
    if nfat_arch == 0 {
        return Err(malformed(path, "universal header declares no slices"));
    }

    let entry_size = if is_64 { 32 } else { 20 };
    let mut table = vec![0u8; entry_size * nfat_arch as usize];
    file.read_exact(&mut table)
        .map_err(|_| malformed(path, "truncated universal header"))?;

    let mut slices = Vec::with_capacity(nfat_arch as usize);
    for entry in table.chunks_exact(entry_size) {
        let cpu_type = be_u32(&entry[0..4]);
        let cpu_subtype = be_u32(&entry[4..8]);
        let (offset, size) = if is_64 {
            (be_u64(&entry[8..16]), be_u64(&entry[16..24]))
        } else {
            (u64::from(be_u32(&entry[8..12])), u64::from(be_u32(&entry[12..16])))
        };

        let in_bounds = offset
            .checked_add(size)
            .is_some_and(|end| end <= file_len && size > 0);
        if !in_bounds {
            return Err(malformed(
                path,
                format!("slice at offset {offset} (size {size}) lies outside the file"),
            ));
        }

        slices.push(FatSlice {
            arch: Arch::from_macho_cpu_type(cpu_type),
            cpu_type,
            cpu_subtype,
            offset,
            size,
        });
    }

    Ok(Some(FatHeader { is_64, slices }))
}

/// Whether the bytes at the start of a slice look like something a fat file
/// may contain: a thin Mach-O image or a static library archive.
fn is_thin_image(prefix: &[u8]) -> bool {
    matches!(
        prefix,
        [0xfe, 0xed, 0xfa, 0xce, ..]
            | [0xfe, 0xed, 0xfa, 0xcf, ..]
            | [0xcf, 0xfa, 0xed, 0xfe, ..]
            | [0xce, 0xfa, 0xed, 0xfe, ..]
    ) || prefix.starts_with(b"!<arch>\n")
}

fn check_slice(path: &Path, slice: &FatSlice) -> Result<(), InstallError> {
    let mut file =
        File::open(path).map_err(|e| InstallError::io_at("Failed to open binary", path, e))?;
    let mut prefix = [0u8; 8];
    let want = slice.size.min(8) as usize;
    file.seek(SeekFrom::Start(slice.offset))
        .and_then(|_| file.read_exact(&mut prefix[..want]))
        .map_err(|e| InstallError::io_at("Failed to read slice", path, e))?;

    if is_thin_image(&prefix[..want]) {
        Ok(())
    } else {
        Err(malformed(
            path,
            format!("{} slice is not a Mach-O image", slice.arch),
        ))
    }
}

/// Replace `path` with its `slice`, keeping the original permissions.
///
/// The slice is written to a temp file in the same directory and renamed over
/// the original, so the path never holds a partial binary.
pub fn thin_in_place(path: &Path, slice: &FatSlice) -> Result<ThinnedBinary, InstallError> {
    let dir = path
        .parent()
        .ok_or_else(|| malformed(path, "binary has no parent directory"))?;
    let meta = std::fs::metadata(path)
        .map_err(|e| InstallError::io_at("Failed to stat binary", path, e))?;

    let mut src =
        File::open(path).map_err(|e| InstallError::io_at("Failed to open binary", path, e))?;
    src.seek(SeekFrom::Start(slice.offset))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".pour-thin-")
        .tempfile_in(dir)
        .map_err(|e| InstallError::io_at("Failed to create temp file", dir, e))?;
    let copied = io::copy(&mut src.take(slice.size), tmp.as_file_mut())?;
    if copied != slice.size {
        return Err(malformed(path, "slice ended early"));
    }
    tmp.as_file().sync_all()?;
    std::fs::set_permissions(tmp.path(), meta.permissions())?;

    tmp.persist(path)
        .map_err(|e| InstallError::io_at("Failed to replace binary", path, e.error))?;

    Ok(ThinnedBinary {
        path: path.to_path_buf(),
        arch: slice.arch,
        size_before: meta.len(),
        size_after: slice.size,
    })
}

/// Universal binaries under `root`. Symlinks are not followed.
pub fn find_universal_binaries(root: &Path) -> Result<Vec<(PathBuf, FatHeader)>, InstallError> {
    let mut found = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| InstallError::context("Failed to scan install tree", e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(header) = read_fat_header(entry.path())? {
            found.push((entry.into_path(), header));
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

/// Reduce every universal binary under `root` to its `arch` slice.
///
/// Every binary is matched before any is rewritten: if one has no slice for
/// `arch` the tree is left untouched.
pub fn deuniversalize(root: &Path, arch: Arch) -> Result<Vec<ThinnedBinary>, InstallError> {
    let mut plan = Vec::new();
    for (path, header) in find_universal_binaries(root)? {
        let slice = header
            .select(arch)
            .cloned()
            .ok_or_else(|| InstallError::missing_slice(&path, arch, &header.arches()))?;
        check_slice(&path, &slice)?;
        debug!(path = %path.display(), from = ?header.arches(), keep = %arch, "planned thinning");
        plan.push((path, slice));
    }

    let mut thinned = Vec::with_capacity(plan.len());
    for (path, slice) in plan {
        let result = thin_in_place(&path, &slice)?;
        info!(
            path = %path.display(),
            before = result.size_before,
            after = result.size_after,
            "replaced universal binary with native slice"
        );
        thinned.push(result);
    }
    Ok(thinned)
}
