// src/package/archive.rs

//! Loading a standalone package from an archive
//!
//! Parses `.pkg.tar.zst`, `.pkg.tar.xz` and `.pkg.tar.gz` archives,
//! building a [`Package`] record from the embedded `.PKGINFO` metadata.
//! A record loaded this way has no owning database until a transaction
//! installs it.

use crate::dep::Depend;
use crate::error::{Error, Result};
use crate::package::Package;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::Archive;
use tracing::debug;
use xz2::read::XzDecoder;

/// Package compression format
enum CompressionFormat {
    Zstd,
    Xz,
    Gzip,
}

/// Detect compression format from file extension
fn detect_compression(path: &Path) -> Result<CompressionFormat> {
    let name = path.to_string_lossy();
    if name.ends_with(".pkg.tar.zst") {
        Ok(CompressionFormat::Zstd)
    } else if name.ends_with(".pkg.tar.xz") {
        Ok(CompressionFormat::Xz)
    } else if name.ends_with(".pkg.tar.gz") {
        Ok(CompressionFormat::Gzip)
    } else {
        Err(Error::InvalidPackage {
            path: name.into_owned(),
            reason: "expected .pkg.tar.zst, .pkg.tar.xz, or .pkg.tar.gz".to_string(),
        })
    }
}

/// Open and decompress the package archive
fn open_archive(path: &Path) -> Result<Archive<Box<dyn Read>>> {
    let file = File::open(path)?;

    let reader: Box<dyn Read> = match detect_compression(path)? {
        CompressionFormat::Zstd => {
            let decoder = zstd::Decoder::new(file).map_err(|e| Error::InvalidPackage {
                path: path.display().to_string(),
                reason: format!("zstd decoder: {e}"),
            })?;
            Box::new(decoder)
        }
        CompressionFormat::Xz => Box::new(XzDecoder::new(file)),
        CompressionFormat::Gzip => Box::new(GzDecoder::new(file)),
    };

    Ok(Archive::new(reader))
}

/// Load a package record from an archive on disk.
///
/// Reads `.PKGINFO` out of the archive and computes the SHA-256 of the
/// archive file itself. The record's `filename` is the archive's basename
/// and its `size` the archive length, so a later commit can report download
/// totals for it.
pub fn load(path: &Path) -> Result<Package> {
    debug!("loading package from {}", path.display());

    let mut archive = open_archive(path)?;
    let mut pkginfo = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_string_lossy() == ".PKGINFO" {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            pkginfo = Some(content);
            break;
        }
    }

    let pkginfo = pkginfo.ok_or_else(|| Error::InvalidPackage {
        path: path.display().to_string(),
        reason: "no .PKGINFO entry found".to_string(),
    })?;

    let mut pkg = parse_pkginfo(&pkginfo).map_err(|e| Error::InvalidPackage {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    pkg.filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    let meta = std::fs::metadata(path)?;
    pkg.size = meta.len();
    pkg.sha256sum = Some(file_sha256(path)?);

    debug!(
        "loaded package {} ({} dependencies)",
        pkg.fullname(),
        pkg.depends.len()
    );
    Ok(pkg)
}

/// Parse `.PKGINFO` key = value content into a bare record.
fn parse_pkginfo(content: &str) -> Result<Package> {
    let mut name = None;
    let mut version = None;
    let mut pkg = Package::new("", "");

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "pkgname" => name = Some(value.to_string()),
            "pkgver" => version = Some(value.to_string()),
            "pkgdesc" => pkg.desc = Some(value.to_string()),
            "url" => pkg.url = Some(value.to_string()),
            "arch" => pkg.arch = Some(value.to_string()),
            "packager" => pkg.packager = Some(value.to_string()),
            "builddate" => {
                pkg.builddate = value
                    .parse()
                    .map_err(|_| Error::Parse(format!("bad builddate '{value}'")))?;
            }
            "size" => {
                pkg.isize = value
                    .parse()
                    .map_err(|_| Error::Parse(format!("bad size '{value}'")))?;
            }
            "license" => pkg.licenses.push(value.to_string()),
            "group" => pkg.groups.push(value.to_string()),
            "depend" => pkg.depends.push(value.parse::<Depend>()?),
            "optdepend" => pkg.optdepends.push(value.to_string()),
            "provides" => pkg.provides.push(value.parse::<Depend>()?),
            "conflict" => pkg.conflicts.push(value.parse::<Depend>()?),
            "replaces" => pkg.replaces.push(value.parse::<Depend>()?),
            _ => {} // Ignore unknown keys
        }
    }

    pkg.name = name.ok_or_else(|| Error::Parse("package name not found in .PKGINFO".to_string()))?;
    pkg.version =
        version.ok_or_else(|| Error::Parse("package version not found in .PKGINFO".to_string()))?;
    Ok(pkg)
}

/// SHA-256 of the archive file as hexadecimal digits.
fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
