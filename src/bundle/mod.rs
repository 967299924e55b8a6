//! Splitting a universal plugin bundle into per-platform bundles.
//!
//! A universal bundle is a gzip-compressed tar containing binaries for
//! several target platforms plus a `plugin.json` manifest declaring them.
//! Splitting unpacks the bundle once per declared platform, drops every
//! other platform's executable, re-packs the tree, and then re-opens the
//! produced archive to prove it contains exactly the expected binary.

use crate::error::{BundleError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use walkdir::WalkDir;

/// File name of the plugin manifest inside the universal bundle.
const MANIFEST_NAME: &str = "plugin.json";

/// One per-platform bundle produced by a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformBundle {
    /// Target platform key, e.g. `linux-amd64`
    pub platform: String,
    /// Basename of the platform binary the bundle carries
    pub binary: String,
    /// Path of the produced `.tar.gz`
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    server: Option<ManifestServer>,
}

#[derive(Debug, Deserialize)]
struct ManifestServer {
    #[serde(default)]
    executables: BTreeMap<String, String>,
}

/// Read the manifest of a universal bundle and return its declared
/// platform → executable-path mappings.
///
/// Zero declared executables is an error: there is nothing to split.
pub fn manifest_executables(archive_path: &Path) -> Result<BTreeMap<String, String>> {
    let file = open_archive(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in read_entries(&mut archive, archive_path)? {
        let mut entry = entry.map_err(|e| invalid(archive_path, &e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let is_manifest = entry
            .path()
            .map_err(|e| invalid(archive_path, &e))?
            .file_name()
            .is_some_and(|name| name == MANIFEST_NAME);
        if !is_manifest {
            continue;
        }

        let mut raw = String::new();
        entry
            .read_to_string(&mut raw)
            .map_err(|e| invalid(archive_path, &e))?;
        let manifest: Manifest = serde_json::from_str(&raw)?;

        let executables = manifest
            .server
            .map(|server| server.executables)
            .unwrap_or_default();
        if executables.is_empty() {
            return Err(BundleError::NoExecutables {
                archive: archive_path.to_path_buf(),
            }
            .into());
        }
        return Ok(executables);
    }

    Err(BundleError::MissingManifest {
        archive: archive_path.to_path_buf(),
    }
    .into())
}

/// Split `universal` into one bundle per platform its manifest declares.
///
/// Each produced archive is named `<repo>-<tag>-<platform>.tar.gz` and is
/// re-opened afterwards to confirm it contains exactly the expected
/// platform binary. Unpack scratch directories live under `work_dir` and
/// are removed after each platform, success or not.
pub fn split_universal_bundle(
    universal: &Path,
    repo: &str,
    tag: &str,
    work_dir: &Path,
) -> Result<Vec<PlatformBundle>> {
    let executables = manifest_executables(universal)?;
    let declared: BTreeSet<String> = executables
        .values()
        .filter_map(|path| basename(path))
        .collect();

    let mut bundles = Vec::with_capacity(executables.len());
    for (platform, exe_path) in &executables {
        let expected = basename(exe_path).ok_or_else(|| BundleError::InvalidArchive {
            archive: universal.to_path_buf(),
            reason: format!("manifest declares unusable executable path '{exe_path}'"),
        })?;

        let scratch = tempfile::Builder::new()
            .prefix(&format!("unpack-{platform}-"))
            .tempdir_in(work_dir)?;

        let file = open_archive(universal)?;
        let mut archive = Archive::new(GzDecoder::new(file));
        archive
            .unpack(scratch.path())
            .map_err(|e| invalid(universal, &e))?;

        // Drop every other platform's executable before re-packing.
        for (other_platform, other_path) in &executables {
            if other_platform == platform {
                continue;
            }
            let full = scratch.path().join(other_path);
            if full.exists() {
                std::fs::remove_file(&full)?;
            }
        }

        let bundle_path = work_dir.join(format!("{repo}-{tag}-{platform}.tar.gz"));
        pack_tree(scratch.path(), &bundle_path)?;

        let found = declared_binaries_in(&bundle_path, &declared)?;
        if found.len() != 1 || found[0] != expected {
            return Err(BundleError::WrongContents {
                archive: bundle_path,
                expected,
                found,
            }
            .into());
        }

        debug!("produced platform bundle {}", bundle_path.display());
        bundles.push(PlatformBundle {
            platform: platform.clone(),
            binary: expected,
            path: bundle_path,
        });
    }

    info!(
        "split {} into {} platform bundle(s)",
        universal.display(),
        bundles.len()
    );
    Ok(bundles)
}

/// Basenames of all regular files inside a gzip-compressed tar.
pub fn archive_file_names(archive_path: &Path) -> Result<Vec<String>> {
    let file = open_archive(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let mut names = Vec::new();
    for entry in read_entries(&mut archive, archive_path)? {
        let entry = entry.map_err(|e| invalid(archive_path, &e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        if let Some(name) = entry
            .path()
            .map_err(|e| invalid(archive_path, &e))?
            .file_name()
            .and_then(|name| name.to_str())
        {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Basenames of regular files whose name contains `needle`.
pub fn archive_contains(archive_path: &Path, needle: &str) -> Result<Vec<String>> {
    Ok(archive_file_names(archive_path)?
        .into_iter()
        .filter(|name| name.contains(needle))
        .collect())
}

/// Which of the declared executable basenames a bundle actually carries.
fn declared_binaries_in(bundle: &Path, declared: &BTreeSet<String>) -> Result<Vec<String>> {
    Ok(archive_file_names(bundle)?
        .into_iter()
        .filter(|name| declared.contains(name))
        .collect())
}

/// Re-pack a directory tree into a gzip-compressed tar, preserving
/// relative paths and file modes.
fn pack_tree(root: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| BundleError::InvalidArchive {
            archive: dest.to_path_buf(),
            reason: e.to_string(),
        })?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| BundleError::InvalidArchive {
                archive: dest.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_path_buf();

        if entry.file_type().is_dir() {
            builder.append_dir(&rel, entry.path())?;
        } else if entry.file_type().is_file() {
            builder.append_path_with_name(entry.path(), &rel)?;
        }
    }

    builder.into_inner()?.finish()?;
    Ok(())
}

fn open_archive(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| invalid(path, &e).into())
}

fn read_entries<'a, R: Read>(
    archive: &'a mut Archive<R>,
    path: &Path,
) -> Result<tar::Entries<'a, R>> {
    archive.entries().map_err(|e| invalid(path, &e).into())
}

fn invalid(path: &Path, err: &dyn std::fmt::Display) -> BundleError {
    BundleError::InvalidArchive {
        archive: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn basename(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
}
