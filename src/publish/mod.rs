//! Publishing signed artifacts to the source host and the object store.

mod s3;

pub use s3::S3ObjectStore;

use crate::error::{PublishError, Result};
use crate::github::{ReleaseService, RepoId};
use async_trait::async_trait;
use log::info;
use std::path::{Path, PathBuf};

/// Key prefix every published object lands under.
pub const RELEASE_KEY_PREFIX: &str = "release/";

/// A key-addressed store used as the public distribution point.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Put a file at `key`, returning a location string.
    ///
    /// No existence check is made first; overwrite semantics belong to
    /// the destination system.
    async fn put_file(&self, key: &str, file: &Path) -> Result<String>;
}

/// Uploads artifacts to a release and to the object store.
pub struct Publisher<'a> {
    releases: &'a dyn ReleaseService,
    store: &'a dyn ObjectStore,
}

impl<'a> Publisher<'a> {
    /// Build a publisher over the two destinations.
    pub fn new(releases: &'a dyn ReleaseService, store: &'a dyn ObjectStore) -> Self {
        Self { releases, store }
    }

    /// Upload files as assets of the release, replacing same-named ones.
    ///
    /// Re-runs converge on exactly one current asset per name: an
    /// existing asset with the same basename is deleted before the new
    /// upload, never accumulated next to it.
    pub async fn upload_release_assets(
        &self,
        repo: &RepoId,
        release_id: u64,
        files: &[PathBuf],
    ) -> Result<()> {
        info!("uploading {} file(s) to the release", files.len());
        for file in files {
            let name = file_name(file)?;

            let existing = self.releases.list_assets(repo, release_id).await?;
            if let Some(previous) = existing.iter().find(|asset| asset.name == name) {
                info!("removing existing release asset {name}");
                self.releases.delete_asset(repo, previous.id).await?;
            }

            self.releases
                .upload_asset(repo, release_id, file)
                .await
                .map_err(|e| PublishError::UploadFailed {
                    asset: name.clone(),
                    reason: e.to_string(),
                })?;
        }
        info!("done uploading to the release");
        Ok(())
    }

    /// Upload files to the object store under `release/<basename>` keys.
    pub async fn upload_to_store(&self, files: &[PathBuf]) -> Result<Vec<String>> {
        info!("uploading {} file(s) to the object store", files.len());
        let mut locations = Vec::with_capacity(files.len());
        for file in files {
            let key = format!("{}{}", RELEASE_KEY_PREFIX, file_name(file)?);
            let location = self.store.put_file(&key, file).await?;
            info!("stored {}", location);
            locations.push(location);
        }
        Ok(locations)
    }
}

/// Duplicate the universal bundle's signature under the generic
/// `<repo>-<tag>.tar.gz.sig` name so consumers can find an un-suffixed
/// canonical copy. Returns the path of the copy.
pub fn stage_generic_signature(
    work_dir: &Path,
    repo: &RepoId,
    tag: &str,
    universal_sig: &Path,
) -> Result<PathBuf> {
    let generic = work_dir.join(format!("{}-{}.tar.gz.sig", repo.name, tag));
    if generic != universal_sig {
        std::fs::copy(universal_sig, &generic)?;
    }
    Ok(generic)
}

fn file_name(file: &Path) -> Result<String> {
    file.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .ok_or_else(|| {
            PublishError::UploadFailed {
                asset: file.display().to_string(),
                reason: "path has no usable file name".to_string(),
            }
            .into()
        })
}
