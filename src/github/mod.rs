//! Source-host integration.
//!
//! Each collaborator capability is its own trait ([`TagService`],
//! [`ReleaseService`], [`SearchService`]) so the pipeline can run against
//! the real REST adapter in production and in-memory fakes in tests.

mod rest;

pub use rest::GithubRestClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// A repository addressed as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    /// Repository owner (user or org)
    pub owner: String,
    /// Repository name
    pub name: String,
}

impl RepoId {
    /// Build a repository id from owner and name.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A git reference as returned by the source host.
#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    /// Fully qualified ref name, e.g. `refs/tags/v1.2.3`
    #[serde(rename = "ref")]
    pub name: String,
    /// Object the ref points at
    pub object: GitObject,
}

/// The object behind a git reference.
#[derive(Debug, Clone, Deserialize)]
pub struct GitObject {
    /// Object SHA
    pub sha: String,
    /// Object type (`commit`, `tag`, ...)
    #[serde(rename = "type")]
    pub kind: String,
}

/// A release on the source host.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    /// Release id
    pub id: u64,
    /// Tag the release belongs to
    pub tag_name: String,
    /// Human-facing release page URL
    pub html_url: String,
    /// Asset upload URL template
    #[serde(default)]
    pub upload_url: String,
    /// Whether the release is flagged as a pre-release
    #[serde(default)]
    pub prerelease: bool,
    /// Assets attached to the release
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// A single release asset.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    /// Asset id
    pub id: u64,
    /// Asset file name
    pub name: String,
}

/// Tag and ref operations.
#[async_trait]
pub trait TagService: Send + Sync {
    /// List refs whose name starts with `tags/<tag>`.
    async fn matching_tag_refs(&self, repo: &RepoId, tag: &str) -> Result<Vec<GitRef>>;

    /// Resolve the head ref of a branch.
    async fn branch_head(&self, repo: &RepoId, branch: &str) -> Result<GitRef>;

    /// Look up the repository's default branch name.
    async fn default_branch(&self, repo: &RepoId) -> Result<String>;

    /// Check that a commit exists in the repository.
    async fn commit_exists(&self, repo: &RepoId, sha: &str) -> Result<bool>;

    /// Create an annotated tag object at a commit.
    async fn create_annotated_tag(
        &self,
        repo: &RepoId,
        tag: &str,
        message: &str,
        commit_sha: &str,
    ) -> Result<()>;

    /// Create the `refs/tags/<tag>` reference pointing at a commit.
    async fn create_tag_ref(&self, repo: &RepoId, tag: &str, commit_sha: &str) -> Result<()>;
}

/// Release and asset operations.
#[async_trait]
pub trait ReleaseService: Send + Sync {
    /// Fetch a release by tag; `None` when no release exists yet.
    async fn release_by_tag(&self, repo: &RepoId, tag: &str) -> Result<Option<Release>>;

    /// List the assets currently attached to a release.
    async fn list_assets(&self, repo: &RepoId, release_id: u64) -> Result<Vec<ReleaseAsset>>;

    /// Download an asset into `dest_dir`, returning the written path.
    async fn download_asset(
        &self,
        repo: &RepoId,
        asset: &ReleaseAsset,
        dest_dir: &Path,
    ) -> Result<PathBuf>;

    /// Upload a file as a new release asset.
    async fn upload_asset(&self, repo: &RepoId, release_id: u64, file: &Path) -> Result<ReleaseAsset>;

    /// Delete a release asset by id.
    async fn delete_asset(&self, repo: &RepoId, asset_id: u64) -> Result<()>;

    /// Flip the pre-release flag on a release.
    async fn set_prerelease(&self, repo: &RepoId, release_id: u64, prerelease: bool) -> Result<()>;
}

/// Repository existence lookups.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Check whether the repository exists and is visible to the token.
    async fn repository_exists(&self, repo: &RepoId) -> Result<bool>;
}
