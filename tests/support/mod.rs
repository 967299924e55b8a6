//! In-memory fakes and fixtures for the end-to-end workflow tests.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use pgp::composed::{Deserializable, SignedSecretKey, StandaloneSignature};
use pgp::crypto::hash::HashAlgorithm;
use pgp::packet::{SignatureConfig, SignatureType, SignatureVersion, Subpacket, SubpacketData};
use pgp::types::KeyTrait;
use shipbot::error::{GithubError, Result};
use shipbot::github::{
    GitObject, GitRef, Release, ReleaseAsset, ReleaseService, RepoId, SearchService, TagService,
};
use shipbot::publish::ObjectStore;
use shipbot::signing::Signer;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Secret half of the embedded trusted release key, for the fake signer.
const SIGNING_SECRET_KEY: &str = include_str!("../fixtures/release_signing_secret.asc");

/// Manifest declaring the three standard platforms.
pub const FULL_MANIFEST: &str = r#"{
    "id": "com.example.plugin-x",
    "server": {
        "executables": {
            "darwin-amd64": "server/dist/plugin-darwin-amd64",
            "windows-amd64": "server/dist/plugin-windows-amd64.exe",
            "linux-amd64": "server/dist/plugin-linux-amd64"
        }
    }
}"#;

/// Build a gzip-compressed tar from (path, contents) pairs.
pub fn make_archive(path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (entry_path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, entry_path, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// Build a universal bundle with all three platform binaries.
pub fn make_universal_bundle(path: &Path) {
    make_archive(
        path,
        &[
            ("com.example.plugin-x/plugin.json", FULL_MANIFEST),
            (
                "com.example.plugin-x/server/dist/plugin-darwin-amd64",
                "darwin binary",
            ),
            (
                "com.example.plugin-x/server/dist/plugin-windows-amd64.exe",
                "windows binary",
            ),
            (
                "com.example.plugin-x/server/dist/plugin-linux-amd64",
                "linux binary",
            ),
            ("com.example.plugin-x/webapp/dist/main.js", "js"),
        ],
    );
}

/// Produce a real detached signature with the release secret key.
pub fn sign_detached(file: &Path) -> PathBuf {
    let (key, _) = SignedSecretKey::from_string(SIGNING_SECRET_KEY).unwrap();
    let content = std::fs::read(file).unwrap();

    let config = SignatureConfig::new_v4(
        SignatureVersion::V4,
        SignatureType::Binary,
        key.algorithm(),
        HashAlgorithm::SHA2_256,
        vec![
            Subpacket::regular(SubpacketData::SignatureCreationTime(chrono::Utc::now())),
            Subpacket::regular(SubpacketData::Issuer(key.key_id())),
        ],
        vec![],
    );
    let signature = config.sign(&key, String::new, &content[..]).unwrap();
    let armored = StandaloneSignature::new(signature)
        .to_armored_string(None)
        .unwrap();

    let sig_path = PathBuf::from(format!("{}.sig", file.display()));
    std::fs::write(&sig_path, armored).unwrap();
    sig_path
}

/// One shared in-memory source host covering all three capability traits.
pub struct FakeGithub {
    /// Repositories that exist, by name
    pub repos: Vec<String>,
    /// Default branch reported for every repository
    pub default_branch: String,
    /// Head commit of the default branch
    pub branch_tip: String,
    /// Fully qualified refs that already exist
    pub refs: Mutex<Vec<String>>,
    /// Annotated tags created: (tag, message, sha)
    pub created_tags: Mutex<Vec<(String, String, String)>>,
    /// The release served for the tag, if any
    pub release: Mutex<Option<Release>>,
    /// Local file served as the body of every asset download
    pub asset_file: PathBuf,
    /// Uploaded asset names with their bytes
    pub uploaded: Mutex<HashMap<String, Vec<u8>>>,
    /// Asset ids deleted from the release
    pub deleted_assets: Mutex<Vec<u64>>,
    /// Pre-release flag as last set
    pub prerelease: Mutex<Option<bool>>,
    next_asset_id: Mutex<u64>,
}

impl FakeGithub {
    /// A host serving one repository with a release and one bundle asset.
    pub fn with_release(repo: &str, tag: &str, asset_name: &str, asset_file: &Path) -> Self {
        Self {
            repos: vec![repo.to_string()],
            default_branch: "main".to_string(),
            branch_tip: "tip-sha".to_string(),
            refs: Mutex::new(Vec::new()),
            created_tags: Mutex::new(Vec::new()),
            release: Mutex::new(Some(Release {
                id: 42,
                tag_name: tag.to_string(),
                html_url: format!("https://example.com/acme/{repo}/releases/tag/{tag}"),
                upload_url: String::new(),
                prerelease: false,
                assets: vec![ReleaseAsset {
                    id: 1,
                    name: asset_name.to_string(),
                }],
            })),
            asset_file: asset_file.to_path_buf(),
            uploaded: Mutex::new(HashMap::new()),
            deleted_assets: Mutex::new(Vec::new()),
            prerelease: Mutex::new(None),
            next_asset_id: Mutex::new(100),
        }
    }

    /// Pretend the tag ref already exists.
    pub fn with_existing_tag(self, tag: &str) -> Self {
        self.refs.lock().unwrap().push(format!("refs/tags/{tag}"));
        self
    }
}

#[async_trait]
impl TagService for FakeGithub {
    async fn matching_tag_refs(&self, _repo: &RepoId, tag: &str) -> Result<Vec<GitRef>> {
        let prefix = format!("refs/tags/{tag}");
        Ok(self
            .refs
            .lock()
            .unwrap()
            .iter()
            .filter(|name| name.starts_with(&prefix))
            .map(|name| GitRef {
                name: name.clone(),
                object: GitObject {
                    sha: self.branch_tip.clone(),
                    kind: "commit".to_string(),
                },
            })
            .collect())
    }

    async fn branch_head(&self, _repo: &RepoId, _branch: &str) -> Result<GitRef> {
        Ok(GitRef {
            name: format!("refs/heads/{}", self.default_branch),
            object: GitObject {
                sha: self.branch_tip.clone(),
                kind: "commit".to_string(),
            },
        })
    }

    async fn default_branch(&self, _repo: &RepoId) -> Result<String> {
        Ok(self.default_branch.clone())
    }

    async fn commit_exists(&self, _repo: &RepoId, sha: &str) -> Result<bool> {
        Ok(sha == self.branch_tip)
    }

    async fn create_annotated_tag(
        &self,
        _repo: &RepoId,
        tag: &str,
        message: &str,
        commit_sha: &str,
    ) -> Result<()> {
        self.created_tags.lock().unwrap().push((
            tag.to_string(),
            message.to_string(),
            commit_sha.to_string(),
        ));
        Ok(())
    }

    async fn create_tag_ref(&self, _repo: &RepoId, tag: &str, _commit_sha: &str) -> Result<()> {
        self.refs.lock().unwrap().push(format!("refs/tags/{tag}"));
        Ok(())
    }
}

#[async_trait]
impl ReleaseService for FakeGithub {
    async fn release_by_tag(&self, _repo: &RepoId, tag: &str) -> Result<Option<Release>> {
        let release = self.release.lock().unwrap();
        Ok(release
            .as_ref()
            .filter(|release| release.tag_name == tag)
            .cloned())
    }

    async fn list_assets(&self, _repo: &RepoId, _release_id: u64) -> Result<Vec<ReleaseAsset>> {
        let release = self.release.lock().unwrap();
        Ok(release
            .as_ref()
            .map(|release| release.assets.clone())
            .unwrap_or_default())
    }

    async fn download_asset(
        &self,
        _repo: &RepoId,
        asset: &ReleaseAsset,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        let dest = dest_dir.join(&asset.name);
        std::fs::copy(&self.asset_file, &dest)?;
        Ok(dest)
    }

    async fn upload_asset(&self, _repo: &RepoId, _release_id: u64, file: &Path) -> Result<ReleaseAsset> {
        let name = file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| GithubError::UnexpectedResponse {
                context: "upload without file name".to_string(),
            })?
            .to_string();
        let body = std::fs::read(file)?;
        self.uploaded.lock().unwrap().insert(name.clone(), body);

        let mut next_id = self.next_asset_id.lock().unwrap();
        *next_id += 1;
        let asset = ReleaseAsset { id: *next_id, name };
        if let Some(release) = self.release.lock().unwrap().as_mut() {
            release.assets.push(asset.clone());
        }
        Ok(asset)
    }

    async fn delete_asset(&self, _repo: &RepoId, asset_id: u64) -> Result<()> {
        if let Some(release) = self.release.lock().unwrap().as_mut() {
            release.assets.retain(|asset| asset.id != asset_id);
        }
        self.deleted_assets.lock().unwrap().push(asset_id);
        Ok(())
    }

    async fn set_prerelease(&self, _repo: &RepoId, _release_id: u64, prerelease: bool) -> Result<()> {
        *self.prerelease.lock().unwrap() = Some(prerelease);
        Ok(())
    }
}

#[async_trait]
impl SearchService for FakeGithub {
    async fn repository_exists(&self, repo: &RepoId) -> Result<bool> {
        Ok(self.repos.iter().any(|name| *name == repo.name))
    }
}

/// Signer that produces real signatures with the release secret key.
#[derive(Default)]
pub struct FakeSigner {
    /// Write garbage instead of a valid signature
    pub corrupt: bool,
    /// Files whose staged copies were removed
    pub removed: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl Signer for FakeSigner {
    async fn sign(&self, files: &[PathBuf]) -> Result<HashMap<PathBuf, PathBuf>> {
        let mut signatures = HashMap::new();
        for file in files {
            let sig_path = if self.corrupt {
                let sig_path = PathBuf::from(format!("{}.sig", file.display()));
                std::fs::write(&sig_path, b"not a signature")?;
                sig_path
            } else {
                sign_detached(file)
            };
            signatures.insert(file.clone(), sig_path);
        }
        Ok(signatures)
    }

    async fn remove_staged(&self, files: &[PathBuf]) -> Result<()> {
        self.removed.lock().unwrap().extend(files.iter().cloned());
        Ok(())
    }
}

/// Object store that remembers every put.
#[derive(Default)]
pub struct MemoryStore {
    /// key → body
    pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_file(&self, key: &str, file: &Path) -> Result<String> {
        let body = std::fs::read(file)?;
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(format!("mem://releases/{key}"))
    }
}
