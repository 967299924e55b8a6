//! REST adapter for the source-host capability traits.

use super::{GitRef, Release, ReleaseAsset, RepoId, ReleaseService, SearchService, TagService};
use crate::config::GithubConfig;
use crate::error::{GithubError, Result};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Concrete adapter over the source host's REST API.
///
/// Implements [`TagService`], [`ReleaseService`] and [`SearchService`] with
/// a single authenticated `reqwest` client.
pub struct GithubRestClient {
    http: reqwest::Client,
    api_base: String,
    upload_base: String,
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    full_name: String,
}

impl GithubRestClient {
    /// Build a client from the configured token and endpoints.
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.token)).map_err(|_| {
            GithubError::UnexpectedResponse {
                context: "access token is not a valid header value".to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(USER_AGENT, HeaderValue::from_static("shipbot"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(GithubError::Network)?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
        })
    }

    fn repo_url(&self, repo: &RepoId, tail: &str) -> String {
        if tail.is_empty() {
            format!("{}/repos/{}/{}", self.api_base, repo.owner, repo.name)
        } else {
            format!("{}/repos/{}/{}/{}", self.api_base, repo.owner, repo.name, tail)
        }
    }

    /// Turn a non-success response into a [`GithubError::Api`].
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());
        Err(GithubError::Api {
            status: status.as_u16(),
            message,
        }
        .into())
    }
}

#[async_trait]
impl TagService for GithubRestClient {
    async fn matching_tag_refs(&self, repo: &RepoId, tag: &str) -> Result<Vec<GitRef>> {
        let url = self.repo_url(repo, &format!("git/matching-refs/tags/{tag}"));
        let response = self.http.get(url).send().await.map_err(GithubError::Network)?;
        let refs = Self::check(response)
            .await?
            .json::<Vec<GitRef>>()
            .await
            .map_err(GithubError::Network)?;
        Ok(refs)
    }

    async fn branch_head(&self, repo: &RepoId, branch: &str) -> Result<GitRef> {
        let url = self.repo_url(repo, &format!("git/ref/heads/{branch}"));
        let response = self.http.get(url).send().await.map_err(GithubError::Network)?;
        let head = Self::check(response)
            .await?
            .json::<GitRef>()
            .await
            .map_err(GithubError::Network)?;
        Ok(head)
    }

    async fn default_branch(&self, repo: &RepoId) -> Result<String> {
        let url = self.repo_url(repo, "");
        let response = self.http.get(url).send().await.map_err(GithubError::Network)?;
        let info = Self::check(response)
            .await?
            .json::<RepoInfo>()
            .await
            .map_err(GithubError::Network)?;
        Ok(info.default_branch)
    }

    async fn commit_exists(&self, repo: &RepoId, sha: &str) -> Result<bool> {
        let url = self.repo_url(repo, &format!("commits/{sha}"));
        let response = self.http.get(url).send().await.map_err(GithubError::Network)?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => Ok(false),
            _ => {
                Self::check(response).await?;
                Ok(true)
            }
        }
    }

    async fn create_annotated_tag(
        &self,
        repo: &RepoId,
        tag: &str,
        message: &str,
        commit_sha: &str,
    ) -> Result<()> {
        let url = self.repo_url(repo, "git/tags");
        let body = json!({
            "tag": tag,
            "message": message,
            "object": commit_sha,
            "type": "commit",
        });
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(GithubError::Network)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_tag_ref(&self, repo: &RepoId, tag: &str, commit_sha: &str) -> Result<()> {
        let url = self.repo_url(repo, "git/refs");
        let body = json!({
            "ref": format!("refs/tags/{tag}"),
            "sha": commit_sha,
        });
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(GithubError::Network)?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ReleaseService for GithubRestClient {
    async fn release_by_tag(&self, repo: &RepoId, tag: &str) -> Result<Option<Release>> {
        let url = self.repo_url(repo, &format!("releases/tags/{tag}"));
        let response = self.http.get(url).send().await.map_err(GithubError::Network)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let release = Self::check(response)
            .await?
            .json::<Release>()
            .await
            .map_err(GithubError::Network)?;
        Ok(Some(release))
    }

    async fn list_assets(&self, repo: &RepoId, release_id: u64) -> Result<Vec<ReleaseAsset>> {
        let url = self.repo_url(repo, &format!("releases/{release_id}/assets"));
        let response = self
            .http
            .get(url)
            .query(&[("per_page", "100")])
            .send()
            .await
            .map_err(GithubError::Network)?;
        let assets = Self::check(response)
            .await?
            .json::<Vec<ReleaseAsset>>()
            .await
            .map_err(GithubError::Network)?;
        Ok(assets)
    }

    async fn download_asset(
        &self,
        repo: &RepoId,
        asset: &ReleaseAsset,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        info!("downloading release asset {}", asset.name);
        let url = self.repo_url(repo, &format!("releases/assets/{}", asset.id));
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/octet-stream")
            .send()
            .await
            .map_err(GithubError::Network)?;
        let mut response = Self::check(response).await?;

        let dest = dest_dir.join(&asset.name);
        let mut file = tokio::fs::File::create(&dest).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(GithubError::Network)? {
            written += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        if written == 0 {
            return Err(GithubError::UnexpectedResponse {
                context: format!("asset {} downloaded empty", asset.name),
            }
            .into());
        }
        debug!("wrote {written} bytes to {}", dest.display());
        Ok(dest)
    }

    async fn upload_asset(&self, repo: &RepoId, release_id: u64, file: &Path) -> Result<ReleaseAsset> {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| GithubError::UnexpectedResponse {
                context: format!("asset path {} has no usable file name", file.display()),
            })?
            .to_string();

        let content = tokio::fs::read(file).await?;
        let url = format!(
            "{}/repos/{}/{}/releases/{}/assets",
            self.upload_base, repo.owner, repo.name, release_id
        );
        let response = self
            .http
            .post(url)
            .query(&[("name", name.as_str())])
            .header("Content-Type", "application/octet-stream")
            .body(content)
            .send()
            .await
            .map_err(GithubError::Network)?;
        let asset = Self::check(response)
            .await?
            .json::<ReleaseAsset>()
            .await
            .map_err(GithubError::Network)?;
        info!("uploaded release asset {name}");
        Ok(asset)
    }

    async fn delete_asset(&self, repo: &RepoId, asset_id: u64) -> Result<()> {
        let url = self.repo_url(repo, &format!("releases/assets/{asset_id}"));
        let response = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(GithubError::Network)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn set_prerelease(&self, repo: &RepoId, release_id: u64, prerelease: bool) -> Result<()> {
        let url = self.repo_url(repo, &format!("releases/{release_id}"));
        let response = self
            .http
            .patch(url)
            .json(&json!({ "prerelease": prerelease }))
            .send()
            .await
            .map_err(GithubError::Network)?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl SearchService for GithubRestClient {
    async fn repository_exists(&self, repo: &RepoId) -> Result<bool> {
        let url = format!("{}/search/repositories", self.api_base);
        let response = self
            .http
            .get(url)
            .query(&[("q", format!("repo:{}/{}", repo.owner, repo.name))])
            .send()
            .await
            .map_err(GithubError::Network)?;

        // The search API rejects qualifiers naming unknown repositories
        // with 422 instead of returning an empty result set.
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            return Ok(false);
        }
        let results = Self::check(response)
            .await?
            .json::<SearchResults>()
            .await
            .map_err(GithubError::Network)?;
        let full_name = format!("{}/{}", repo.owner, repo.name);
        Ok(results.items.iter().any(|item| item.full_name == full_name))
    }
}
