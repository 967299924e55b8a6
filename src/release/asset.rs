//! Polling for the universal bundle asset on a release.

use super::BUNDLE_SUFFIX;
use crate::config::WaitPolicy;
use crate::error::{Result, WaitError};
use crate::github::{Release, ReleaseAsset, ReleaseService, RepoId};
use log::info;
use tokio::time::Instant;

/// Waits for a release and exactly one matching bundle asset to appear.
pub struct AssetWaiter<'a> {
    releases: &'a dyn ReleaseService,
    policy: WaitPolicy,
}

impl<'a> AssetWaiter<'a> {
    /// Build a waiter with the given polling policy.
    pub fn new(releases: &'a dyn ReleaseService, policy: WaitPolicy) -> Self {
        Self { releases, policy }
    }

    /// Poll until the release for `tag` carries a usable bundle asset.
    ///
    /// A missing release, or a release with no matching asset yet, is a
    /// normal retry condition. With `asset_name` set, only an asset with
    /// exactly that name terminates the wait. Without it, exactly one
    /// asset ending in `.tar.gz` must exist; more than one is a fatal
    /// ambiguity, never a tie-break.
    pub async fn wait_for_asset(
        &self,
        repo: &RepoId,
        tag: &str,
        asset_name: Option<&str>,
    ) -> Result<(Release, ReleaseAsset)> {
        let started = Instant::now();
        let deadline = started + self.policy.timeout();

        info!("waiting for release asset on {repo} tag {tag}");
        loop {
            if let Some(release) = self.releases.release_by_tag(repo, tag).await? {
                match pick_asset(&release, asset_name)? {
                    Some(asset) => {
                        info!("found release asset {} on tag {tag}", asset.name);
                        return Ok((release, asset));
                    }
                    None => info!("release for {tag} found but no matching asset yet, still waiting"),
                }
            } else {
                info!("no release for {tag} yet, trying again shortly");
            }

            if Instant::now() + self.policy.poll_interval() > deadline {
                return Err(WaitError::TimedOut {
                    tag: tag.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                }
                .into());
            }
            tokio::time::sleep(self.policy.poll_interval()).await;
        }
    }
}

/// Scan a release's assets for the universal bundle.
///
/// Returns `Ok(None)` while nothing suitable is attached yet.
fn pick_asset(release: &Release, asset_name: Option<&str>) -> Result<Option<ReleaseAsset>> {
    if let Some(wanted) = asset_name {
        return Ok(release.assets.iter().find(|a| a.name == wanted).cloned());
    }

    let candidates: Vec<&ReleaseAsset> = release
        .assets
        .iter()
        .filter(|a| a.name.ends_with(BUNDLE_SUFFIX))
        .collect();

    match candidates.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some((*only).clone())),
        many => Err(WaitError::AmbiguousAssets {
            names: many.iter().map(|a| a.name.clone()).collect(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReleaseError;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// Serves a scripted sequence of `release_by_tag` answers.
    struct ScriptedReleases {
        script: Mutex<Vec<Option<Release>>>,
    }

    impl ScriptedReleases {
        fn new(script: Vec<Option<Release>>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl ReleaseService for ScriptedReleases {
        async fn release_by_tag(
            &self,
            _repo: &RepoId,
            _tag: &str,
        ) -> crate::error::Result<Option<Release>> {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                Ok(script.remove(0))
            } else {
                Ok(script.first().cloned().flatten())
            }
        }

        async fn list_assets(
            &self,
            _repo: &RepoId,
            _release_id: u64,
        ) -> crate::error::Result<Vec<ReleaseAsset>> {
            unimplemented!("not used by the waiter")
        }

        async fn download_asset(
            &self,
            _repo: &RepoId,
            _asset: &ReleaseAsset,
            _dest_dir: &Path,
        ) -> crate::error::Result<PathBuf> {
            unimplemented!("not used by the waiter")
        }

        async fn upload_asset(
            &self,
            _repo: &RepoId,
            _release_id: u64,
            _file: &Path,
        ) -> crate::error::Result<ReleaseAsset> {
            unimplemented!("not used by the waiter")
        }

        async fn delete_asset(&self, _repo: &RepoId, _asset_id: u64) -> crate::error::Result<()> {
            unimplemented!("not used by the waiter")
        }

        async fn set_prerelease(
            &self,
            _repo: &RepoId,
            _release_id: u64,
            _prerelease: bool,
        ) -> crate::error::Result<()> {
            unimplemented!("not used by the waiter")
        }
    }

    fn release_with(assets: &[(u64, &str)]) -> Release {
        Release {
            id: 7,
            tag_name: "v1.2.3".to_string(),
            html_url: "https://example.com/r/v1.2.3".to_string(),
            upload_url: String::new(),
            prerelease: false,
            assets: assets
                .iter()
                .map(|(id, name)| ReleaseAsset {
                    id: *id,
                    name: (*name).to_string(),
                })
                .collect(),
        }
    }

    fn quick_policy() -> WaitPolicy {
        WaitPolicy {
            poll_interval_secs: 0,
            timeout_secs: 2,
        }
    }

    fn repo() -> RepoId {
        RepoId::new("acme", "plugin-x")
    }

    #[tokio::test]
    async fn returns_single_bundle_once_it_appears() {
        let releases = ScriptedReleases::new(vec![
            None,
            Some(release_with(&[])),
            Some(release_with(&[(1, "README.txt"), (2, "bundle.tar.gz")])),
        ]);
        let waiter = AssetWaiter::new(&releases, quick_policy());
        let (release, asset) = waiter
            .wait_for_asset(&repo(), "v1.2.3", None)
            .await
            .unwrap();
        assert_eq!(release.id, 7);
        assert_eq!(asset.name, "bundle.tar.gz");
    }

    #[tokio::test]
    async fn two_bundles_is_a_fatal_ambiguity() {
        let releases = ScriptedReleases::new(vec![Some(release_with(&[
            (1, "bundle.tar.gz"),
            (2, "plugin-bundle.tar.gz"),
        ]))]);
        let waiter = AssetWaiter::new(&releases, quick_policy());
        let err = waiter
            .wait_for_asset(&repo(), "v1.2.3", None)
            .await
            .unwrap_err();
        match err {
            ReleaseError::Wait(WaitError::AmbiguousAssets { names }) => {
                assert_eq!(names, vec!["bundle.tar.gz", "plugin-bundle.tar.gz"]);
            }
            other => panic!("expected ambiguity error, got {other}"),
        }
    }

    #[tokio::test]
    async fn explicit_name_picks_among_several() {
        let releases = ScriptedReleases::new(vec![Some(release_with(&[
            (1, "bundle.tar.gz"),
            (2, "plugin-bundle.tar.gz"),
        ]))]);
        let waiter = AssetWaiter::new(&releases, quick_policy());
        let (_, asset) = waiter
            .wait_for_asset(&repo(), "v1.2.3", Some("plugin-bundle.tar.gz"))
            .await
            .unwrap();
        assert_eq!(asset.name, "plugin-bundle.tar.gz");
        assert_eq!(asset.id, 2);
    }

    #[tokio::test]
    async fn times_out_when_nothing_appears() {
        let releases = ScriptedReleases::new(vec![None]);
        let policy = WaitPolicy {
            poll_interval_secs: 1,
            timeout_secs: 0,
        };
        let waiter = AssetWaiter::new(&releases, policy);
        let err = waiter
            .wait_for_asset(&repo(), "v9.9.9", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::Wait(WaitError::TimedOut { .. })
        ));
    }
}
