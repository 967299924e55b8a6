//! The end-to-end release workflow.
//!
//! Stages run strictly in sequence; no stage begins before its
//! predecessor's postconditions hold (signing never starts before the
//! platform bundles are verified, staged remote copies are removed only
//! after signature verification). Any stage error stops the remaining
//! stages and is surfaced wrapped in [`StageError`].

use crate::bundle::{split_universal_bundle, PlatformBundle};
use crate::config::WaitPolicy;
use crate::error::ReleaseError;
use crate::github::{ReleaseService, RepoId, SearchService, TagService};
use crate::publish::{stage_generic_signature, ObjectStore, Publisher};
use crate::release::AssetWaiter;
use crate::signing::{SignatureVerifier, Signer};
use log::info;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// The collaborators one workflow runs against.
///
/// Production wires the REST client, the SSH signer and the S3 store;
/// tests substitute in-memory fakes behind the same traits.
#[derive(Clone)]
pub struct Services {
    /// Tag and ref operations
    pub tags: Arc<dyn TagService>,
    /// Release and asset operations
    pub releases: Arc<dyn ReleaseService>,
    /// Repository lookups
    pub search: Arc<dyn SearchService>,
    /// Remote signing
    pub signer: Arc<dyn Signer>,
    /// Artifact distribution
    pub store: Arc<dyn ObjectStore>,
    /// Detached signature checking
    pub verifier: SignatureVerifier,
}

/// One release request as the workflow sees it.
#[derive(Debug, Clone)]
pub struct CutRequest {
    /// Repository the plugin lives in
    pub repo: RepoId,
    /// Release tag
    pub tag: String,
    /// Commit the tag was created at, when supplied by the caller
    pub commit_sha: Option<String>,
    /// Exact asset name to wait for instead of the `.tar.gz` scan
    pub asset_name: Option<String>,
    /// Mark the release as a pre-release once published
    pub pre_release: bool,
}

/// What a completed workflow produced.
#[derive(Debug, Clone)]
pub struct CutSummary {
    /// Repository the release was cut for
    pub repo: RepoId,
    /// Release tag
    pub tag: String,
    /// Commit the caller pinned the tag to, if any
    pub commit_sha: Option<String>,
    /// Release page URL
    pub release_url: String,
    /// Platform bundles that were signed and published
    pub bundles: Vec<PlatformBundle>,
    /// Object-store locations of everything uploaded
    pub store_locations: Vec<String>,
}

/// Workflow stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Working directory setup
    Setup,
    /// Polling for the release and its bundle asset
    AssetWait,
    /// Downloading the universal bundle
    Download,
    /// Splitting into platform bundles
    Split,
    /// Remote signing
    Sign,
    /// Detached signature verification
    Verify,
    /// Uploading to the source-host release
    PublishGithub,
    /// Uploading to the object store
    PublishStore,
    /// Pre-release flagging and final bookkeeping
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "workspace setup",
            Stage::AssetWait => "asset wait",
            Stage::Download => "asset download",
            Stage::Split => "bundle split",
            Stage::Sign => "remote signing",
            Stage::Verify => "signature verification",
            Stage::PublishGithub => "release upload",
            Stage::PublishStore => "store upload",
            Stage::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// A workflow failure, attributed to the stage that raised it.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct StageError {
    /// Stage that failed
    pub stage: Stage,
    /// Underlying cause
    #[source]
    pub source: ReleaseError,
}

fn at(stage: Stage) -> impl Fn(ReleaseError) -> StageError {
    move |source| StageError { stage, source }
}

/// Run every stage after tag creation for one release request.
///
/// The workflow owns a temporary working directory scoped to this one
/// invocation; all intermediate files live there and are removed when
/// the function returns, success or failure.
pub async fn run(
    services: &Services,
    wait: &WaitPolicy,
    request: &CutRequest,
) -> Result<CutSummary, StageError> {
    let work_dir = tempfile::Builder::new()
        .prefix(&format!("{}-{}-", request.repo.name, request.tag))
        .tempdir()
        .map_err(|e| at(Stage::Setup)(e.into()))?;
    let work = work_dir.path().to_path_buf();

    // Wait for the build artifact to show up on the release.
    let waiter = AssetWaiter::new(services.releases.as_ref(), wait.clone());
    let (release, asset) = waiter
        .wait_for_asset(&request.repo, &request.tag, request.asset_name.as_deref())
        .await
        .map_err(at(Stage::AssetWait))?;

    let universal = services
        .releases
        .download_asset(&request.repo, &asset, &work)
        .await
        .map_err(at(Stage::Download))?;

    // Split into per-platform bundles, each verified to carry exactly
    // its own platform binary.
    let bundles = {
        let universal = universal.clone();
        let repo_name = request.repo.name.clone();
        let tag = request.tag.clone();
        let work = work.clone();
        tokio::task::spawn_blocking(move || {
            split_universal_bundle(&universal, &repo_name, &tag, &work)
        })
        .await
        .map_err(|e| at(Stage::Split)(std::io::Error::other(e).into()))?
        .map_err(at(Stage::Split))?
    };

    let mut to_sign: Vec<PathBuf> = bundles.iter().map(|b| b.path.clone()).collect();
    to_sign.push(universal.clone());

    let signatures = services
        .signer
        .sign(&to_sign)
        .await
        .map_err(at(Stage::Sign))?;

    // Verify before touching the staged remote copies; a failed check
    // leaves them in place for manual inspection.
    {
        let verifier = services.verifier.clone();
        let files = to_sign.clone();
        tokio::task::spawn_blocking(move || verifier.verify_all(&files))
            .await
            .map_err(|e| at(Stage::Verify)(std::io::Error::other(e).into()))?
            .map_err(at(Stage::Verify))?;
    }
    services
        .signer
        .remove_staged(&to_sign)
        .await
        .map_err(at(Stage::Sign))?;

    let universal_sig = signatures
        .get(&universal)
        .cloned()
        .unwrap_or_else(|| SignatureVerifier::signature_path(&universal));

    // The source host gets the universal bundle's signature; the store
    // gets the platform bundles, their signatures and a generically
    // named copy of the universal signature.
    let publisher = Publisher::new(services.releases.as_ref(), services.store.as_ref());
    publisher
        .upload_release_assets(&request.repo, release.id, std::slice::from_ref(&universal_sig))
        .await
        .map_err(at(Stage::PublishGithub))?;

    let generic_sig = stage_generic_signature(&work, &request.repo, &request.tag, &universal_sig)
        .map_err(at(Stage::PublishStore))?;
    let mut store_files = vec![generic_sig];
    for bundle in &bundles {
        store_files.push(bundle.path.clone());
        store_files.push(SignatureVerifier::signature_path(&bundle.path));
    }
    let store_locations = publisher
        .upload_to_store(&store_files)
        .await
        .map_err(at(Stage::PublishStore))?;

    if request.pre_release {
        services
            .releases
            .set_prerelease(&request.repo, release.id, true)
            .await
            .map_err(at(Stage::Finalize))?;
        info!("marked release {} as pre-release", request.tag);
    }

    info!(
        "release workflow for {} {} completed with {} platform bundle(s)",
        request.repo, request.tag, bundles.len()
    );
    Ok(CutSummary {
        repo: request.repo.clone(),
        tag: request.tag.clone(),
        commit_sha: request.commit_sha.clone(),
        release_url: release.html_url,
        bundles,
        store_locations,
    })
}
