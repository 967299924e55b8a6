//! The command layer between the chat front end and the workflow.
//!
//! Validates a release request, creates the tag synchronously so the
//! caller gets an immediate acknowledgment, then runs the remaining
//! stages on a spawned task whose result arrives over a oneshot channel.
//! Concurrent duplicate triggers for the same (repo, tag) pair are
//! rejected by an in-flight guard instead of silently racing.

use crate::config::WaitPolicy;
use crate::error::{CommandError, Result};
use crate::github::RepoId;
use crate::pipeline::{self, CutRequest, CutSummary, Services, StageError};
use crate::release::{TagManager, TagOutcome};
use chrono::{DateTime, Utc};
use log::{error, info};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// What the chat front end supplies for one release trigger.
#[derive(Debug, Clone)]
pub struct CutPluginRequest {
    /// Plugin repository name (owner comes from configuration)
    pub repo: String,
    /// Release tag, `v` + semver
    pub tag: String,
    /// Commit to tag instead of the default branch tip
    pub commit_sha: Option<String>,
    /// Exact asset name to wait for
    pub asset_name: Option<String>,
    /// Proceed even when the tag already exists
    pub force: bool,
    /// Mark the release as a pre-release
    pub pre_release: bool,
    /// Invoking chat user, for report addressing
    pub user: String,
}

/// Outcome of launching a release request.
#[derive(Debug)]
pub enum LaunchOutcome {
    /// The tag already exists and force was not set; nothing was started.
    AlreadyExists {
        /// Message for the front end to post
        message: String,
    },
    /// The workflow is running in the background.
    Started {
        /// Immediate acknowledgment for the front end to post
        ack: String,
        /// Delivers the final report when the workflow finishes
        handle: ReleaseHandle,
    },
}

/// Receives the final report of a background workflow.
#[derive(Debug)]
pub struct ReleaseHandle {
    receiver: oneshot::Receiver<ReleaseReport>,
}

impl ReleaseHandle {
    /// Wait for the workflow to finish and return its report.
    pub async fn wait(self) -> ReleaseReport {
        match self.receiver.await {
            Ok(report) => report,
            // The worker can only vanish without reporting if it panicked.
            Err(_) => ReleaseReport {
                user: String::new(),
                started_at: Utc::now(),
                finished_at: Utc::now(),
                result: Err(StageError {
                    stage: pipeline::Stage::Setup,
                    source: std::io::Error::other("release worker disappeared without reporting")
                        .into(),
                }),
            },
        }
    }
}

/// Final report of one release workflow.
#[derive(Debug)]
pub struct ReleaseReport {
    /// User the report is addressed to
    pub user: String,
    /// When the background stages started
    pub started_at: DateTime<Utc>,
    /// When they finished
    pub finished_at: DateTime<Utc>,
    /// Success summary or the failing stage and cause
    pub result: std::result::Result<CutSummary, StageError>,
}

impl ReleaseReport {
    /// Human-readable completion message for the chat front end.
    pub fn message(&self) -> String {
        match &self.result {
            Ok(summary) => success_message(&self.user, summary),
            Err(err) => format!(
                "@{} Release failed at {}.\nError: {}",
                self.user, err.stage, err.source
            ),
        }
    }
}

/// Launches release workflows and keeps one in flight per (repo, tag).
pub struct ReleaseCoordinator {
    services: Services,
    org: String,
    wait: WaitPolicy,
    in_flight: Arc<Mutex<HashSet<(String, String)>>>,
}

impl ReleaseCoordinator {
    /// Build a coordinator for repositories under `org`.
    pub fn new(services: Services, org: impl Into<String>, wait: WaitPolicy) -> Self {
        Self {
            services,
            org: org.into(),
            wait,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Validate and launch one release request.
    ///
    /// The tag is created before returning so the acknowledgment can say
    /// so; everything slow runs on a background task delivered through
    /// the returned [`ReleaseHandle`].
    pub async fn launch(&self, request: CutPluginRequest) -> Result<LaunchOutcome> {
        validate_request(&request)?;

        let repo = RepoId::new(self.org.clone(), request.repo.clone());
        if !self.services.search.repository_exists(&repo).await? {
            return Err(CommandError::UnknownRepository {
                repo: repo.to_string(),
            }
            .into());
        }

        let guard = acquire_in_flight(&self.in_flight, &request.repo, &request.tag)?;

        let tag_manager = TagManager::new(self.services.tags.as_ref());
        let outcome = tag_manager
            .create_tag(&repo, &request.tag, request.commit_sha.as_deref())
            .await?;

        let ack = match outcome {
            TagOutcome::Created { ref sha } => {
                info!("tag {} created on {} at {}", request.tag, repo, sha);
                format!(
                    "@{} triggered a plugin release for {} {}.\n\
                     Tag {} created in {}. Waiting for the build artifact to sign and publish.\n\
                     Will report back when the process completes.",
                    request.user, repo, request.tag, request.tag, repo
                )
            }
            TagOutcome::AlreadyExists if !request.force => {
                return Ok(LaunchOutcome::AlreadyExists {
                    message: format!(
                        "@{} Tag {} already exists in {}. Not generating any artifacts. \
                         Use force to regenerate them.",
                        request.user, request.tag, repo
                    ),
                });
            }
            TagOutcome::AlreadyExists => format!(
                "@{} Tag {} already exists in {}. Re-running signing and publishing \
                 with the existing tag.\nWill report back when the process completes.",
                request.user, request.tag, repo
            ),
        };

        let cut = CutRequest {
            repo,
            tag: request.tag.clone(),
            commit_sha: request.commit_sha.clone(),
            asset_name: request.asset_name.clone(),
            pre_release: request.pre_release,
        };
        let services = self.services.clone();
        let wait = self.wait.clone();
        let user = request.user.clone();
        let (sender, receiver) = oneshot::channel();

        tokio::spawn(async move {
            let started_at = Utc::now();
            let result = pipeline::run(&services, &wait, &cut).await;
            if let Err(err) = &result {
                error!("release workflow for {} {} failed: {err}", cut.repo, cut.tag);
            }
            let report = ReleaseReport {
                user,
                started_at,
                finished_at: Utc::now(),
                result,
            };
            // The caller may have dropped the handle; the guard must be
            // released either way.
            let _ = sender.send(report);
            drop(guard);
        });

        Ok(LaunchOutcome::Started {
            ack,
            handle: ReleaseHandle { receiver },
        })
    }
}

/// Reject malformed requests before any network call.
fn validate_request(request: &CutPluginRequest) -> Result<()> {
    if request.repo.is_empty() {
        return Err(CommandError::EmptyRepository.into());
    }
    let Some(version) = request.tag.strip_prefix('v') else {
        return Err(CommandError::InvalidTag {
            tag: request.tag.clone(),
            reason: "tag must start with a leading 'v'".to_string(),
        }
        .into());
    };
    if let Err(err) = semver::Version::parse(version) {
        return Err(CommandError::InvalidTag {
            tag: request.tag.clone(),
            reason: format!("tag must adhere to semver after the leading 'v': {err}"),
        }
        .into());
    }
    Ok(())
}

/// Removes its (repo, tag) key from the in-flight set on drop.
#[derive(Debug)]
struct InFlightGuard {
    set: Arc<Mutex<HashSet<(String, String)>>>,
    key: (String, String),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = match self.set.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        set.remove(&self.key);
    }
}

fn acquire_in_flight(
    set: &Arc<Mutex<HashSet<(String, String)>>>,
    repo: &str,
    tag: &str,
) -> Result<InFlightGuard> {
    let key = (repo.to_string(), tag.to_string());
    let mut in_flight = match set.lock() {
        Ok(in_flight) => in_flight,
        Err(poisoned) => poisoned.into_inner(),
    };
    if !in_flight.insert(key.clone()) {
        return Err(CommandError::ReleaseInFlight {
            repo: repo.to_string(),
            tag: tag.to_string(),
        }
        .into());
    }
    Ok(InFlightGuard {
        set: Arc::clone(set),
        key,
    })
}

fn success_message(user: &str, summary: &CutSummary) -> String {
    let mut message = format!(
        "@{} Plugin was successfully signed and uploaded to the source host and the release store.\n\
         Tag: **{}**\n\
         Repo: **{}**",
        user, summary.tag, summary.repo
    );
    if let Some(sha) = &summary.commit_sha {
        message.push_str(&format!("\nCommitSHA: **{sha}**"));
    }
    message.push_str(&format!("\n[Release Link]({})", summary.release_url));
    message
}
