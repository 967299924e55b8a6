//! Command line front door.
//!
//! A thin stand-in for the chat front end: it loads the configuration,
//! wires the production collaborators, launches the requested release
//! and waits for the background report.

mod output;

pub use output::OutputManager;

use crate::command::{CutPluginRequest, LaunchOutcome, ReleaseCoordinator};
use crate::config::BotConfig;
use crate::error::Result;
use crate::github::GithubRestClient;
use crate::pipeline::Services;
use crate::publish::S3ObjectStore;
use crate::signing::{SignatureVerifier, SshSigner};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// Release bot for plugin repositories
#[derive(Parser, Debug)]
#[command(
    name = "shipbot",
    version,
    about = "Cut, sign and publish plugin releases",
    long_about = "Creates a release tag, waits for the build artifact, splits it into \
                  platform bundles, has them signed on the signing host, verifies the \
                  detached signatures and publishes everything."
)]
pub struct Args {
    /// Path to the JSON configuration file
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Supported commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Cut a plugin release for an existing repository
    CutPlugin {
        /// Plugin repository name (without the owner)
        #[arg(long)]
        repo: String,

        /// Release tag, `v` + semver
        #[arg(long)]
        tag: String,

        /// Commit to tag instead of the default branch tip
        #[arg(long)]
        commit_sha: Option<String>,

        /// Exact name of the asset to sign, instead of the `.tar.gz` scan
        #[arg(long)]
        asset_name: Option<String>,

        /// Proceed even when the tag already exists
        #[arg(long)]
        force: bool,

        /// Label the release as a pre-release
        #[arg(long)]
        pre_release: bool,

        /// User name reports are addressed to
        #[arg(long, default_value = "operator")]
        user: String,
    },
}

/// Run the parsed command to completion; returns the process exit code.
pub async fn run(args: Args) -> Result<i32> {
    let output = OutputManager::new();
    let config = BotConfig::load(&args.config)?;

    match args.command {
        Command::CutPlugin {
            repo,
            tag,
            commit_sha,
            asset_name,
            force,
            pre_release,
            user,
        } => {
            let coordinator = build_coordinator(&config)?;
            let request = CutPluginRequest {
                repo,
                tag,
                commit_sha,
                asset_name,
                force,
                pre_release,
                user,
            };

            match coordinator.launch(request).await? {
                LaunchOutcome::AlreadyExists { message } => {
                    output.warn(&message);
                    Ok(0)
                }
                LaunchOutcome::Started { ack, handle } => {
                    output.info(&ack);
                    let report = handle.wait().await;
                    let message = report.message();
                    if report.result.is_ok() {
                        output.success(&message);
                        Ok(0)
                    } else {
                        output.error(&message);
                        Ok(1)
                    }
                }
            }
        }
    }
}

/// Wire the production collaborators from configuration.
fn build_coordinator(config: &BotConfig) -> Result<ReleaseCoordinator> {
    let github = Arc::new(GithubRestClient::new(&config.github)?);
    let services = Services {
        tags: github.clone(),
        releases: github.clone(),
        search: github,
        signer: Arc::new(SshSigner::new(config.signing.clone())?),
        store: Arc::new(S3ObjectStore::new(&config.store)),
        verifier: SignatureVerifier::new()?,
    };
    Ok(ReleaseCoordinator::new(
        services,
        config.github.org.clone(),
        config.wait.clone(),
    ))
}
