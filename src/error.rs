//! Error types for the release pipeline.
//!
//! One central taxonomy: a top-level [`ReleaseError`] with per-concern
//! sub-enums wired through `#[from]`. Stage attribution for workflow
//! failures lives in [`crate::pipeline::StageError`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for release pipeline operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all release pipeline operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// Configuration errors
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Source-host API errors
    #[error("source host error: {0}")]
    Github(#[from] GithubError),

    /// Tag creation errors
    #[error("tag error: {0}")]
    Tag(#[from] TagError),

    /// Release-asset wait errors
    #[error("asset wait error: {0}")]
    Wait(#[from] WaitError),

    /// Platform bundle errors
    #[error("bundle error: {0}")]
    Bundle(#[from] BundleError),

    /// Remote signing errors
    #[error("signing error: {0}")]
    Signing(#[from] SigningError),

    /// Signature verification errors
    #[error("verification error: {0}")]
    Verify(#[from] VerifyError),

    /// Publishing errors
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// Command layer errors
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was attempted
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Config file could not be parsed
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that was attempted
        path: PathBuf,
        /// Underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// A required field is missing or empty
    #[error("config field '{field}' is required: {reason}")]
    MissingField {
        /// Dotted field name
        field: String,
        /// Why the field matters
        reason: String,
    },

    /// A field is present but unusable
    #[error("config field '{field}' is invalid: {reason}")]
    InvalidField {
        /// Dotted field name
        field: String,
        /// Why the value was rejected
        reason: String,
    },
}

/// Source-host API errors
#[derive(Error, Debug)]
pub enum GithubError {
    /// The API answered with a non-success status
    #[error("API request failed ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or status text
        message: String,
    },

    /// Transport-level failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API answered something we cannot use
    #[error("unexpected response: {context}")]
    UnexpectedResponse {
        /// What was being parsed or looked up
        context: String,
    },
}

/// Tag creation errors
#[derive(Error, Debug)]
pub enum TagError {
    /// The requested commit does not exist in the repository
    #[error("commit '{sha}' not found, refusing to create a dangling tag")]
    CommitNotFound {
        /// The SHA that failed to resolve
        sha: String,
    },

    /// The branch head could not be resolved
    #[error("branch '{branch}' has no resolvable head")]
    BranchNotFound {
        /// Branch name
        branch: String,
    },
}

/// Release-asset wait errors
#[derive(Error, Debug)]
pub enum WaitError {
    /// The release or its asset never appeared within the bound
    #[error("timed out after {waited_secs}s waiting for a release asset on tag '{tag}'")]
    TimedOut {
        /// Tag that was polled
        tag: String,
        /// Total seconds waited
        waited_secs: u64,
    },

    /// More than one asset matched the bundle suffix
    #[error("found more than one bundle asset, refusing to guess: {names:?}")]
    AmbiguousAssets {
        /// Conflicting asset names
        names: Vec<String>,
    },
}

/// Platform bundle errors
#[derive(Error, Debug)]
pub enum BundleError {
    /// The archive does not carry a plugin manifest
    #[error("no plugin manifest found in {archive}")]
    MissingManifest {
        /// Archive path
        archive: PathBuf,
    },

    /// The manifest declares no platform executables
    #[error("manifest in {archive} declares no platform executables, nothing to split")]
    NoExecutables {
        /// Archive path
        archive: PathBuf,
    },

    /// A produced bundle does not contain exactly the expected binary
    #[error("wrong platform binary in {archive}: expected [{expected}], found {found:?}")]
    WrongContents {
        /// Bundle path
        archive: PathBuf,
        /// Binary that should be the only one present
        expected: String,
        /// Binaries actually present
        found: Vec<String>,
    },

    /// The archive could not be read as gzip-compressed tar
    #[error("failed to read archive {archive}: {reason}")]
    InvalidArchive {
        /// Archive path
        archive: PathBuf,
        /// What went wrong
        reason: String,
    },
}

/// Remote signing errors
#[derive(Error, Debug)]
pub enum SigningError {
    /// Connecting to the signing host failed
    #[error("failed to connect to signing host {host}: {reason}")]
    ConnectFailed {
        /// Host name
        host: String,
        /// What went wrong
        reason: String,
    },

    /// The server presented a host key other than the pinned one
    #[error("host key for {host} does not match the pinned public key")]
    HostKeyMismatch {
        /// Host name
        host: String,
    },

    /// Public-key authentication was rejected
    #[error("authentication failed for {user}@{host}")]
    AuthenticationFailed {
        /// SSH user
        user: String,
        /// Host name
        host: String,
    },

    /// The remote signing command exited nonzero
    #[error("remote command '{command}' failed with exit code {exit_code}: {stderr}")]
    RemoteCommandFailed {
        /// Command that ran
        command: String,
        /// Remote exit code
        exit_code: i32,
        /// Captured remote stderr
        stderr: String,
    },

    /// SSH transport error
    #[error("SSH transport error: {0}")]
    Transport(#[from] ssh2::Error),

    /// Local IO while staging or fetching files
    #[error("IO error while signing: {0}")]
    Io(#[from] std::io::Error),
}

/// Signature verification errors
#[derive(Error, Debug)]
pub enum VerifyError {
    /// The detached signature file is missing or unreadable
    #[error("cannot read signature for {path}: {reason}")]
    MissingSignature {
        /// Signed file path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// The signature does not verify against the trusted key
    #[error("signature check failed for {path}: {reason}")]
    BadSignature {
        /// Signed file path
        path: PathBuf,
        /// Underlying cryptographic error
        reason: String,
    },

    /// The trusted public key could not be parsed
    #[error("cannot load trusted public key: {0}")]
    Key(String),
}

/// Publishing errors
#[derive(Error, Debug)]
pub enum PublishError {
    /// A release-asset upload failed
    #[error("failed to upload asset '{asset}': {reason}")]
    UploadFailed {
        /// Asset name
        asset: String,
        /// What went wrong
        reason: String,
    },

    /// An object-store put failed
    #[error("failed to store object at '{key}': {reason}")]
    StoreFailed {
        /// Object key
        key: String,
        /// What went wrong
        reason: String,
    },
}

/// Command layer errors
#[derive(Error, Debug)]
pub enum CommandError {
    /// The tag is not a valid release tag
    #[error("invalid tag '{tag}': {reason}")]
    InvalidTag {
        /// Offending tag
        tag: String,
        /// Why it was rejected
        reason: String,
    },

    /// No repository name was supplied
    #[error("plugin repository must not be empty")]
    EmptyRepository,

    /// The repository does not exist (or is outside the org)
    #[error("repository '{repo}' does not exist or is not part of the org")]
    UnknownRepository {
        /// Repository that was looked up
        repo: String,
    },

    /// A workflow for this (repo, tag) pair is already running
    #[error("a release for {repo} {tag} is already in flight")]
    ReleaseInFlight {
        /// Repository name
        repo: String,
        /// Tag name
        tag: String,
    },
}
