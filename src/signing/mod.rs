//! Remote signing and signature verification.
//!
//! The [`Signer`] trait covers shipping artifacts to the signing host and
//! fetching their detached signatures; [`SignatureVerifier`] checks the
//! results against the embedded trusted key. Removal of staged remote
//! copies is a separate step the orchestrator runs only after
//! verification succeeds, so a failed verification never destroys the
//! only remote copy.

mod ssh;
mod verify;

pub use ssh::SshSigner;
pub use verify::{SignatureVerifier, SIGNATURE_SUFFIX};

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

/// Signs local files on the remote signing host.
///
/// Per file the flow is: upload to the staging path, invoke the remote
/// signing command, download `<file>.sig` next to the local file. Any
/// failure aborts the whole batch and leaves staged remote files in
/// place for manual inspection.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign every file, returning a local file → signature path map.
    async fn sign(&self, files: &[PathBuf]) -> Result<HashMap<PathBuf, PathBuf>>;

    /// Remove the staged remote copies of previously signed files.
    async fn remove_staged(&self, files: &[PathBuf]) -> Result<()>;
}
