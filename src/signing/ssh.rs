//! Signing client over an authenticated secure-shell channel.

use crate::config::SigningConfig;
use crate::error::{ConfigError, Result, SigningError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{debug, info};
use ssh2::Session;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Milliseconds before a blocking SSH call is abandoned.
const SESSION_TIMEOUT_MS: u32 = 120_000;

/// Everything below the trait boundary deals in [`SigningError`] so both
/// transport and local IO failures propagate with `?`.
type SignResult<T> = std::result::Result<T, SigningError>;

/// Signs files by shipping them to a remote signing host over SSH/SFTP.
///
/// The server's host key is checked against the pinned configured key
/// before authentication; an unset pin is a configuration error, not a
/// silent fallback to an unverified connection.
#[derive(Debug)]
pub struct SshSigner {
    config: SigningConfig,
    pinned_host_key: Vec<u8>,
}

impl SshSigner {
    /// Build a signer, validating the host-key pin up front.
    pub fn new(config: SigningConfig) -> Result<Self> {
        if config.host_public_key.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "signing.host_public_key".to_string(),
                reason: "connecting without host-key verification is not acceptable".to_string(),
            }
            .into());
        }
        let pinned_host_key =
            decode_host_key(&config.host_public_key).ok_or_else(|| ConfigError::InvalidField {
                field: "signing.host_public_key".to_string(),
                reason: "no base64 key blob found in the configured value".to_string(),
            })?;
        Ok(Self {
            config,
            pinned_host_key,
        })
    }
}

#[async_trait]
impl super::Signer for SshSigner {
    async fn sign(&self, files: &[PathBuf]) -> Result<HashMap<PathBuf, PathBuf>> {
        let config = self.config.clone();
        let pinned = self.pinned_host_key.clone();
        let files = files.to_vec();
        let signatures = tokio::task::spawn_blocking(move || sign_batch(&config, &pinned, &files))
            .await
            .map_err(|e| SigningError::Io(std::io::Error::other(e)))??;
        Ok(signatures)
    }

    async fn remove_staged(&self, files: &[PathBuf]) -> Result<()> {
        let config = self.config.clone();
        let pinned = self.pinned_host_key.clone();
        let files = files.to_vec();
        tokio::task::spawn_blocking(move || remove_batch(&config, &pinned, &files))
            .await
            .map_err(|e| SigningError::Io(std::io::Error::other(e)))??;
        Ok(())
    }
}

/// Upload, sign and fetch one batch of files.
///
/// State per file: local → uploaded to staging → signed remotely →
/// signature fetched locally. Staged copies are left in place here;
/// the caller removes them only after verification.
fn sign_batch(
    config: &SigningConfig,
    pinned: &[u8],
    files: &[PathBuf],
) -> SignResult<HashMap<PathBuf, PathBuf>> {
    let remote_paths = upload_to_staging(config, pinned, files)?;
    sign_remote_files(config, pinned, &remote_paths)?;
    fetch_signatures(config, pinned, files)
}

fn upload_to_staging(
    config: &SigningConfig,
    pinned: &[u8],
    files: &[PathBuf],
) -> SignResult<Vec<PathBuf>> {
    info!("copying {} file(s) to the signing host", files.len());
    let session = connect(config, pinned)?;
    let sftp = session.sftp()?;

    let mut remote_paths = Vec::with_capacity(files.len());
    for file in files {
        let remote = config.staging_dir.join(base_name(file)?);
        info!("{} -> {}", file.display(), remote.display());

        let mut local = File::open(file)?;
        let mut staged = sftp.create(&remote)?;
        std::io::copy(&mut local, &mut staged)?;
        remote_paths.push(remote);
    }
    info!("done copying");
    Ok(remote_paths)
}

fn sign_remote_files(
    config: &SigningConfig,
    pinned: &[u8],
    remote_paths: &[PathBuf],
) -> SignResult<()> {
    let session = connect(config, pinned)?;

    for remote in remote_paths {
        let command = format!("{} {}", config.sign_command, remote.display());
        info!("signing {}", remote.display());

        let mut channel = session.channel_session()?;
        channel.exec(&command)?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout)?;
        let mut stderr = String::new();
        channel.stderr().read_to_string(&mut stderr)?;
        channel.wait_close()?;
        let exit_code = channel.exit_status()?;

        if !stdout.is_empty() {
            info!("remote stdout: {stdout}");
        }
        if !stderr.is_empty() {
            info!("remote stderr: {stderr}");
        }
        if exit_code != 0 {
            return Err(SigningError::RemoteCommandFailed {
                command,
                exit_code,
                stderr,
            });
        }
    }
    info!("done signing");
    Ok(())
}

fn fetch_signatures(
    config: &SigningConfig,
    pinned: &[u8],
    files: &[PathBuf],
) -> SignResult<HashMap<PathBuf, PathBuf>> {
    info!("fetching signatures from the signing host");
    let session = connect(config, pinned)?;
    let sftp = session.sftp()?;

    let mut signatures = HashMap::with_capacity(files.len());
    for file in files {
        let remote_sig = config
            .output_dir
            .join(format!("{}.sig", base_name(file)?.to_string_lossy()));
        let local_sig = PathBuf::from(format!("{}.sig", file.display()));
        info!("{} -> {}", remote_sig.display(), local_sig.display());

        let mut staged = sftp.open(&remote_sig)?;
        let mut local = File::create(&local_sig)?;
        std::io::copy(&mut staged, &mut local)?;
        signatures.insert(file.clone(), local_sig);
    }
    info!("done fetching signatures");
    Ok(signatures)
}

fn remove_batch(config: &SigningConfig, pinned: &[u8], files: &[PathBuf]) -> SignResult<()> {
    info!("removing staged files from the signing host");
    let session = connect(config, pinned)?;
    let sftp = session.sftp()?;

    for file in files {
        let remote = config.staging_dir.join(base_name(file)?);
        sftp.unlink(&remote)?;
        debug!("removed {}", remote.display());
    }
    Ok(())
}

/// Open an authenticated session, verifying the pinned host key first.
fn connect(config: &SigningConfig, pinned: &[u8]) -> SignResult<Session> {
    let address = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| connect_failed(config, &e))?
        .next()
        .ok_or_else(|| SigningError::ConnectFailed {
            host: config.host.clone(),
            reason: "host name resolved to no addresses".to_string(),
        })?;
    let tcp = TcpStream::connect_timeout(&address, CONNECT_TIMEOUT)
        .map_err(|e| connect_failed(config, &e))?;

    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session.set_timeout(SESSION_TIMEOUT_MS);
    session.handshake()?;

    let (host_key, _) = session
        .host_key()
        .ok_or_else(|| SigningError::ConnectFailed {
            host: config.host.clone(),
            reason: "server presented no host key".to_string(),
        })?;
    if host_key != pinned {
        return Err(SigningError::HostKeyMismatch {
            host: config.host.clone(),
        });
    }

    session.userauth_pubkey_file(
        &config.user,
        config.certificate_path.as_deref(),
        &config.private_key_path,
        None,
    )?;
    if !session.authenticated() {
        return Err(SigningError::AuthenticationFailed {
            user: config.user.clone(),
            host: config.host.clone(),
        });
    }
    Ok(session)
}

fn connect_failed(config: &SigningConfig, err: &dyn std::fmt::Display) -> SigningError {
    SigningError::ConnectFailed {
        host: config.host.clone(),
        reason: err.to_string(),
    }
}

fn base_name(file: &Path) -> SignResult<&std::ffi::OsStr> {
    file.file_name().ok_or_else(|| {
        SigningError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("path {} has no file name", file.display()),
        ))
    })
}

/// Extract the raw key blob from a `<type> <base64> [comment]` entry.
///
/// The first whitespace-separated token that decodes as base64 is taken
/// as the key blob, so bare base64 values work as well.
fn decode_host_key(entry: &str) -> Option<Vec<u8>> {
    entry
        .split_whitespace()
        .find_map(|token| BASE64.decode(token).ok())
}
