use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, Response};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::config::FetchConfig;
use crate::digest::{self, Challenge};
use crate::error::FetchError;

/// What happened after the device answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Status 200; the body now fully occupies `path`.
    Saved { path: PathBuf, bytes: usize },
    /// Any other status; nothing was written.
    Rejected { status: u16 },
}

impl FetchOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, FetchOutcome::Saved { .. })
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOutcome::Saved { path, .. } => {
                write!(f, "Image saved (digest auth): {}", path.display())
            }
            FetchOutcome::Rejected { status } => write!(f, "Request failed with status: {}", status),
        }
    }
}

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Performs the GET (answering a Digest challenge if the device sends
    /// one) and writes the body to the output path on status 200.
    pub fn fetch(&self) -> Result<FetchOutcome, FetchError> {
        let url = self.config.target_url()?;
        let timeout = self.config.timeout;
        let deadline = Instant::now() + timeout;

        log::info!("Fetching {} as {}", url, self.config.username);

        let first = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| FetchError::from_transport(url.as_str(), timeout, e))?;

        let challenge = if first.status() == StatusCode::UNAUTHORIZED {
            let challenge = Challenge::from_headers(first.headers())?;
            if challenge.is_none() {
                log::warn!("Device answered 401 without a Digest challenge");
            }
            challenge
        } else {
            None
        };

        let response = match challenge {
            Some(challenge) => {
                log::debug!(
                    "Digest challenge: realm {:?}, algorithm {:?}, qop {:?}",
                    challenge.realm,
                    challenge.algorithm,
                    challenge.qop
                );
                drop(first);

                // the resend only gets what is left of the overall deadline
                let remaining = deadline
                    .checked_duration_since(Instant::now())
                    .filter(|d| !d.is_zero())
                    .ok_or_else(|| FetchError::Timeout {
                        url: url.to_string(),
                        timeout,
                    })?;

                let authorization = challenge.authorization(
                    &self.config.username,
                    &self.config.password,
                    "GET",
                    &digest::request_uri(&url),
                )?;

                self.client
                    .get(url.clone())
                    .header(AUTHORIZATION, authorization)
                    .timeout(remaining)
                    .send()
                    .map_err(|e| FetchError::from_transport(url.as_str(), timeout, e))?
            }
            None => first,
        };

        self.finish(url.as_str(), response, deadline)
    }

    fn finish(
        &self,
        url: &str,
        response: Response,
        deadline: Instant,
    ) -> Result<FetchOutcome, FetchError> {
        let status = response.status();
        if status != StatusCode::OK {
            log::warn!("Fetch of {} failed with status: {}", url, status);
            return Ok(FetchOutcome::Rejected {
                status: status.as_u16(),
            });
        }

        let bytes = read_body(response, deadline, url, self.config.timeout)?;

        save_atomically(&self.config.output, &bytes)?;

        log::info!(
            "Saved {} bytes to {:?} (sha256 {})",
            bytes.len(),
            self.config.output,
            hex::encode(Sha256::digest(&bytes))
        );

        Ok(FetchOutcome::Saved {
            path: self.config.output.clone(),
            bytes: bytes.len(),
        })
    }
}

/// Reads the body in chunks so a slow sender cannot stretch the request past
/// `deadline`; each blocking read on its own only has a per-read timeout.
fn read_body(
    mut response: Response,
    deadline: Instant,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    let timed_out = || FetchError::Timeout {
        url: url.to_string(),
        timeout,
    };

    let mut body = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        if Instant::now() >= deadline {
            return Err(timed_out());
        }

        match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_read_timeout(&e) => return Err(timed_out()),
            Err(source) => {
                return Err(FetchError::Body {
                    url: url.to_string(),
                    source,
                })
            }
        }
    }

    if Instant::now() >= deadline {
        return Err(timed_out());
    }

    Ok(body)
}

fn is_read_timeout(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::TimedOut
        || err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
            .is_some_and(reqwest::Error::is_timeout)
}

/// Writes `bytes` next to `path` and renames over it, so readers see either
/// the previous file or the complete new one.
pub fn save_atomically(path: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    let fs_error = |source| FetchError::Filesystem {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir).map_err(fs_error)?;
    file.write_all(bytes).map_err(fs_error)?;
    file.as_file().sync_all().map_err(fs_error)?;
    file.persist(path).map_err(|e| fs_error(e.error))?;

    Ok(())
}
