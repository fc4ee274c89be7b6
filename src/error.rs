use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Reasons a fetch can fail before an HTTP status is known, or after the
/// payload has been received.
///
/// A non-200 status is not an error; see [`crate::download::FetchOutcome`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read config file {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid target url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("unsupported digest challenge: {0}")]
    UnsupportedChallenge(String),

    #[error("failed to write {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    pub(crate) fn from_transport(url: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout,
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }
}
