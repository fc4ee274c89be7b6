use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::FetchError;
use crate::picture::PictureRef;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_OUTPUT: &str = "face.jpg";
pub const CONFIG_FILE_NAME: &str = "config.json";

/// One source of connection parameters: the config file, the environment or
/// the command line. Unset fields fall through to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "path")]
    pub resource_path: Option<String>,
    pub timeout_secs: Option<u64>,
    pub output: Option<PathBuf>,
}

impl ConfigLayer {
    pub fn from_file(path: &Path) -> Result<Self, FetchError> {
        log::info!("Loading config from: {:?}", path);

        let text = fs::read_to_string(path).map_err(|source| FetchError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|source| FetchError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns a layer where every field set in `over` wins.
    pub fn merge(self, over: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            host: over.host.or(self.host),
            username: over.username.or(self.username),
            password: over.password.or(self.password),
            resource_path: over.resource_path.or(self.resource_path),
            timeout_secs: over.timeout_secs.or(self.timeout_secs),
            output: over.output.or(self.output),
        }
    }

    pub fn resolve(self) -> Result<FetchConfig, FetchError> {
        let raw_path = self
            .resource_path
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| FetchError::Config("resource path is required".into()))?;
        let picture = PictureRef::parse(&raw_path)?;

        let host = self
            .host
            .filter(|h| !h.trim().is_empty())
            .or(picture.host)
            .ok_or_else(|| FetchError::Config("host is required".into()))?;

        let username = self
            .username
            .ok_or_else(|| FetchError::Config("username is required".into()))?;

        let config = FetchConfig {
            host: host.trim().to_string(),
            username,
            password: self.password.unwrap_or_default(),
            resource_path: picture.path,
            timeout: Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            output: self.output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
        };

        config.validate()?;
        Ok(config)
    }
}

/// `<config_dir>/face-fetch/config.json`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| {
        dirs.config_dir()
            .join("face-fetch")
            .join(CONFIG_FILE_NAME)
    })
}

#[derive(Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub resource_path: String,
    pub timeout: Duration,
    pub output: PathBuf,
}

impl FetchConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        resource_path: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            resource_path: resource_path.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn validate(&self) -> Result<(), FetchError> {
        if self.host.is_empty() {
            return Err(FetchError::Config("host is empty".into()));
        }

        if self.host.contains('/') {
            return Err(FetchError::Config(format!(
                "host must not contain a path or scheme: {}",
                self.host
            )));
        }

        if self.username.is_empty() {
            return Err(FetchError::Config("username is empty".into()));
        }

        if !self.resource_path.starts_with('/') {
            return Err(FetchError::Config(format!(
                "resource path must begin with '/': {}",
                self.resource_path
            )));
        }

        if self.timeout.is_zero() {
            return Err(FetchError::Config("timeout must be greater than zero".into()));
        }

        if self.output.as_os_str().is_empty() {
            return Err(FetchError::Config("output path is empty".into()));
        }

        Ok(())
    }

    pub fn target_url(&self) -> Result<Url, FetchError> {
        let raw = format!("http://{}{}", self.host, self.resource_path);
        Url::parse(&raw).map_err(|source| FetchError::InvalidUrl { url: raw, source })
    }
}

impl fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("resource_path", &self.resource_path)
            .field("timeout", &self.timeout)
            .field("output", &self.output)
            .finish()
    }
}
