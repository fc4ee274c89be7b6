//! Normalization of picture references reported by access terminals.
//!
//! Terminals report captured pictures either as a bare resource path or as a
//! full URL carrying a `@WEB...` suffix, e.g.
//! `http://192.168.1.10/LOCALS/pic/acsLinkCap/202601_00/07_051227_30075_0.jpeg@WEB000000001234`.

use regex::Regex;
use url::Url;

use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureRef {
    /// Host (and port, when not the default) taken from a full URL.
    pub host: Option<String>,
    /// Resource path, always starting with `/`.
    pub path: String,
}

impl PictureRef {
    pub fn parse(input: &str) -> Result<Self, FetchError> {
        let trimmed = input.trim();

        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Self::from_url(trimmed);
        }

        let path = strip_suffix(trimmed);
        if !path.starts_with('/') {
            return Err(FetchError::Config(format!(
                "resource path must begin with '/': {}",
                path
            )));
        }

        Ok(Self {
            host: None,
            path: path.to_string(),
        })
    }

    // The URL is parsed before the `@WEB...` suffix is cut, so user info in
    // the authority does not get mistaken for it. Only the pathname is kept.
    fn from_url(raw: &str) -> Result<Self, FetchError> {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(source) => {
                return match locals_path(raw) {
                    Some(path) => {
                        log::warn!("Unparsable picture URL {}, using path {}", raw, path);
                        Ok(Self { host: None, path })
                    }
                    None => Err(FetchError::InvalidUrl {
                        url: raw.to_string(),
                        source,
                    }),
                };
            }
        };

        let host = url.host_str().map(|host| match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        });
        let path = strip_suffix(url.path()).to_string();

        log::debug!("Picture URL {} resolved to host {:?}, path {}", raw, host, path);
        Ok(Self { host, path })
    }
}

fn strip_suffix(path: &str) -> &str {
    match path.find('@') {
        Some(at) => &path[..at],
        None => path,
    }
}

/// Last resort for event URLs the parser rejects: the device picture store.
fn locals_path(raw: &str) -> Option<String> {
    let re = Regex::new(r"/LOCALS/[^@?#]+").ok()?;
    re.find(raw).map(|m| m.as_str().to_string())
}
