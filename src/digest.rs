//! HTTP Digest Authentication (RFC 2617, RFC 7616), client side.
//!
//! Only what a single authenticated GET needs: parse the `WWW-Authenticate`
//! challenge from a 401 and compute the matching `Authorization` value. The
//! nonce count is always 1 because each challenge answers exactly one request.

use md5::Md5;
use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};
use sha2::{Digest, Sha256, Sha512_256};
use url::Url;

use crate::error::FetchError;

const NONCE_COUNT: &str = "00000001";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Sha256,
    Sha512_256,
}

impl Algorithm {
    fn hash(self, data: &str) -> String {
        match self {
            Algorithm::Md5 => hex_digest::<Md5>(data),
            Algorithm::Sha256 => hex_digest::<Sha256>(data),
            Algorithm::Sha512_256 => hex_digest::<Sha512_256>(data),
        }
    }
}

fn hex_digest<D: Digest>(data: &str) -> String {
    hex::encode(D::digest(data.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: Algorithm,
    /// `-sess` variant: HA1 is rehashed with the nonces.
    pub session: bool,
    /// Algorithm token exactly as the server sent it, echoed back.
    pub algorithm_name: Option<String>,
    pub qop: Vec<String>,
    pub stale: bool,
}

impl Challenge {
    /// Picks the Digest challenge out of every `WWW-Authenticate` header.
    ///
    /// `Ok(None)` means the server asked for some other scheme (or none).
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<Self>, FetchError> {
        for value in headers.get_all(WWW_AUTHENTICATE) {
            let Ok(value) = value.to_str() else {
                log::warn!("Ignoring non-ASCII WWW-Authenticate header");
                continue;
            };

            if let Some(challenge) = Self::parse(value)? {
                return Ok(Some(challenge));
            }
        }

        Ok(None)
    }

    pub fn parse(value: &str) -> Result<Option<Self>, FetchError> {
        match parse_challenges(value)
            .into_iter()
            .find(|c| c.scheme.eq_ignore_ascii_case("digest"))
        {
            Some(raw) => Self::from_params(&raw.params).map(Some),
            None => Ok(None),
        }
    }

    fn from_params(params: &[(String, String)]) -> Result<Self, FetchError> {
        let param = |name: &str| {
            params
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };

        let nonce = param("nonce")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| FetchError::UnsupportedChallenge("missing nonce".into()))?;

        let algorithm_name = param("algorithm");
        let (algorithm, session) = match &algorithm_name {
            Some(name) => parse_algorithm(name)?,
            None => (Algorithm::Md5, false),
        };

        let qop = param("qop")
            .map(|raw| {
                raw.split(',')
                    .map(|q| q.trim().to_ascii_lowercase())
                    .filter(|q| !q.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            realm: param("realm").unwrap_or_default(),
            nonce,
            opaque: param("opaque"),
            algorithm,
            session,
            algorithm_name,
            qop,
            stale: param("stale").is_some_and(|s| s.eq_ignore_ascii_case("true")),
        })
    }

    /// `Authorization` header value for `method uri` with a fresh client nonce.
    pub fn authorization(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
    ) -> Result<String, FetchError> {
        let cnonce = hex::encode(rand::random::<[u8; 8]>());
        self.authorization_with_cnonce(username, password, method, uri, &cnonce)
    }

    pub fn authorization_with_cnonce(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        cnonce: &str,
    ) -> Result<String, FetchError> {
        let qop = self.select_qop()?;
        let h = |data: String| self.algorithm.hash(&data);

        let mut ha1 = h(format!("{}:{}:{}", username, self.realm, password));
        if self.session {
            ha1 = h(format!("{}:{}:{}", ha1, self.nonce, cnonce));
        }
        let ha2 = h(format!("{}:{}", method, uri));

        let response = match qop {
            Some(qop) => h(format!(
                "{}:{}:{}:{}:{}:{}",
                ha1, self.nonce, NONCE_COUNT, cnonce, qop, ha2
            )),
            None => h(format!("{}:{}:{}", ha1, self.nonce, ha2)),
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
            escape(username),
            escape(&self.realm),
            escape(&self.nonce),
            escape(uri),
            response
        );

        if let Some(name) = &self.algorithm_name {
            header.push_str(&format!(", algorithm={}", name));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{}\"", escape(opaque)));
        }
        match qop {
            Some(qop) => header.push_str(&format!(
                ", qop={}, nc={}, cnonce=\"{}\"",
                qop, NONCE_COUNT, cnonce
            )),
            None if self.session => header.push_str(&format!(", cnonce=\"{}\"", cnonce)),
            None => {}
        }

        Ok(header)
    }

    fn select_qop(&self) -> Result<Option<&'static str>, FetchError> {
        if self.qop.is_empty() {
            return Ok(None);
        }
        if self.qop.iter().any(|q| q == "auth") {
            return Ok(Some("auth"));
        }
        Err(FetchError::UnsupportedChallenge(format!(
            "qop {} not supported",
            self.qop.join(",")
        )))
    }
}

/// Request-target used as the digest `uri`: path plus query.
pub fn request_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

fn parse_algorithm(name: &str) -> Result<(Algorithm, bool), FetchError> {
    let upper = name.trim().to_ascii_uppercase();
    let (base, session) = match upper.strip_suffix("-SESS") {
        Some(base) => (base, true),
        None => (upper.as_str(), false),
    };

    let algorithm = match base {
        "MD5" => Algorithm::Md5,
        "SHA-256" => Algorithm::Sha256,
        "SHA-512-256" => Algorithm::Sha512_256,
        _ => {
            return Err(FetchError::UnsupportedChallenge(format!(
                "algorithm {} not supported",
                name
            )))
        }
    };

    Ok((algorithm, session))
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Debug)]
struct RawChallenge {
    scheme: String,
    params: Vec<(String, String)>,
}

/// Splits a `WWW-Authenticate` value into challenges. Parameter names are
/// lowercased, quoted values unescaped.
fn parse_challenges(value: &str) -> Vec<RawChallenge> {
    let mut challenges: Vec<RawChallenge> = Vec::new();
    let mut cursor = Cursor::new(value);

    loop {
        cursor.skip_while(|c| c.is_whitespace() || c == ',');
        if cursor.peek().is_none() {
            break;
        }

        let token = cursor.take_while(|c| !c.is_whitespace() && c != ',' && c != '=');
        if token.is_empty() {
            cursor.bump();
            continue;
        }

        cursor.skip_while(char::is_whitespace);
        if cursor.peek() == Some('=') {
            cursor.bump();
            cursor.skip_while(char::is_whitespace);

            let value = if cursor.peek() == Some('"') {
                cursor.bump();
                cursor.quoted()
            } else {
                cursor
                    .take_while(|c| !c.is_whitespace() && c != ',')
                    .to_string()
            };

            if let Some(current) = challenges.last_mut() {
                current.params.push((token.to_ascii_lowercase(), value));
            }
        } else {
            challenges.push(RawChallenge {
                scheme: token.to_string(),
                params: Vec::new(),
            });
        }
    }

    challenges
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.bump();
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        self.skip_while(pred);
        &self.input[start..self.pos]
    }

    // Opening quote already consumed. An unterminated string runs to the end.
    fn quoted(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '"' => break,
                '\\' => {
                    if let Some(escaped) = self.bump() {
                        out.push(escaped);
                    }
                }
                _ => out.push(c),
            }
        }
        out
    }
}
