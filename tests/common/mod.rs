//! In-process stand-in for an access terminal serving pictures over plain
//! HTTP with Digest auth.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use md5::{Digest, Md5};

pub const PICTURE_PATH: &str = "/LOCALS/pic/acsLinkCap/202601_00/07_051227_30075_0.jpeg";
pub const JPEG: &[u8] = b"\xFF\xD8\xFF...fake-jpeg-bytes";
pub const REALM: &str = "DS-K1T671MF";
pub const NONCE: &str = "4e6a4d7a4e7a6b305a4755365a4467314e7a593d";
pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "A112233a";

#[derive(Debug, Clone)]
pub struct Request {
    pub path: String,
    pub headers: HashMap<String, String>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

pub struct Reply {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn new(status: u16, body: &[u8]) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_vec(),
        }
    }

    pub fn challenge() -> Self {
        let mut reply = Self::new(401, b"Unauthorized");
        reply.headers.push((
            "WWW-Authenticate",
            format!(
                r#"Digest qop="auth", realm="{}", nonce="{}", stale="FALSE""#,
                REALM, NONCE
            ),
        ));
        reply
    }

    /// Status line and headers, announcing the full body length.
    pub fn head(&self) -> String {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            reason(self.status),
            self.body.len()
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("\r\n");
        head
    }
}

type Connection = dyn Fn(Request, TcpStream) + Send + Sync;

/// Every connection gets one reply and is closed.
pub struct MockDevice {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl MockDevice {
    pub fn spawn(handler: impl Fn(&Request) -> Reply + Send + Sync + 'static) -> Self {
        Self::spawn_raw(move |request, mut stream| {
            let reply = handler(&request);
            let _ = stream.write_all(reply.head().as_bytes());
            let _ = stream.write_all(&reply.body);
            let _ = stream.flush();
        })
    }

    /// The handler owns the socket and writes the response itself.
    pub fn spawn_raw(handler: impl Fn(Request, TcpStream) + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Connection> = Arc::new(handler);

        let seen = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let handler = Arc::clone(&handler);
                let seen = Arc::clone(&seen);
                thread::spawn(move || {
                    if let Some(request) = read_request(&stream) {
                        seen.lock().unwrap().push(request.clone());
                        handler(request, stream);
                    }
                });
            }
        });

        Self { addr, requests }
    }

    /// Challenges first, then checks the digest the way a terminal would.
    pub fn digest(body: &'static [u8]) -> Self {
        Self::spawn(move |req| match req.header("authorization") {
            Some(auth) if digest_matches(auth, req) => Reply::new(200, body),
            _ => Reply::challenge(),
        })
    }

    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

/// An address nothing listens on.
pub fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn read_request(stream: &TcpStream) -> Option<Request> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Some(Request { path, headers })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Status",
    }
}

fn md5_hex(data: &str) -> String {
    hex::encode(Md5::digest(data.as_bytes()))
}

pub fn digest_matches(auth: &str, req: &Request) -> bool {
    let Some(params) = auth.strip_prefix("Digest ") else {
        return false;
    };

    let params: HashMap<&str, &str> = params
        .split(", ")
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim().trim_matches('"')))
        .collect();

    let get = |key: &str| params.get(key).copied().unwrap_or_default();
    if get("username") != USERNAME || get("realm") != REALM || get("nonce") != NONCE {
        return false;
    }
    if get("uri") != req.path || get("qop") != "auth" {
        return false;
    }

    let ha1 = md5_hex(&format!("{}:{}:{}", USERNAME, REALM, PASSWORD));
    let ha2 = md5_hex(&format!("GET:{}", get("uri")));
    let expected = md5_hex(&format!(
        "{}:{}:{}:{}:auth:{}",
        ha1,
        NONCE,
        get("nc"),
        get("cnonce"),
        ha2
    ));

    get("response") == expected
}
