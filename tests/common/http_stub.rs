//! A tiny HTTP/1.1 server with canned responses.
//!
//! Enough for the blocking reqwest clients: one request per connection,
//! `Connection: close`, bodies sized by `Content-Length`.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Clone, Debug)]
pub struct Route {
    pub method: &'static str,
    /// Exact path, query string excluded.
    pub path: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// When set, requests without `Authorization: Bearer <token>` get a 401
    /// carrying `challenge` as `WWW-Authenticate`.
    pub bearer: Option<(String, String)>,
}

impl Route {
    pub fn new(method: &'static str, path: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method,
            path: path.into(),
            status,
            headers: Vec::new(),
            body: body.into(),
            bearer: None,
        }
    }

    pub fn json(method: &'static str, path: impl Into<String>, status: u16, body: &serde_json::Value) -> Self {
        Self::new(method, path, status, body.to_string()).header("Content-Type", "application/json")
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn bearer(mut self, token: &str, challenge: &str) -> Self {
        self.bearer = Some((token.to_owned(), challenge.to_owned()));
        self
    }
}

#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: String,
    /// Path including any query string.
    pub target: String,
    pub authorization: Option<String>,
    pub body: String,
}

pub struct HttpStub {
    pub url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl HttpStub {
    /// Bind to an ephemeral localhost port and serve the routes built from
    /// the stub's base URL until the test process exits. Unknown paths get
    /// a 404 with an empty body.
    pub fn start(routes: impl FnOnce(&str) -> Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub listener");
        let url = format!("http://{}", listener.local_addr().unwrap());
        let routes = routes(&url);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                serve(stream, &routes, &log);
            }
        });
        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

fn serve(mut stream: TcpStream, routes: &[Route], log: &Mutex<Vec<Recorded>>) {
    let Some(request) = read_request(&stream) else {
        return;
    };
    log.lock().unwrap().push(request.clone());

    let path = request.target.split('?').next().unwrap_or_default();
    let route = routes
        .iter()
        .find(|r| r.method == request.method && r.path == path);
    let response = match route {
        None => respond(404, &[], b""),
        Some(route) => match &route.bearer {
            Some((token, challenge))
                if request.authorization.as_deref() != Some(format!("Bearer {token}").as_str()) =>
            {
                respond(401, &[("WWW-Authenticate".to_owned(), challenge.clone())], b"")
            }
            _ => respond(route.status, &route.headers, &route.body),
        },
    };
    let _ = stream.write_all(&response);
    let _ = stream.flush();
}

fn read_request(stream: &TcpStream) -> Option<Recorded> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_owned();
    let target = parts.next()?.to_owned();

    let mut content_length = 0;
    let mut authorization = None;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("authorization") {
                authorization = Some(value.to_owned());
            }
        }
    }
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).ok()?;
    Some(Recorded {
        method,
        target,
        authorization,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn respond(status: u16, headers: &[(String, String)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status} {}\r\n", reason(status));
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n", body.len()));
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        401 => "Unauthorized",
        404 => "Not Found",
        409 => "Conflict",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

/// The OCI digest of `bytes`, in the `sha256:<hex>` form registries use.
pub fn oci_digest(bytes: &[u8]) -> String {
    let hash = nebi_store::content_hash(bytes);
    format!("sha256:{}", hash.trim_start_matches("sha-"))
}
