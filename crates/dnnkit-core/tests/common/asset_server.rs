//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves static bodies by path and counts GET requests per path. A Drive
//! route answers without `confirm` with a warning page and a
//! `download_warning_*` cookie, and with the right `confirm` with the file.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Route {
    Static(Vec<u8>),
    Drive { token: String, body: Vec<u8> },
}

#[derive(Debug, Default)]
pub struct AssetServerBuilder {
    routes: HashMap<String, Route>,
}

impl AssetServerBuilder {
    /// Serves `body` at `path` (e.g. "/models/a.bin").
    pub fn file(mut self, path: &str, body: impl Into<Vec<u8>>) -> Self {
        self.routes.insert(path.to_string(), Route::Static(body.into()));
        self
    }

    /// Drive-style route: confirmation cookie first, `body` on confirm.
    pub fn drive(mut self, path: &str, token: &str, body: impl Into<Vec<u8>>) -> Self {
        self.routes.insert(
            path.to_string(),
            Route::Drive {
                token: token.to_string(),
                body: body.into(),
            },
        );
        self
    }

    pub fn start(self) -> AssetServer {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let routes = Arc::new(self.routes);
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let server_hits = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let routes = Arc::clone(&routes);
                let hits = Arc::clone(&server_hits);
                thread::spawn(move || handle(stream, &routes, &hits));
            }
        });
        AssetServer {
            base: format!("http://127.0.0.1:{}", port),
            hits,
        }
    }
}

/// Handle to a running server. The server lives until the process exits.
#[derive(Debug, Clone)]
pub struct AssetServer {
    base: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl AssetServer {
    pub fn builder() -> AssetServerBuilder {
        AssetServerBuilder::default()
    }

    /// Absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// GET requests seen for `path`, query string ignored.
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }
}

fn handle(mut stream: TcpStream, routes: &HashMap<String, Route>, hits: &Mutex<HashMap<String, usize>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, target) = parse_request_line(request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    *hits.lock().unwrap().entry(path.to_string()).or_default() += 1;

    match routes.get(path) {
        Some(Route::Static(body)) => respond(&mut stream, "200 OK", "", body),
        Some(Route::Drive { token, body }) => {
            let confirmed = query
                .split('&')
                .any(|kv| kv == format!("confirm={}", token));
            if confirmed {
                respond(&mut stream, "200 OK", "", body);
            } else {
                let cookie = format!(
                    "Set-Cookie: download_warning_13058876669334088843_test={}; Path=/\r\n",
                    token
                );
                respond(
                    &mut stream,
                    "200 OK",
                    &cookie,
                    b"<html>Google Drive can't scan this file for viruses.</html>",
                );
            }
        }
        None => respond(&mut stream, "404 Not Found", "", b"not found"),
    }
}

fn respond(stream: &mut TcpStream, status: &str, extra_headers: &str, body: &[u8]) {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
        status,
        body.len(),
        extra_headers
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}

/// Returns (method, request target) of the first request line.
fn parse_request_line(request: &str) -> (&str, &str) {
    let line = request.lines().next().unwrap_or("");
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("/");
    (method, target)
}
