// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use pallet::net::{make_session, HttpClient, ClientOptions, ProxyConfig, Session, SessionOptions};
use pallet::Bucket;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tempfile::TempDir;

/// Bucket tree under a temp root: `<root>/<bucket>/bucket/<name>.json`
pub struct BucketTree {
    pub dir: TempDir,
    pub buckets: Vec<Bucket>,
}

impl BucketTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            buckets: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Add a descriptor, registering the bucket on first use
    pub fn add(&mut self, bucket: &str, name: &str, json: &str) -> PathBuf {
        if !self.buckets.iter().any(|b| b.name == bucket) {
            self.buckets.push(Bucket::new(bucket));
        }
        let dir = self.dir.path().join(bucket).join("bucket");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{name}.json"));
        fs::write(&path, json).unwrap();
        path
    }
}

/// One request as the server saw it
#[derive(Debug, Clone)]
pub struct Captured {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Loopback HTTP server answering a fixed number of connections
///
/// Every connection carries one request; the handler returns the raw bytes
/// written back before the socket is closed.
pub struct TestServer {
    pub port: u16,
    captured: Arc<Mutex<Vec<Captured>>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn start<F>(connections: usize, handler: F) -> Self
    where
        F: Fn(usize, &Captured, u16) -> Vec<u8> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);

        let handle = thread::spawn(move || {
            for i in 0..connections {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                let Some(request) = read_request(&stream) else {
                    continue;
                };
                let response = handler(i, &request, port);
                sink.lock().unwrap().push(request);
                let mut stream = stream;
                let _ = stream.write_all(&response);
                let _ = stream.flush();
            }
        });

        Self {
            port,
            captured,
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Wait for the server thread and return what it received
    pub fn finish(mut self) -> Vec<Captured> {
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
        self.captured.lock().unwrap().clone()
    }
}

fn read_request(stream: &TcpStream) -> Option<Captured> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.push((k.trim().to_string(), v.trim().to_string()));
        }
    }

    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).ok()?;

    Some(Captured {
        request_line: request_line.trim_end().to_string(),
        headers,
        body,
    })
}

/// Raw response with a `Content-Length` body
pub fn response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status}\r\n");
    for (k, v) in headers {
        out.push_str(&format!("{k}: {v}\r\n"));
    }
    out.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}

/// Session that never consults proxy environment variables
pub fn test_session() -> Session {
    let options = SessionOptions {
        proxy: ProxyConfig::none(),
        ..Default::default()
    };
    make_session("pallet-test/1.0", options).unwrap()
}

pub fn test_client() -> HttpClient {
    HttpClient::new(test_session(), ClientOptions::default())
}

/// Client that sends every request through the proxy at `proxy_url`
pub fn proxied_client(proxy_url: &str) -> HttpClient {
    let options = SessionOptions {
        proxy: ProxyConfig::explicit(proxy_url).unwrap(),
        ..Default::default()
    };
    let session = make_session("pallet-test/1.0", options).unwrap();
    HttpClient::new(session, ClientOptions::default())
}
