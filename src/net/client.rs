// src/net/client.rs

//! HTTP client built on the session/connection/request handles
//!
//! Adds what individual requests leave to the caller: following redirects
//! through the status observer, status checks and bounded body reads.

use super::headers::{content_length, Headers};
use super::request::Request;
use super::response::MinimalResponse;
use super::session::{make_session, Method, ProxyConfig, RequestFlags, Session, SessionOptions};
use super::status::StatusContext;
use super::url::Url;
use crate::config::Config;
use crate::error::{Error, Result};
use std::io::{self, Read};
use std::time::Duration;
use tracing::{debug, info};

/// Redirect hops followed before giving up
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Largest body `get_bytes`/`post_bytes` will buffer (64 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

/// Client behaviour layered over the session
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub max_redirects: usize,
    pub max_body_size: usize,
    /// Skip certificate validation on every request
    pub insecure: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            insecure: false,
        }
    }
}

/// Everything sent with a request besides method and URL
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub headers: Headers,
    pub cookies: Vec<String>,
    /// Resume from this byte offset when positive
    pub resume_offset: i64,
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Response whose head has been read; the body is still on the wire
pub struct HttpResponse<'s> {
    /// URL that produced this response, after redirects
    pub url: Url,
    pub head: MinimalResponse,
    request: Request<'s>,
}

impl HttpResponse<'_> {
    pub fn status(&self) -> u16 {
        self.head.status_code
    }

    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    /// `Content-Length`, or -1 when unknown
    pub fn content_length(&self) -> i64 {
        content_length(&self.head.headers)
    }

    /// Fail with `HttpStatus` unless the status is 2xx
    pub fn error_for_status(self) -> Result<Self> {
        if self.head.is_success() {
            Ok(self)
        } else {
            Err(Error::HttpStatus {
                url: self.url.to_string(),
                status: self.head.status_code,
                text: self.head.status_text,
            })
        }
    }

    /// Read the whole body, never more than `max_body_size` bytes
    pub fn bytes(mut self, max_body_size: usize) -> Result<Vec<u8>> {
        let expected = self.content_length();
        self.request.recv_completely(expected, max_body_size)
    }
}

impl Read for HttpResponse<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.request.read(buf)
    }
}

/// Headers withheld from redirects to another origin
const SENSITIVE_HEADERS: [&str; 3] = ["Cookie", "Authorization", "Proxy-Authorization"];

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme == b.scheme && a.port == b.port && a.host.eq_ignore_ascii_case(&b.host)
}

/// Redirect-following HTTP client
#[derive(Debug)]
pub struct HttpClient {
    session: Session,
    options: ClientOptions,
}

impl HttpClient {
    pub fn new(session: Session, options: ClientOptions) -> Self {
        Self { session, options }
    }

    /// Build a session and client from the loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut session_options = SessionOptions {
            connect_timeout: Duration::from_secs(config.transport.connect_timeout_secs),
            read_timeout: Duration::from_secs(config.transport.read_timeout_secs),
            debug: config.debug,
            ..Default::default()
        };
        if let Some(proxy) = &config.proxy {
            session_options.proxy = ProxyConfig::explicit(proxy)?;
        }
        let session = make_session(&config.user_agent, session_options)?;
        Ok(Self::new(
            session,
            ClientOptions {
                max_redirects: config.transport.max_redirects,
                max_body_size: config.transport.max_body_size,
                insecure: config.insecure,
            },
        ))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Send a request and follow redirects until a non-redirect response
    ///
    /// A 303 turns the follow-up into a body-less GET; other redirects
    /// repeat the original method and body. Cookies and credentials are not
    /// forwarded once a redirect leaves the original scheme, host and port.
    pub fn send(&self, method: Method, url: &Url, send: &SendOptions) -> Result<HttpResponse<'_>> {
        let mut current = url.clone();
        let mut method = method;
        let mut body: &[u8] = &send.body;
        let mut headers = send.headers.clone();
        let mut cookies: &[String] = &send.cookies;

        for hop in 0..=self.options.max_redirects {
            let mut request = self.open(method, &current)?;
            request.write_headers(&headers, cookies, send.resume_offset)?;
            request.write_body(body, &send.content_type)?;
            let head = request.recv_minimal_response()?;

            if head.is_redirect() {
                let next = request
                    .take_status_context()
                    .and_then(|ctx| ctx.location_url(&current));
                if let Some(next) = next {
                    info!("{} {} redirected to {} (hop {})", head.status_code, current, next, hop + 1);
                    if head.status_code == 303 {
                        method = Method::Get;
                        body = &[];
                    }
                    if !same_origin(url, &next) {
                        for name in SENSITIVE_HEADERS {
                            headers.remove(name);
                        }
                        cookies = &[];
                    }
                    current = next;
                    continue;
                }
                debug!("{} without usable Location from {}", head.status_code, current);
            }

            return Ok(HttpResponse {
                url: current,
                head,
                request,
            });
        }

        Err(Error::transport_msg(format!(
            "too many redirects (>{}) starting at {}",
            self.options.max_redirects, url
        )))
    }

    fn open(&self, method: Method, url: &Url) -> Result<Request<'_>> {
        let connection = self.session.connect(&url.host, url.port)?;
        let mut request = connection.open_request(method, &url.uri, RequestFlags::for_url(url))?;
        if self.options.insecure {
            request.set_insecure_mode();
        }
        request.set_status_context(StatusContext::new(self.session.options().debug));
        Ok(request)
    }

    /// GET a URL into memory
    pub fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let url = Url::parse(url)?;
        let response = self
            .send(Method::Get, &url, &SendOptions::default())?
            .error_for_status()?;
        response.bytes(self.options.max_body_size)
    }

    /// POST a body and read the response into memory
    pub fn post_bytes(&self, url: &str, body: &[u8], content_type: &str) -> Result<Vec<u8>> {
        let url = Url::parse(url)?;
        let send = SendOptions {
            body: body.to_vec(),
            content_type: content_type.to_string(),
            ..Default::default()
        };
        let response = self.send(Method::Post, &url, &send)?.error_for_status()?;
        response.bytes(self.options.max_body_size)
    }

    /// Fetch only the response head
    pub fn head(&self, url: &str) -> Result<MinimalResponse> {
        let url = Url::parse(url)?;
        let response = self.send(Method::Head, &url, &SendOptions::default())?;
        Ok(response.head)
    }
}
