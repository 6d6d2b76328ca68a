// src/net/session.rs

//! Transport session and connection handles
//!
//! A `Session` carries the process-wide transport settings: user agent,
//! timeouts, proxy and the TLS client configurations. A `Connection` names a
//! `(host, port)` pair inside a session and opens `Request`s against it. The
//! socket itself is established lazily when a request is sent, so a
//! connection borrows its session and a request borrows the same session;
//! neither can outlive it.

use super::body::read_line;
use super::protocol::{
    protocol_enable, HttpProtocols, ProtocolOptions, ProtocolVersion, Rejected, TlsProtocols,
};
use super::request::Request;
use super::response::parse_status_line;
use super::status::StatusEvent;
use super::url::Url;
use crate::error::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, SignatureScheme, StreamOwned};
use std::fmt;
use std::io::{self, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default read/write timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Byte stream a request talks over (plain TCP or TLS)
pub trait Stream: Read + Write + Send {}

impl<T: Read + Write + Send> Stream for T {}

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
}

impl Method {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFlags {
    /// Encrypt the connection with TLS
    pub secure: bool,
}

impl RequestFlags {
    pub fn for_url(url: &Url) -> Self {
        Self {
            secure: url.is_secure(),
        }
    }
}

/// Proxy selection
///
/// The connection to the proxy itself is always plain TCP; HTTPS targets are
/// tunnelled with `CONNECT`.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    explicit: Option<Url>,
    https: Option<Url>,
    http: Option<Url>,
    no_proxy: Vec<String>,
}

impl ProxyConfig {
    /// Connect directly, ignoring the environment
    pub fn none() -> Self {
        Self::default()
    }

    /// Discover proxies from `HTTPS_PROXY`, `HTTP_PROXY`, `ALL_PROXY` and
    /// `NO_PROXY` (upper or lower case)
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Same as [`ProxyConfig::from_env`] with a custom variable lookup
    pub fn from_env_with(get: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            get(name)
                .or_else(|| get(&name.to_ascii_lowercase()))
                .filter(|v| !v.trim().is_empty())
        };
        let parse = |name: &str| {
            let raw = var(name)?;
            match parse_proxy_url(&raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Ignoring {}: {}", name, e);
                    None
                }
            }
        };

        let all = parse("ALL_PROXY");
        let no_proxy = var("NO_PROXY")
            .map(|v| {
                v.split(',')
                    .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            explicit: None,
            https: parse("HTTPS_PROXY").or_else(|| all.clone()),
            http: parse("HTTP_PROXY").or(all),
            no_proxy,
        }
    }

    /// Route every request through `url`
    pub fn explicit(url: &str) -> Result<Self> {
        Ok(Self {
            explicit: Some(parse_proxy_url(url)?),
            ..Default::default()
        })
    }

    /// Proxy to use for a target, if any
    pub fn proxy_for(&self, host: &str, secure: bool) -> Option<&Url> {
        if let Some(url) = &self.explicit {
            return Some(url);
        }
        if self.bypass(host) {
            return None;
        }
        if secure {
            self.https.as_ref()
        } else {
            self.http.as_ref()
        }
    }

    fn bypass(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.no_proxy.iter().any(|entry| {
            entry == "*"
                || host == *entry
                || host
                    .strip_suffix(entry.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

/// Proxy URLs default to `http://` when no scheme is given
fn parse_proxy_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.contains("://") {
        Url::parse(raw)
    } else {
        Url::parse(&format!("http://{raw}"))
    }
}

/// Session-wide transport options
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Emit observer diagnostics
    pub debug: bool,
    pub proxy: ProxyConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            debug: false,
            proxy: ProxyConfig::from_env(),
        }
    }
}

/// Transport session
pub struct Session {
    user_agent: String,
    options: SessionOptions,
    provider: Arc<CryptoProvider>,
    tls: TlsProtocols,
    http: HttpProtocols,
    secure_config: Arc<ClientConfig>,
    insecure_config: Arc<ClientConfig>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_agent", &self.user_agent)
            .field("options", &self.options)
            .field("tls", &self.tls)
            .field("http", &self.http)
            .finish_non_exhaustive()
    }
}

/// Create a session and negotiate its protocol set
pub fn make_session(user_agent: &str, options: SessionOptions) -> Result<Session> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let all = TlsProtocols::TLS1_2 | TlsProtocols::TLS1_3;
    let http = HttpProtocols::empty();
    let (secure_config, insecure_config) = build_configs(&provider, all, http)
        .map_err(|e| Error::transport_msg(format!("TLS setup failed: {e}")))?;

    let mut session = Session {
        user_agent: user_agent.to_string(),
        options,
        provider,
        tls: all,
        http,
        secure_config,
        insecure_config,
    };
    protocol_enable(&mut session);
    debug!(
        "Session ready: {} / {} (agent {})",
        session.tls, session.http, session.user_agent
    );
    Ok(session)
}

impl Session {
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// TLS versions currently enabled
    pub fn secure_protocols(&self) -> TlsProtocols {
        self.tls
    }

    /// HTTP versions beyond HTTP/1.1 currently enabled
    pub fn http_protocols(&self) -> HttpProtocols {
        self.http
    }

    /// Pin every request of this session to an explicit proxy
    pub fn set_proxy_url(&mut self, url: &str) -> Result<()> {
        self.options.proxy = ProxyConfig::explicit(url)?;
        info!("Using proxy {}", url);
        Ok(())
    }

    /// Name a `(host, port)` pair; nothing is dialed until a request is sent
    pub fn connect(&self, host: &str, port: u16) -> Result<Connection<'_>> {
        let host = host.trim().trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() || port == 0 {
            return Err(Error::malformed(&format!("{host}:{port}"), "invalid host or port"));
        }
        Ok(Connection {
            session: self,
            host: host.to_string(),
            port,
        })
    }

    pub(crate) fn tls_config(&self, insecure: bool) -> Arc<ClientConfig> {
        if insecure {
            Arc::clone(&self.insecure_config)
        } else {
            Arc::clone(&self.secure_config)
        }
    }

    /// Dial the target (through the proxy, if any) and finish the TLS
    /// handshake when requested
    pub(crate) fn establish(
        &self,
        host: &str,
        port: u16,
        flags: RequestFlags,
        insecure: bool,
        on_status: &mut dyn FnMut(StatusEvent<'_>),
    ) -> Result<Established> {
        let proxy = self.options.proxy.proxy_for(host, flags.secure);
        let (dial_host, dial_port) = match proxy {
            Some(p) => (p.host.as_str(), p.port),
            None => (host, port),
        };

        on_status(StatusEvent::ResolvingName(dial_host));
        let addrs: Vec<SocketAddr> = (dial_host, dial_port)
            .to_socket_addrs()
            .map_err(Error::transport)?
            .collect();
        let first = addrs
            .first()
            .ok_or_else(|| Error::transport_msg(format!("no addresses for {dial_host}")))?;
        on_status(StatusEvent::NameResolved(&first.ip().to_string()));

        let mut tcp = self.dial(&addrs)?;
        let peer = tcp
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| first.to_string());
        on_status(StatusEvent::ConnectedToServer(&peer));

        tcp.set_read_timeout(Some(self.options.read_timeout))
            .map_err(Error::transport)?;
        tcp.set_write_timeout(Some(self.options.read_timeout))
            .map_err(Error::transport)?;
        tcp.set_nodelay(true).map_err(Error::transport)?;

        if proxy.is_some() && flags.secure {
            open_tunnel(&mut tcp, host, port, &self.user_agent)?;
        }

        if !flags.secure {
            return Ok(Established {
                stream: Box::new(tcp),
                alpn: HttpProtocols::empty(),
                absolute_form: proxy.is_some(),
            });
        }

        let name = ServerName::try_from(host.to_string())
            .map_err(|e| Error::transport_msg(format!("invalid TLS server name {host}: {e}")))?;
        let mut conn = ClientConnection::new(self.tls_config(insecure), name)
            .map_err(|e| Error::transport_msg(format!("TLS setup failed: {e}")))?;
        while conn.is_handshaking() {
            conn.complete_io(&mut tcp).map_err(Error::transport)?;
        }
        let alpn = conn
            .alpn_protocol()
            .map(|p| ProtocolVersion::flags_for_token(&String::from_utf8_lossy(p)))
            .unwrap_or_default();
        debug!(
            "TLS established with {} ({:?}, alpn {:?})",
            host,
            conn.protocol_version(),
            conn.alpn_protocol().map(String::from_utf8_lossy)
        );

        Ok(Established {
            stream: Box::new(StreamOwned::new(conn, tcp)),
            alpn,
            absolute_form: false,
        })
    }

    fn dial(&self, addrs: &[SocketAddr]) -> Result<TcpStream> {
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(addr, self.options.connect_timeout) {
                Ok(tcp) => return Ok(tcp),
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(match last_err {
            Some(e) => Error::transport(e),
            None => Error::transport_msg("no address to connect to"),
        })
    }
}

impl ProtocolOptions for Session {
    fn set_secure_protocols(&mut self, protocols: TlsProtocols) -> std::result::Result<(), Rejected> {
        if protocols.is_empty() {
            return Err(Rejected("no TLS version requested".into()));
        }
        let (secure, insecure) = build_configs(&self.provider, protocols, self.http)
            .map_err(|e| Rejected(e.to_string()))?;
        self.secure_config = secure;
        self.insecure_config = insecure;
        self.tls = protocols;
        Ok(())
    }

    fn enable_http_protocols(&mut self, protocols: HttpProtocols) -> std::result::Result<(), Rejected> {
        // response framing is HTTP/1.1 only
        if !protocols.is_empty() {
            return Err(Rejected(format!("{protocols} not supported by this transport")));
        }
        self.http = protocols;
        Ok(())
    }
}

/// A dialed stream ready for a request
pub(crate) struct Established {
    pub stream: Box<dyn Stream>,
    /// Protocol flags learned from ALPN
    pub alpn: HttpProtocols,
    /// Plain HTTP through a proxy: the request line carries the full URL
    pub absolute_form: bool,
}

/// Connection handle for a `(host, port)` pair
#[derive(Debug)]
pub struct Connection<'s> {
    session: &'s Session,
    host: String,
    port: u16,
}

impl<'s> Connection<'s> {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Open a request for `uri` (path plus query)
    pub fn open_request(&self, method: Method, uri: &str, flags: RequestFlags) -> Result<Request<'s>> {
        if !uri.starts_with('/') || uri.chars().any(|c| c.is_ascii_whitespace() || c.is_control()) {
            return Err(Error::malformed(uri, "request target must be an origin-form path"));
        }
        Ok(Request::new(
            self.session,
            self.host.clone(),
            self.port,
            method,
            uri.to_string(),
            flags,
        ))
    }
}

/// `host[:port]`, omitting the scheme default port
pub(crate) fn authority(host: &str, port: u16, secure: bool) -> String {
    let host = if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    let default = if secure { 443 } else { 80 };
    if port == default {
        host
    } else {
        format!("{host}:{port}")
    }
}

fn open_tunnel(tcp: &mut TcpStream, host: &str, port: u16, user_agent: &str) -> Result<()> {
    let target = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    debug!("Opening proxy tunnel to {}", target);
    let head = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\nUser-Agent: {user_agent}\r\n\r\n");
    tcp.write_all(head.as_bytes()).map_err(Error::transport)?;
    tcp.flush().map_err(Error::transport)?;

    // the proxy sends nothing after its response until the client speaks
    let mut reader = BufReader::with_capacity(1, &mut *tcp);
    let status = parse_status_line(&read_line(&mut reader).map_err(Error::transport)?)?;
    while !read_line(&mut reader).map_err(Error::transport)?.is_empty() {}
    if status.code != 200 {
        return Err(Error::transport_msg(format!(
            "proxy refused tunnel to {target}: {} {}",
            status.code, status.text
        )));
    }
    Ok(())
}

fn build_configs(
    provider: &Arc<CryptoProvider>,
    tls: TlsProtocols,
    http: HttpProtocols,
) -> std::result::Result<(Arc<ClientConfig>, Arc<ClientConfig>), rustls::Error> {
    let mut versions: Vec<&'static rustls::SupportedProtocolVersion> = Vec::new();
    if tls.contains(TlsProtocols::TLS1_3) {
        versions.push(&rustls::version::TLS13);
    }
    if tls.contains(TlsProtocols::TLS1_2) {
        versions.push(&rustls::version::TLS12);
    }

    let mut alpn = Vec::new();
    if http.contains(HttpProtocols::HTTP2) {
        alpn.push(b"h2".to_vec());
    }
    alpn.push(b"http/1.1".to_vec());

    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let mut secure = ClientConfig::builder_with_provider(Arc::clone(provider))
        .with_protocol_versions(&versions)?
        .with_root_certificates(roots)
        .with_no_client_auth();
    secure.alpn_protocols = alpn.clone();

    let verifier = Arc::new(NoVerification {
        provider: Arc::clone(provider),
    });
    let mut insecure = ClientConfig::builder_with_provider(Arc::clone(provider))
        .with_protocol_versions(&versions)?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    insecure.alpn_protocols = alpn;

    Ok((Arc::new(secure), Arc::new(insecure)))
}

/// Accepts any certificate chain; handshake signatures are still checked
#[derive(Debug)]
struct NoVerification {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
