// src/net/protocol.rs

//! TLS and HTTP protocol negotiation
//!
//! A session first asks for the widest capability set and falls back to a
//! narrower one when the stack rejects it. Rejections are never fatal: the
//! worst outcome is a session with fewer protocols enabled.

use bitflags::bitflags;
use std::fmt;
use tracing::debug;

bitflags! {
    /// TLS protocol versions a session may offer
    #[derive(Default)]
    pub struct TlsProtocols: u8 {
        const TLS1_2 = 0b01;
        const TLS1_3 = 0b10;
    }
}

impl fmt::Display for TlsProtocols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::TLS1_2) {
            names.push("TLS1.2");
        }
        if self.contains(Self::TLS1_3) {
            names.push("TLS1.3");
        }
        write!(f, "{}", names.join("|"))
    }
}

bitflags! {
    /// HTTP protocol versions beyond HTTP/1.1 a session may enable
    #[derive(Default)]
    pub struct HttpProtocols: u8 {
        const HTTP2 = 0b01;
        const HTTP3 = 0b10;
    }
}

impl fmt::Display for HttpProtocols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = vec!["HTTP/1.1"];
        if self.contains(Self::HTTP2) {
            names.push("HTTP/2");
        }
        if self.contains(Self::HTTP3) {
            names.push("HTTP/3");
        }
        write!(f, "{}", names.join("|"))
    }
}

/// Protocol version a response was delivered over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    #[default]
    Http11,
    Http2,
    Http3,
}

impl ProtocolVersion {
    /// Pick the version from a set of "protocol used" flags
    ///
    /// HTTP/3 takes precedence over HTTP/2, which takes precedence over
    /// HTTP/1.1.
    pub fn from_flags(used: HttpProtocols) -> Self {
        if used.contains(HttpProtocols::HTTP3) {
            Self::Http3
        } else if used.contains(HttpProtocols::HTTP2) {
            Self::Http2
        } else {
            Self::Http11
        }
    }

    /// Map an ALPN identifier or status-line version token
    pub fn flags_for_token(token: &str) -> HttpProtocols {
        match token.trim().to_ascii_lowercase().as_str() {
            "h3" | "http/3" | "http/3.0" => HttpProtocols::HTTP3,
            "h2" | "http/2" | "http/2.0" => HttpProtocols::HTTP2,
            _ => HttpProtocols::empty(),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http11 => "HTTP/1.1",
            Self::Http2 => "HTTP/2",
            Self::Http3 => "HTTP/3",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stack refused a protocol option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected(pub String);

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Protocol knobs exposed by a transport stack
pub trait ProtocolOptions {
    fn set_secure_protocols(&mut self, protocols: TlsProtocols) -> Result<(), Rejected>;

    fn enable_http_protocols(&mut self, protocols: HttpProtocols) -> Result<(), Rejected>;
}

/// Apply the preferred protocol sets, degrading on rejection
///
/// TLS 1.2|1.3 is tried first, then TLS 1.2 alone; HTTP/2|HTTP/3 first,
/// then HTTP/2 alone. Failures of the fallback step are ignored as well.
pub fn protocol_enable<T: ProtocolOptions + ?Sized>(stack: &mut T) {
    if let Err(e) = stack.set_secure_protocols(TlsProtocols::TLS1_2 | TlsProtocols::TLS1_3) {
        debug!("TLS1.2|TLS1.3 rejected ({}), retrying with TLS1.2", e);
        if let Err(e) = stack.set_secure_protocols(TlsProtocols::TLS1_2) {
            debug!("TLS1.2 rejected ({}), keeping stack defaults", e);
        }
    }

    if let Err(e) = stack.enable_http_protocols(HttpProtocols::HTTP2 | HttpProtocols::HTTP3) {
        debug!("HTTP/2|HTTP/3 rejected ({}), retrying with HTTP/2", e);
        if let Err(e) = stack.enable_http_protocols(HttpProtocols::HTTP2) {
            debug!("HTTP/2 rejected ({}), staying on HTTP/1.1", e);
        }
    }
}
