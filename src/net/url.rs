// src/net/url.rs

//! Request target parsing
//!
//! Splits a URL into the pieces the transport needs: host and port for the
//! connection, the undecoded path+query for the request line, and a decoded
//! filename candidate for downloads.

use crate::error::{Error, Result};
use std::fmt;

/// URL scheme understood by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Port used when the URL does not name one
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed request target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    /// Host name or address, without IPv6 brackets
    pub host: String,
    /// Explicit port, or the scheme default
    pub port: u16,
    pub scheme: Scheme,
    /// Path plus query exactly as sent on the wire
    pub uri: String,
    /// Percent-decoded last path segment (may be empty)
    pub filename: String,
    inner: ::url::Url,
}

impl Url {
    /// Parse a URL string
    ///
    /// A missing or unrecognized scheme is treated as `https`.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::malformed(raw, "empty URL"));
        }

        let candidate = match trimmed.split_once("://") {
            Some((scheme, rest)) => {
                if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") {
                    trimmed.to_string()
                } else {
                    format!("https://{rest}")
                }
            }
            None => format!("https://{trimmed}"),
        };

        let inner = ::url::Url::parse(&candidate).map_err(|e| Error::malformed(raw, e.to_string()))?;
        Self::from_inner(inner, raw)
    }

    fn from_inner(inner: ::url::Url, raw: &str) -> Result<Self> {
        let scheme = match inner.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(Error::malformed(raw, format!("unsupported scheme {other}"))),
        };

        let host = inner
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::malformed(raw, "missing host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let port = inner.port().unwrap_or_else(|| scheme.default_port());

        let mut uri = inner.path().to_string();
        if uri.is_empty() {
            uri.push('/');
        }
        if let Some(query) = inner.query() {
            uri.push('?');
            uri.push_str(query);
        }

        let filename = decoded_path_name(inner.path());

        Ok(Self {
            host,
            port,
            scheme,
            uri,
            filename,
            inner,
        })
    }

    /// Whether the connection must be encrypted
    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// `host[:port]` as used in the `Host` header; the port is omitted when
    /// it matches the scheme default
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == self.scheme.default_port() {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// Resolve a (possibly relative) reference such as a `Location` value
    pub fn join(&self, reference: &str) -> Result<Self> {
        let reference = reference.trim();
        let joined = self
            .inner
            .join(reference)
            .map_err(|e| Error::malformed(reference, e.to_string()))?;
        Self::from_inner(joined, reference)
    }

    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority(), self.uri)
    }
}

impl std::str::FromStr for Url {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Percent-decode the last segment of a URL path
fn decoded_path_name(path: &str) -> String {
    let segment = path.rsplit('/').next().unwrap_or_default();
    match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_string(),
    }
}
