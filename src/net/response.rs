// src/net/response.rs

//! Response prelude: status, headers and negotiated protocol

use super::headers::Headers;
use super::protocol::ProtocolVersion;
use crate::error::{Error, Result};

/// Status, headers and protocol of a received response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimalResponse {
    pub status_code: u16,
    /// Reason phrase; empty when the server sent none
    pub status_text: String,
    pub version: ProtocolVersion,
    pub headers: Headers,
}

impl MinimalResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status_code, 301 | 302 | 303 | 307 | 308)
    }
}

/// Parsed status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusLine {
    pub version: String,
    pub code: u16,
    pub text: String,
}

/// Parse `HTTP/1.1 200 OK`; the reason phrase is optional
pub(crate) fn parse_status_line(line: &str) -> Result<StatusLine> {
    let mut parts = line.trim_end().splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(Error::transport_msg(format!("invalid status line '{line}'")));
    }
    let code = parts
        .next()
        .and_then(|c| c.parse::<u16>().ok())
        .filter(|c| (100..1000).contains(c))
        .ok_or_else(|| Error::transport_msg(format!("status code missing in '{line}'")))?;
    let text = parts.next().unwrap_or_default().trim().to_string();

    Ok(StatusLine {
        version: version.to_string(),
        code,
        text,
    })
}

/// Split a raw CRLF header block into a header set
///
/// The first line is the status line and is skipped; each following line is
/// split on its first `:` and both halves are trimmed. Lines without a colon
/// are ignored.
pub(crate) fn parse_raw_headers(raw: &str) -> Headers {
    raw.split("\r\n")
        .filter(|l| !l.is_empty())
        .skip(1)
        .filter_map(|line| {
            let (k, v) = line.split_once(':')?;
            Some((k.trim(), v.trim()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_line() {
        let s = parse_status_line("HTTP/1.1 206 Partial Content").unwrap();
        assert_eq!(s.version, "HTTP/1.1");
        assert_eq!(s.code, 206);
        assert_eq!(s.text, "Partial Content");
    }

    #[test]
    fn test_status_text_optional() {
        let s = parse_status_line("HTTP/1.1 204").unwrap();
        assert_eq!(s.code, 204);
        assert_eq!(s.text, "");
    }

    #[test]
    fn test_missing_status_code_is_fatal() {
        assert!(matches!(
            parse_status_line("HTTP/1.1 OK"),
            Err(Error::Transport { .. })
        ));
        assert!(matches!(
            parse_status_line("garbage"),
            Err(Error::Transport { .. })
        ));
    }

    #[test]
    fn test_parse_raw_headers() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Length: 10\r\nX-Time:  12:30:00 \r\nbogus line\r\n\r\n";
        let h = parse_raw_headers(raw);
        assert_eq!(h.len(), 2);
        assert_eq!(h.get("content-length"), Some("10"));
        assert_eq!(h.get("X-Time"), Some("12:30:00"));
    }

    #[test]
    fn test_redirect_codes() {
        let mut r = MinimalResponse {
            status_code: 302,
            status_text: "Found".into(),
            version: ProtocolVersion::Http11,
            headers: Headers::new(),
        };
        assert!(r.is_redirect());
        r.status_code = 304;
        assert!(!r.is_redirect());
        r.status_code = 200;
        assert!(r.is_success());
    }
}
