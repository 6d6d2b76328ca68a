// src/net/request.rs

//! Request handle: header/body writing, response receipt and body reads
//!
//! A request moves strictly through `write_headers` (any number of times),
//! `write_body` (dials and sends), `recv_minimal_response` and finally body
//! reads through `recv_completely` or `std::io::Read`. Calling a step out of
//! order is a transport error.

use super::body::{read_line, Body, Framing};
use super::headers::{content_length, Headers};
use super::protocol::{HttpProtocols, ProtocolVersion};
use super::response::{parse_raw_headers, parse_status_line, MinimalResponse};
use super::session::{authority, Method, RequestFlags, Session, Stream};
use super::status::{StatusContext, StatusEvent};
use crate::error::{Error, Result};
use std::io::{self, BufRead, BufReader, Read, Write};
use tracing::{debug, trace};

/// Initial buffer for bodies of unknown length
const UNKNOWN_LENGTH_CHUNK: usize = 256 * 1024;

/// Upper bound on the response header block
const MAX_HEADER_BYTES: usize = 64 * 1024;

type Wire = BufReader<Box<dyn Stream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Sent,
    Received,
}

/// An HTTP request bound to a session
pub struct Request<'s> {
    session: &'s Session,
    host: String,
    port: u16,
    method: Method,
    uri: String,
    flags: RequestFlags,
    insecure: bool,
    headers: Headers,
    status: Option<StatusContext>,
    phase: Phase,
    alpn: HttpProtocols,
    preset: Option<Box<dyn Stream>>,
    wire: Option<Wire>,
    body: Option<Body<Wire>>,
}

impl<'s> Request<'s> {
    pub(crate) fn new(
        session: &'s Session,
        host: String,
        port: u16,
        method: Method,
        uri: String,
        flags: RequestFlags,
    ) -> Self {
        Self {
            session,
            host,
            port,
            method,
            uri,
            flags,
            insecure: false,
            headers: Headers::new(),
            status: None,
            phase: Phase::Open,
            alpn: HttpProtocols::empty(),
            preset: None,
            wire: None,
            body: None,
        }
    }

    /// Request that talks over an already established stream
    #[cfg(test)]
    pub(crate) fn with_stream(
        session: &'s Session,
        method: Method,
        uri: &str,
        stream: Box<dyn Stream>,
    ) -> Self {
        let mut request = Self::new(
            session,
            "test.invalid".to_string(),
            80,
            method,
            uri.to_string(),
            RequestFlags::default(),
        );
        request.preset = Some(stream);
        request
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Skip certificate chain, usage, name and expiry checks for this request
    pub fn set_insecure_mode(&mut self) {
        self.insecure = true;
    }

    /// Attach the observer that receives this request's status events
    pub fn set_status_context(&mut self, ctx: StatusContext) {
        self.status = Some(ctx);
    }

    pub fn status_context(&self) -> Option<&StatusContext> {
        self.status.as_ref()
    }

    /// Detach the observer once the request is done with it
    pub fn take_status_context(&mut self) -> Option<StatusContext> {
        self.status.take()
    }

    /// Queue request headers
    ///
    /// `resume_offset > 0` adds an open-ended `Range: bytes=<offset>-`;
    /// non-empty `cookies` are merged into a single `Cookie` header.
    pub fn write_headers(&mut self, headers: &Headers, cookies: &[String], resume_offset: i64) -> Result<()> {
        if self.phase != Phase::Open {
            return Err(Error::transport_msg("headers written after the request was sent"));
        }
        for (name, value) in headers.iter() {
            check_header(name, value)?;
            self.headers.insert(name, value);
        }
        if resume_offset > 0 {
            self.headers.insert("Range", format!("bytes={resume_offset}-"));
        }
        if !cookies.is_empty() {
            let joined = cookies.join("; ");
            check_header("Cookie", &joined)?;
            self.headers.insert("Cookie", joined);
        }
        Ok(())
    }

    /// Send the request, with `body` when it is non-empty
    ///
    /// An empty `content_type` falls back to `text/plain`.
    pub fn write_body(&mut self, body: &[u8], content_type: &str) -> Result<()> {
        if self.phase != Phase::Open {
            return Err(Error::transport_msg("request already sent"));
        }

        let (stream, absolute_form) = match self.preset.take() {
            Some(stream) => (stream, false),
            None => {
                let status = &mut self.status;
                let mut notify = |event: StatusEvent<'_>| {
                    if let Some(ctx) = status.as_mut() {
                        ctx.on_status(event);
                    }
                };
                let established = self.session.establish(
                    &self.host,
                    self.port,
                    self.flags,
                    self.insecure,
                    &mut notify,
                )?;
                self.alpn = established.alpn;
                (established.stream, established.absolute_form)
            }
        };

        let host = authority(&self.host, self.port, self.flags.secure);
        let target = if absolute_form {
            format!("http://{}{}", host, self.uri)
        } else {
            self.uri.clone()
        };

        let mut head = format!("{} {} HTTP/1.1\r\nHost: {}\r\n", self.method, target, host);
        if !self.headers.contains("User-Agent") {
            head.push_str(&format!("User-Agent: {}\r\n", self.session.user_agent()));
        }
        if !self.headers.contains("Accept") {
            head.push_str("Accept: */*\r\n");
        }
        if !self.headers.contains("Connection") {
            head.push_str("Connection: close\r\n");
        }
        head.push_str(&self.headers.to_string());
        if !body.is_empty() {
            let content_type = if content_type.trim().is_empty() {
                "text/plain"
            } else {
                content_type
            };
            check_header("Content-Type", content_type)?;
            head.push_str(&format!(
                "Content-Type: {}\r\nContent-Length: {}\r\n",
                content_type,
                body.len()
            ));
        } else if self.method == Method::Post {
            head.push_str("Content-Length: 0\r\n");
        }
        head.push_str("\r\n");

        trace!("Request head:\n{}", head);
        let mut wire = BufReader::new(stream);
        let out = wire.get_mut();
        out.write_all(head.as_bytes()).map_err(Error::transport)?;
        out.write_all(body).map_err(Error::transport)?;
        out.flush().map_err(Error::transport)?;

        debug!("{} {}:{}{} sent ({} body bytes)", self.method, self.host, self.port, self.uri, body.len());
        self.wire = Some(wire);
        self.phase = Phase::Sent;
        Ok(())
    }

    /// Wait for the response head and parse status, headers and protocol
    ///
    /// Informational (1xx) responses are skipped. A 3xx with a `Location`
    /// header is reported to the status context as a redirect.
    pub fn recv_minimal_response(&mut self) -> Result<MinimalResponse> {
        if self.phase != Phase::Sent {
            return Err(Error::transport_msg("response requested before the request was sent"));
        }
        let mut wire = self
            .wire
            .take()
            .ok_or_else(|| Error::transport_msg("request stream missing"))?;

        let (status, raw) = loop {
            let line = read_line(&mut wire).map_err(Error::transport)?;
            let status = parse_status_line(&line)?;
            let mut raw = line;
            raw.push_str("\r\n");
            loop {
                let header = read_line(&mut wire).map_err(Error::transport)?;
                if header.is_empty() {
                    break;
                }
                raw.push_str(&header);
                raw.push_str("\r\n");
                if raw.len() > MAX_HEADER_BYTES {
                    return Err(Error::transport_msg("response header block too large"));
                }
            }
            if (100..200).contains(&status.code) {
                trace!("Skipping informational response {}", status.code);
                continue;
            }
            break (status, raw);
        };

        let headers = parse_raw_headers(&raw);
        if (300..400).contains(&status.code) {
            if let (Some(location), Some(ctx)) = (headers.get("Location"), self.status.as_mut()) {
                ctx.on_status(StatusEvent::Redirect(location));
            }
        }

        let version = ProtocolVersion::from_flags(self.alpn | ProtocolVersion::flags_for_token(&status.version));
        let framing = self.framing(status.code, &headers);
        debug!("{} {} ({}, {:?})", status.code, status.text, version, framing);

        self.body = Some(Body::new(wire, framing));
        self.phase = Phase::Received;

        Ok(MinimalResponse {
            status_code: status.code,
            status_text: status.text,
            version,
            headers,
        })
    }

    fn framing(&self, code: u16, headers: &Headers) -> Framing {
        if self.method == Method::Head || code == 204 || code == 304 || (100..200).contains(&code) {
            return Framing::Empty;
        }
        let chunked = headers
            .get_all("Transfer-Encoding")
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case("chunked"));
        if chunked {
            return Framing::Chunked;
        }
        match content_length(headers) {
            n if n >= 0 => Framing::Length(n as u64),
            _ => Framing::UntilClose,
        }
    }

    /// Bytes that can be read without blocking for more framing; 0 at end
    /// of body
    pub fn query_data_available(&mut self) -> Result<usize> {
        let body = self.body_mut()?;
        body.fill_buf().map(|b| b.len()).map_err(Error::transport)
    }

    /// Read body bytes into `buf`
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        let body = self.body_mut()?;
        body.read(buf).map_err(Error::transport)
    }

    /// Read the whole body
    ///
    /// `expected_length` is the `Content-Length` (or -1 when unknown). The
    /// result never exceeds `max_body_size`; a known length larger than the
    /// cap is truncated to the cap.
    pub fn recv_completely(&mut self, expected_length: i64, max_body_size: usize) -> Result<Vec<u8>> {
        if expected_length == 0 {
            return Ok(Vec::new());
        }

        if expected_length > 0 {
            let want = usize::try_from(expected_length)
                .unwrap_or(usize::MAX)
                .min(max_body_size);
            let mut buf = vec![0u8; want];
            let mut filled = 0;
            while filled < want {
                if self.query_data_available()? == 0 {
                    return Err(Error::transport_msg(format!(
                        "connection closed after {filled} of {want} bytes"
                    )));
                }
                filled += self.read_data(&mut buf[filled..])?;
            }
            return Ok(buf);
        }

        let mut buf = Vec::with_capacity(UNKNOWN_LENGTH_CHUNK.min(max_body_size));
        while buf.len() < max_body_size {
            let available = self.query_data_available()?;
            if available == 0 {
                break;
            }
            let start = buf.len();
            let take = available.min(max_body_size - start);
            buf.resize(start + take, 0);
            let n = self.read_data(&mut buf[start..])?;
            buf.truncate(start + n);
        }
        Ok(buf)
    }

    fn body_mut(&mut self) -> Result<&mut Body<Wire>> {
        match self.phase {
            Phase::Received => self
                .body
                .as_mut()
                .ok_or_else(|| Error::transport_msg("response body missing")),
            _ => Err(Error::transport_msg("body read before the response was received")),
        }
    }
}

impl Read for Request<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.body.as_mut() {
            Some(body) => body.read(buf),
            None => Err(io::Error::other("response not received")),
        }
    }
}

fn check_header(name: &str, value: &str) -> Result<()> {
    let bad_name = name.is_empty() || name.bytes().any(|b| b == b':' || b.is_ascii_whitespace() || b.is_ascii_control());
    let bad_value = value.bytes().any(|b| b == b'\r' || b == b'\n');
    if bad_name || bad_value {
        return Err(Error::transport_msg(format!("invalid header '{name}'")));
    }
    Ok(())
}
