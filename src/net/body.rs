// src/net/body.rs

//! Response body framing
//!
//! Exposes the body as a `BufRead` so the request can ask how many bytes
//! are available (`fill_buf`) before reading them, whatever the framing.

use std::io::{self, BufRead, Read};

/// Upper bound for a chunk-size or trailer line
const MAX_LINE: usize = 8 * 1024;

/// How the end of a body is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No body (HEAD, 1xx, 204, 304)
    Empty,
    /// `Content-Length` bytes
    Length(u64),
    /// `Transfer-Encoding: chunked`
    Chunked,
    /// Read until the server closes the connection
    UntilClose,
}

#[derive(Debug)]
enum State {
    Length { remaining: u64 },
    Chunked { remaining: u64, started: bool, done: bool },
    UntilClose,
}

/// Framed view over a buffered connection
#[derive(Debug)]
pub struct Body<R> {
    inner: R,
    state: State,
}

impl<R: BufRead> Body<R> {
    pub fn new(inner: R, framing: Framing) -> Self {
        let state = match framing {
            Framing::Empty => State::Length { remaining: 0 },
            Framing::Length(n) => State::Length { remaining: n },
            Framing::Chunked => State::Chunked {
                remaining: 0,
                started: false,
                done: false,
            },
            Framing::UntilClose => State::UntilClose,
        };
        Self { inner, state }
    }

    /// Bytes that may still be read from the current frame without
    /// touching framing metadata; `u64::MAX` when unbounded.
    fn frame_limit(&mut self) -> io::Result<u64> {
        match self.state {
            State::Length { remaining } => Ok(remaining),
            State::UntilClose => Ok(u64::MAX),
            State::Chunked { done: true, .. } => Ok(0),
            State::Chunked { remaining, .. } if remaining > 0 => Ok(remaining),
            State::Chunked { started, .. } => {
                if started {
                    // CRLF that terminates the previous chunk's data
                    let line = read_line(&mut self.inner)?;
                    if !line.is_empty() {
                        return Err(invalid("missing CRLF after chunk data"));
                    }
                }
                let size = parse_chunk_size(&read_line(&mut self.inner)?)?;
                if size == 0 {
                    // trailer section ends with an empty line
                    loop {
                        if read_line(&mut self.inner)?.is_empty() {
                            break;
                        }
                    }
                    self.state = State::Chunked {
                        remaining: 0,
                        started: true,
                        done: true,
                    };
                    return Ok(0);
                }
                self.state = State::Chunked {
                    remaining: size,
                    started: true,
                    done: false,
                };
                Ok(size)
            }
        }
    }

    /// Whether the body has been fully consumed
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            State::Length { remaining: 0 } | State::Chunked { done: true, .. }
        )
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

impl<R: BufRead> BufRead for Body<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        let limit = self.frame_limit()?;
        if limit == 0 {
            return Ok(&[]);
        }
        let unbounded = matches!(self.state, State::UntilClose);
        if unbounded {
            // TLS peers that close without close_notify end the body here
            if let Err(e) = self.inner.fill_buf() {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    self.state = State::Length { remaining: 0 };
                    return Ok(&[]);
                }
                return Err(e);
            }
        }
        let buf = self.inner.fill_buf()?;
        if buf.is_empty() && !unbounded {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before end of body",
            ));
        }
        let n = usize::try_from(limit).unwrap_or(usize::MAX).min(buf.len());
        Ok(&buf[..n])
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        match &mut self.state {
            State::Length { remaining } | State::Chunked { remaining, .. } => {
                *remaining = remaining.saturating_sub(amt as u64);
            }
            State::UntilClose => {}
        }
    }
}

impl<R: BufRead> Read for Body<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

/// Read one CRLF (or LF) terminated line, without the terminator
pub(crate) fn read_line<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut line = Vec::new();
    let n = reader.by_ref().take(MAX_LINE as u64 + 1).read_until(b'\n', &mut line)?;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed while reading line",
        ));
    }
    if line.last() != Some(&b'\n') {
        return Err(invalid("line too long"));
    }
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    // obs-text (Latin-1 and friends) is legal in field values
    Ok(String::from_utf8_lossy(&line).into_owned())
}

fn parse_chunk_size(line: &str) -> io::Result<u64> {
    // chunk extensions follow a ';'
    let size = line.split(';').next().unwrap_or_default().trim();
    u64::from_str_radix(size, 16).map_err(|_| invalid(&format!("invalid chunk size '{size}'")))
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(mut body: Body<Cursor<Vec<u8>>>) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        body.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_length_framing_stops_at_length() {
        let body = Body::new(Cursor::new(b"hello world".to_vec()), Framing::Length(5));
        assert_eq!(read_all(body).unwrap(), b"hello");
    }

    #[test]
    fn test_length_framing_short_body_errors() {
        let body = Body::new(Cursor::new(b"abc".to_vec()), Framing::Length(10));
        let err = read_all(body).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_chunked_framing() {
        let raw = b"5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\nX-Trailer: y\r\n\r\nGARBAGE".to_vec();
        let mut body = Body::new(Cursor::new(raw), Framing::Chunked);
        let mut out = Vec::new();
        body.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello world");
        assert!(body.is_finished());
        // bytes after the terminating chunk remain unread
        let mut rest = Vec::new();
        body.get_mut().read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"GARBAGE");
    }

    #[test]
    fn test_chunked_invalid_size() {
        let body = Body::new(Cursor::new(b"zz\r\n".to_vec()), Framing::Chunked);
        assert_eq!(read_all(body).unwrap_err().kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_until_close() {
        let body = Body::new(Cursor::new(b"all of it".to_vec()), Framing::UntilClose);
        assert_eq!(read_all(body).unwrap(), b"all of it");
    }

    #[test]
    fn test_empty_framing() {
        let mut body = Body::new(Cursor::new(b"ignored".to_vec()), Framing::Empty);
        assert!(body.fill_buf().unwrap().is_empty());
        assert!(body.is_finished());
    }

    /// Yields its data, then fails like a TLS stream closed without close_notify
    struct UncleanClose {
        data: Cursor<Vec<u8>>,
    }

    impl Read for UncleanClose {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed connection without sending TLS close_notify",
                )),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_until_close_tolerates_unclean_shutdown() {
        let inner = io::BufReader::new(UncleanClose {
            data: Cursor::new(b"complete body".to_vec()),
        });
        let mut body = Body::new(inner, Framing::UntilClose);
        let mut out = Vec::new();
        body.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"complete body");
        assert!(body.is_finished());
    }

    #[test]
    fn test_length_framing_still_reports_unclean_shutdown() {
        let inner = io::BufReader::new(UncleanClose {
            data: Cursor::new(b"short".to_vec()),
        });
        let mut body = Body::new(inner, Framing::Length(10));
        let mut out = Vec::new();
        assert_eq!(body.read_to_end(&mut out).unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_read_line_accepts_latin1() {
        let mut reader = Cursor::new(b"Content-Disposition: attachment; filename=\"caf\xE9.zip\"\r\n".to_vec());
        let line = read_line(&mut reader).unwrap();
        assert!(line.starts_with("Content-Disposition: attachment; filename=\"caf"));
        assert!(line.ends_with(".zip\""));
    }
}
