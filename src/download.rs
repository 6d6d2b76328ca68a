// src/download.rs

//! Resumable package downloads
//!
//! A transfer is written to `<dir>/<name>.part` and renamed once the body is
//! complete. When a `.part` file is already present the request asks for the
//! remaining bytes with `Range: bytes=<offset>-`:
//! - `206 Partial Content` starting at the offset appends to the part file
//! - `206` at any other position, or `200 OK`, starts the file over
//!
//! The final name prefers the server's `Content-Disposition`, then the last
//! segment of the (post-redirect) URL. A failed transfer keeps its part file
//! only when the server advertised `Accept-Ranges: bytes`.

use crate::error::{Error, Result};
use crate::hash::{parse_descriptor_hash, verify_hash, Hash};
use crate::net::client::{HttpClient, SendOptions};
use crate::net::headers::{content_range_start, extract_filename, supports_partial_download};
use crate::net::session::Method;
use crate::net::url::Url;
use crate::package::Package;
use crate::progress::{ProgressTracker, SilentProgress};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Buffer size for streaming to disk
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Name used when neither the server nor the URL suggests one
const FALLBACK_NAME: &str = "download";

/// Suffix of in-progress files
pub const PART_SUFFIX: &str = ".part";

/// Downloads files through an [`HttpClient`]
pub struct Downloader<'c> {
    client: &'c HttpClient,
    progress: Box<dyn ProgressTracker>,
}

impl<'c> Downloader<'c> {
    pub fn new(client: &'c HttpClient) -> Self {
        Self {
            client,
            progress: Box::new(SilentProgress::new()),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    /// Download `url` into `dir` without verification
    pub fn download(&self, url: &str, dir: &Path) -> Result<PathBuf> {
        self.fetch(url, dir, None, "")
    }

    /// Download `url` into `dir`
    ///
    /// `rename` overrides the final file name. `hash` is a descriptor hash
    /// string; empty skips verification. A malformed hash fails before any
    /// request is sent.
    pub fn fetch(&self, url: &str, dir: &Path, rename: Option<&str>, hash: &str) -> Result<PathBuf> {
        let expected = parse_descriptor_hash(hash)?;
        self.fetch_url(url, dir, rename, expected.as_ref())
    }

    fn fetch_url(&self, url: &str, dir: &Path, rename: Option<&str>, expected: Option<&Hash>) -> Result<PathBuf> {
        let url = Url::parse(url)?;
        fs::create_dir_all(dir)?;

        let hint = rename
            .and_then(sanitize_name)
            .or_else(|| sanitize_name(&url.filename))
            .unwrap_or_else(|| FALLBACK_NAME.to_string());
        let part = dir.join(format!("{hint}{PART_SUFFIX}"));

        let dest = match self.transfer(&url, dir, &part, rename) {
            Err(Error::HttpStatus { status: 416, .. }) if part.exists() => {
                // stale part file at or beyond the end of the resource
                warn!("Server rejected resume of {}, starting over", part.display());
                fs::remove_file(&part)?;
                self.transfer(&url, dir, &part, rename)?
            }
            other => other?,
        };

        if let Some(expected) = expected {
            verify_hash(&dest, expected)?;
        }
        Ok(dest)
    }

    fn transfer(&self, url: &Url, dir: &Path, part: &Path, rename: Option<&str>) -> Result<PathBuf> {
        let offset = fs::metadata(part).map(|m| m.len()).unwrap_or(0);
        if offset > 0 {
            info!("Resuming {} at byte {}", url, offset);
        } else {
            info!("Downloading {}", url);
        }

        let send = SendOptions {
            resume_offset: i64::try_from(offset).unwrap_or(0),
            ..Default::default()
        };
        let mut response = self.client.send(Method::Get, url, &send)?.error_for_status()?;

        let resumable = supports_partial_download(response.headers());
        let (mut file, start) = match response.status() {
            206 if offset > 0 => match content_range_start(response.headers()) {
                Some(start) if start == offset => (OpenOptions::new().append(true).open(part)?, offset),
                other => {
                    warn!(
                        "Server answered the resume of {} at {:?} instead of byte {}, starting over",
                        part.display(),
                        other,
                        offset
                    );
                    drop(response);
                    fs::remove_file(part)?;
                    return self.transfer(url, dir, part, rename);
                }
            },
            _ => {
                if offset > 0 {
                    debug!("Server ignored range request, restarting {}", part.display());
                }
                (File::create(part)?, 0)
            }
        };

        let name = rename
            .and_then(sanitize_name)
            .or_else(|| extract_filename(response.headers()).and_then(|n| sanitize_name(&n)))
            .or_else(|| sanitize_name(&response.url.filename))
            .unwrap_or_else(|| FALLBACK_NAME.to_string());

        let length = response.content_length();
        self.progress.set_message(&name);
        self.progress.set_length(if length >= 0 { start + length as u64 } else { 0 });
        self.progress.set_position(start);

        if let Err(e) = stream_to_file(&mut response, &mut file, self.progress.as_ref()) {
            drop(file);
            self.progress.finish_with_error(&e.to_string());
            if resumable {
                info!("Keeping {} for a later resume", part.display());
            } else {
                let _ = fs::remove_file(part);
            }
            return Err(e);
        }
        file.sync_all()?;
        drop(file);

        let dest = dir.join(&name);
        fs::rename(part, &dest)?;
        self.progress.finish_with_message(&format!("{name} downloaded"));
        info!("Saved {}", dest.display());
        Ok(dest)
    }

    /// Download a resolved package, trying its URLs in order
    ///
    /// The package hash applies to whichever URL succeeds. The error from the
    /// last mirror is returned when all fail. A malformed hash fails before
    /// any mirror is tried.
    pub fn download_package(&self, pkg: &Package, dir: &Path) -> Result<PathBuf> {
        let expected = parse_descriptor_hash(&pkg.hash)?;
        let rename = (!pkg.rename.is_empty()).then_some(pkg.rename.as_str());
        let mut last_err = None;
        for (i, url) in pkg.urls.iter().enumerate() {
            match self.fetch_url(url, dir, rename, expected.as_ref()) {
                Ok(path) => return Ok(path),
                Err(e) => {
                    warn!(
                        "{} mirror {}/{} failed: {}",
                        pkg.display_name(),
                        i + 1,
                        pkg.urls.len(),
                        e
                    );
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::NotFound(format!("{} has no download URL", pkg.display_name()))))
    }
}

fn stream_to_file<R: Read>(reader: &mut R, file: &mut File, progress: &dyn ProgressTracker) -> Result<u64> {
    let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let n = reader.read(&mut buffer).map_err(Error::transport)?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n])?;
        written += n as u64;
        progress.increment(n as u64);
    }
    Ok(written)
}

/// Reduce a suggested name to a single safe path component
fn sanitize_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("7z2301-x64.zip").as_deref(), Some("7z2301-x64.zip"));
        assert_eq!(sanitize_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_name("C:\\tmp\\a.zip").as_deref(), Some("a.zip"));
        assert_eq!(sanitize_name(""), None);
        assert_eq!(sanitize_name(".."), None);
        assert_eq!(sanitize_name("dir/"), None);
    }
}
