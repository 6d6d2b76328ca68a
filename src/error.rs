// src/error.rs

//! Error types shared by the transport, resolver and lock

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for pallet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving and fetching packages
#[derive(Error, Debug)]
pub enum Error {
    /// URL could not be parsed
    #[error("malformed URL '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    /// Networking failure (connect, send, header query, read)
    #[error("transport error{}: {message}", code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Transport { code: Option<i32>, message: String },

    /// Server answered with a status the caller cannot use
    #[error("HTTP {status} {text} from {url}")]
    HttpStatus { url: String, status: u16, text: String },

    /// Descriptor has no URL for the running architecture
    #[error("{} not yet ported to {arch}", path.display())]
    NotPorted { path: PathBuf, arch: String },

    /// Bucket variant without a loader
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Descriptor file unreadable or structurally invalid
    #[error("failed to parse descriptor {}: {reason}", path.display())]
    DescriptorParse { path: PathBuf, reason: String },

    /// Install lock held by another process
    #[error("another pallet process holds the install lock at {}", path.display())]
    LockBusy { path: PathBuf },

    /// Downloaded file does not match the descriptor hash
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Package or resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Wrap a transport-level I/O failure, keeping the OS error code
    pub fn transport(err: io::Error) -> Self {
        Self::Transport {
            code: err.raw_os_error(),
            message: err.to_string(),
        }
    }

    /// Transport failure described by a message only
    pub fn transport_msg(msg: impl Into<String>) -> Self {
        Self::Transport {
            code: None,
            message: msg.into(),
        }
    }

    pub(crate) fn malformed(url: &str, reason: impl Into<String>) -> Self {
        Self::MalformedUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}
