// src/hash.rs

//! Download integrity checks
//!
//! Descriptor hashes are written either as `algo:hex` or as bare hex, which
//! means SHA-256. An empty hash string disables verification.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Digest length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    #[inline]
    pub const fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            _ => Err(Error::Config(format!("unknown hash algorithm: {s}"))),
        }
    }
}

/// An expected digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    pub algorithm: HashAlgorithm,
    /// Lower-case hex digest
    pub value: String,
}

impl Hash {
    pub fn new(algorithm: HashAlgorithm, value: &str) -> Result<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value.len() != algorithm.hex_len() {
            return Err(Error::Config(format!(
                "invalid {algorithm} length: expected {}, got {}",
                algorithm.hex_len(),
                value.len()
            )));
        }
        hex::decode(&value).map_err(|e| Error::Config(format!("invalid hex in hash: {e}")))?;
        Ok(Self { algorithm, value })
    }

    /// Parse `sha512:abc...`, `sha256:abc...` or bare SHA-256 hex
    pub fn parse_prefixed(s: &str) -> Result<Self> {
        match s.trim().split_once(':') {
            Some((algo, hex)) => Self::new(algo.parse()?, hex),
            None => Self::new(HashAlgorithm::Sha256, s),
        }
    }

    pub fn to_prefixed_string(&self) -> String {
        format!("{}:{}", self.algorithm, self.value)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Incremental hasher
pub enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Hash {
        let (algorithm, value) = match self {
            Self::Sha256(h) => (HashAlgorithm::Sha256, hex::encode(h.finalize())),
            Self::Sha512(h) => (HashAlgorithm::Sha512, hex::encode(h.finalize())),
        };
        Hash { algorithm, value }
    }
}

/// Hash everything a reader yields
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<Hash> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}

pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Hash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Parse a descriptor hash string; empty means "not verified"
pub fn parse_descriptor_hash(s: &str) -> Result<Option<Hash>> {
    if s.trim().is_empty() {
        return Ok(None);
    }
    Hash::parse_prefixed(s).map(Some)
}

/// Check a downloaded file against a descriptor hash string
///
/// Returns `Ok(false)` when `expected` is empty and nothing was checked.
/// On mismatch the file is removed.
pub fn verify_file(path: &Path, expected: &str) -> Result<bool> {
    match parse_descriptor_hash(expected)? {
        Some(hash) => verify_hash(path, &hash).map(|()| true),
        None => {
            debug!("No hash for {}, skipping verification", path.display());
            Ok(false)
        }
    }
}

/// Check a file against an already parsed digest, removing it on mismatch
pub fn verify_hash(path: &Path, expected: &Hash) -> Result<()> {
    let actual = hash_reader(expected.algorithm, &mut File::open(path)?)?;

    if actual.value != expected.value {
        warn!(
            "{} mismatch for {}: expected {}, got {}",
            expected.algorithm,
            path.display(),
            expected.value,
            actual.value
        );
        let _ = std::fs::remove_file(path);
        return Err(Error::ChecksumMismatch {
            expected: expected.to_prefixed_string(),
            actual: actual.to_prefixed_string(),
        });
    }

    debug!("{} verified ({})", path.display(), expected.algorithm);
    Ok(())
}
