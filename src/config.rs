// src/config.rs

//! Configuration file
//!
//! TOML, read from an explicit path, `$PALLET_CONFIG`, or
//! `<config dir>/pallet/config.toml`. A missing default file means default
//! settings; a missing explicit file is an error.
//!
//! ```toml
//! root = "/opt/pallet"
//! proxy = "http://proxy.local:3128"
//!
//! [transport]
//! connect_timeout_secs = 10
//!
//! [[bucket]]
//! name = "main"
//! url = "https://github.com/baulk/bucket"
//! weights = 100
//! ```

use crate::bucket::Bucket;
use crate::error::{Error, Result};
use crate::net::client::{DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_REDIRECTS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "PALLET_CONFIG";

/// Environment variable overriding `root`
pub const ROOT_ENV: &str = "PALLET_ROOT";

/// Transport tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub max_body_size: usize,
    pub max_redirects: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory for buckets, downloads and locks
    pub root: PathBuf,
    pub user_agent: String,
    /// Explicit proxy; environment discovery applies when unset
    pub proxy: Option<String>,
    /// Skip TLS certificate validation
    pub insecure: bool,
    /// Observer diagnostics
    pub debug: bool,
    pub transport: TransportConfig,
    #[serde(rename = "bucket")]
    pub buckets: Vec<Bucket>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            user_agent: concat!("pallet/", env!("CARGO_PKG_VERSION")).to_string(),
            proxy: None,
            insecure: false,
            debug: false,
            transport: TransportConfig::default(),
            buckets: Vec::new(),
        }
    }
}

fn default_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pallet")
}

impl Config {
    /// Parse a TOML document
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load using the process environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with(explicit, |name| std::env::var(name).ok())
    }

    /// Load with a custom environment lookup
    pub fn load_with(explicit: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let from_env = env(CONFIG_ENV).filter(|v| !v.is_empty()).map(PathBuf::from);
        let required = explicit.map(Path::to_path_buf).or(from_env);

        let mut config = match required {
            Some(path) => Self::read(&path)?,
            None => match dirs::config_dir().map(|d| d.join("pallet").join("config.toml")) {
                Some(path) if path.exists() => Self::read(&path)?,
                _ => {
                    debug!("No configuration file, using defaults");
                    Self::default()
                }
            },
        };

        if let Some(root) = env(ROOT_ENV).filter(|v| !v.is_empty()) {
            config.root = PathBuf::from(root);
        }
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    fn validate(&self) -> Result<()> {
        for (i, bucket) in self.buckets.iter().enumerate() {
            if bucket.name.trim().is_empty() {
                return Err(Error::Config(format!("bucket #{} has no name", i + 1)));
            }
            if self.buckets[..i].iter().any(|b| b.name.eq_ignore_ascii_case(&bucket.name)) {
                return Err(Error::Config(format!("duplicate bucket '{}'", bucket.name)));
            }
        }
        if self.transport.max_body_size == 0 {
            return Err(Error::Config("transport.max_body_size must be positive".into()));
        }
        Ok(())
    }
}
