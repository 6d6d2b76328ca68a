// src/lib.rs

//! Pallet package acquisition engine
//!
//! Resolves packages from bucket descriptors and fetches them over a native
//! HTTP/1.1 transport.
//!
//! # Architecture
//!
//! - `bucket`: descriptor lookup, per-architecture URL/link/launcher
//!   selection, search across buckets
//! - `net`: session/connection/request handles over TCP and rustls with a
//!   status observer, plus a redirect-following client
//! - `download`: resumable transfers with hash verification
//! - `lock`: cross-process install lock

pub mod bucket;
pub mod config;
pub mod download;
mod error;
pub mod hash;
pub mod lock;
pub mod net;
pub mod package;
pub mod paths;
pub mod progress;
pub mod version;

pub use bucket::metadata::Arch;
pub use bucket::{Bucket, BucketRegistry, BucketVariant};
pub use config::Config;
pub use download::Downloader;
pub use error::{Error, Result};
pub use hash::{Hash, HashAlgorithm, Hasher};
pub use lock::InstallLock;
pub use net::{HttpClient, Url};
pub use package::{Package, VenvDescriptor};
pub use paths::Layout;
pub use progress::{BarProgress, CallbackProgress, LogProgress, ProgressEvent, ProgressTracker, SilentProgress};
pub use version::PackageVersion;
