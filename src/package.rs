// src/package.rs

//! Resolved package model

use crate::version::PackageVersion;
use serde::Serialize;

/// Virtual-environment setup carried by a descriptor's `venv` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VenvDescriptor {
    pub category: String,
    pub paths: Vec<String>,
    pub includes: Vec<String>,
    pub libs: Vec<String>,
    pub mkdirs: Vec<String>,
    pub envs: Vec<String>,
    pub dependencies: Vec<String>,
}

/// A package resolved from one bucket for one architecture
///
/// `urls` is never empty. An empty `hash` means the download is not
/// verified; otherwise it belongs to the URL set that was selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Bucket the descriptor was read from
    pub bucket: String,
    /// Archive type hint, lower case (`zip`, `7z`, `exe`, ...)
    pub extension: String,
    pub rename: String,
    pub homepage: String,
    pub license: String,
    pub notes: String,
    /// Download URLs in mirror order
    pub urls: Vec<String>,
    pub hash: String,
    pub links: Vec<String>,
    pub launchers: Vec<String>,
    pub force_delete: Vec<String>,
    pub suggest: Vec<String>,
    pub venv: Option<VenvDescriptor>,
    /// Priority of the bucket it came from
    pub weights: i64,
}

impl Package {
    pub fn version(&self) -> PackageVersion {
        PackageVersion::new(self.version.as_str())
    }

    /// `bucket/name@version`
    pub fn display_name(&self) -> String {
        format!("{}/{}@{}", self.bucket, self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        let pkg = Package {
            name: "7zip".into(),
            version: "23.01".into(),
            bucket: "main".into(),
            ..Default::default()
        };
        assert_eq!(pkg.display_name(), "main/7zip@23.01");
        assert!(pkg.version() > PackageVersion::new("22.01"));
    }
}
