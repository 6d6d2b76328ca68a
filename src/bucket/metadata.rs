// src/bucket/metadata.rs

//! Native descriptor decoding
//!
//! Download URLs, hashes, links and launchers are chosen per architecture by
//! walking an ordered candidate table; the first candidate whose key is
//! present (as a non-empty string or string array) wins.

use crate::error::{Error, Result};
use crate::package::{Package, VenvDescriptor};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Target architecture for descriptor selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X64,
    Arm64,
    /// Any other target: only the unsuffixed keys apply
    Other,
}

impl Arch {
    /// Architecture of the running binary
    pub fn host() -> Self {
        if cfg!(target_arch = "x86_64") {
            Self::X64
        } else if cfg!(target_arch = "aarch64") {
            Self::Arm64
        } else {
            Self::Other
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::X64 => "x64",
            Self::Arm64 => "arm64",
            Self::Other => "generic",
        }
    }

    /// `(url key, hash key)` candidates in priority order
    pub const fn url_candidates(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::X64 => &[("url64", "url64.hash"), ("url", "url.hash")],
            Self::Arm64 => &[
                ("urlarm64", "urlarm64.hash"),
                ("url", "url.hash"),
                ("url64", "url64.hash"),
            ],
            Self::Other => &[("url", "url.hash")],
        }
    }

    pub const fn link_keys(&self) -> &'static [&'static str] {
        match self {
            Self::X64 => &["links64", "links"],
            Self::Arm64 => &["linksarm64", "links", "links64"],
            Self::Other => &["links"],
        }
    }

    pub const fn launcher_keys(&self) -> &'static [&'static str] {
        match self {
            Self::X64 => &["launchers64", "launchers"],
            Self::Arm64 => &["launchersarm64", "launchers"],
            Self::Other => &["launchers"],
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "x64" | "x86_64" | "amd64" => Ok(Self::X64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            "generic" | "other" => Ok(Self::Other),
            _ => Err(Error::Config(format!("unknown architecture: {s}"))),
        }
    }
}

/// Read and parse a descriptor file
pub fn load_descriptor(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
        _ => Error::DescriptorParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })?;
    let doc: Value = serde_json::from_str(&text).map_err(|e| Error::DescriptorParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !doc.is_object() {
        return Err(Error::DescriptorParse {
            path: path.to_path_buf(),
            reason: "descriptor is not a JSON object".to_string(),
        });
    }
    Ok(doc)
}

/// String field, empty when absent or not a string
fn fetch(doc: &Value, key: &str) -> String {
    doc.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// String or string-array field; `None` when absent or empty
fn fetch_strings(doc: &Value, key: &str) -> Option<Vec<String>> {
    let values: Vec<String> = match doc.get(key)? {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => return None,
    };
    let values: Vec<String> = values.into_iter().filter(|s| !s.trim().is_empty()).collect();
    if values.is_empty() { None } else { Some(values) }
}

fn first_present(doc: &Value, keys: &[&str]) -> Option<Vec<String>> {
    keys.iter().find_map(|key| fetch_strings(doc, key))
}

/// Pick the URL list and its hash for `arch`
pub fn select_urls(doc: &Value, arch: Arch) -> Option<(Vec<String>, String)> {
    arch.url_candidates()
        .iter()
        .find_map(|(url_key, hash_key)| Some((fetch_strings(doc, url_key)?, fetch(doc, hash_key))))
}

/// Link targets for `arch`
pub fn select_links(doc: &Value, arch: Arch) -> Vec<String> {
    first_present(doc, arch.link_keys()).unwrap_or_default()
}

/// Launcher targets for `arch`
///
/// On ARM64 a descriptor without any launcher key reuses the resolved links.
pub fn select_launchers(doc: &Value, arch: Arch, links: &[String]) -> Vec<String> {
    match first_present(doc, arch.launcher_keys()) {
        Some(launchers) => launchers,
        None if arch == Arch::Arm64 => links.to_vec(),
        None => Vec::new(),
    }
}

fn decode_venv(doc: &Value) -> Option<VenvDescriptor> {
    let venv = doc.get("venv").filter(|v| v.is_object())?;
    let list = |key: &str| fetch_strings(venv, key).unwrap_or_default();
    Some(VenvDescriptor {
        category: fetch(venv, "category"),
        paths: list("path"),
        includes: list("include"),
        libs: list("lib"),
        mkdirs: list("mkdir"),
        envs: list("env"),
        dependencies: list("dependencies"),
    })
}

/// Build a `Package` from a parsed descriptor
///
/// `path` is used only for error reporting.
pub fn decode_package(doc: &Value, name: &str, bucket: &str, path: &Path, arch: Arch) -> Result<Package> {
    let (urls, hash) = select_urls(doc, arch).ok_or_else(|| Error::NotPorted {
        path: path.to_path_buf(),
        arch: arch.name().to_string(),
    })?;
    let links = select_links(doc, arch);
    let launchers = select_launchers(doc, arch, &links);

    Ok(Package {
        name: name.to_string(),
        version: fetch(doc, "version"),
        description: fetch(doc, "description"),
        bucket: bucket.to_string(),
        extension: fetch(doc, "extension").to_ascii_lowercase(),
        rename: fetch(doc, "rename"),
        homepage: fetch(doc, "homepage"),
        license: fetch(doc, "license"),
        notes: fetch(doc, "notes"),
        urls,
        hash,
        links,
        launchers,
        force_delete: fetch_strings(doc, "force_delete").unwrap_or_default(),
        suggest: fetch_strings(doc, "suggest").unwrap_or_default(),
        venv: decode_venv(doc),
        weights: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(doc: Value, arch: Arch) -> Result<Package> {
        decode_package(&doc, "tool", "main", Path::new("/b/main/bucket/tool.json"), arch)
    }

    #[test]
    fn test_x64_prefers_url64() {
        let doc = json!({
            "url": "https://e.com/x86.zip", "url.hash": "h32",
            "url64": ["https://e.com/x64.zip", "https://mirror.e.com/x64.zip"], "url64.hash": "h64"
        });
        let (urls, hash) = select_urls(&doc, Arch::X64).unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], "https://e.com/x64.zip");
        assert_eq!(hash, "h64");
    }

    #[test]
    fn test_x64_falls_back_to_url() {
        let doc = json!({ "url": "https://e.com/any.zip", "url.hash": "h" });
        let (urls, hash) = select_urls(&doc, Arch::X64).unwrap();
        assert_eq!(urls, vec!["https://e.com/any.zip"]);
        assert_eq!(hash, "h");
    }

    #[test]
    fn test_arm64_prefers_generic_url_over_url64() {
        let doc = json!({
            "url": "https://e.com/generic.zip", "url.hash": "hg",
            "url64": "https://e.com/x64.zip", "url64.hash": "h64"
        });
        let (urls, hash) = select_urls(&doc, Arch::Arm64).unwrap();
        assert_eq!(urls, vec!["https://e.com/generic.zip"]);
        assert_eq!(hash, "hg");

        let mut doc = doc;
        doc["urlarm64"] = json!("https://e.com/arm64.zip");
        doc["urlarm64.hash"] = json!("harm");
        let (urls, hash) = select_urls(&doc, Arch::Arm64).unwrap();
        assert_eq!(urls, vec!["https://e.com/arm64.zip"]);
        assert_eq!(hash, "harm");
    }

    #[test]
    fn test_arm64_last_resort_url64() {
        let doc = json!({ "url64": "https://e.com/x64.zip" });
        let (urls, hash) = select_urls(&doc, Arch::Arm64).unwrap();
        assert_eq!(urls, vec!["https://e.com/x64.zip"]);
        assert_eq!(hash, "");
    }

    #[test]
    fn test_other_arch_uses_url_only() {
        let doc = json!({ "url64": "https://e.com/x64.zip" });
        let err = decode(doc, Arch::Other).unwrap_err();
        assert!(matches!(err, Error::NotPorted { ref arch, .. } if arch == "generic"));
    }

    #[test]
    fn test_not_ported_names_path_and_arch() {
        let err = decode(json!({ "version": "1.0" }), Arch::X64).unwrap_err();
        match err {
            Error::NotPorted { path, arch } => {
                assert_eq!(path, Path::new("/b/main/bucket/tool.json"));
                assert_eq!(arch, "x64");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_url_candidate_is_skipped() {
        let doc = json!({ "url64": [], "url": "https://e.com/a.zip" });
        let (urls, _) = select_urls(&doc, Arch::X64).unwrap();
        assert_eq!(urls, vec!["https://e.com/a.zip"]);
    }

    #[test]
    fn test_links_and_launchers_fallback() {
        let doc = json!({
            "url": "u",
            "links": ["bin/a.exe"],
            "links64": ["bin64/a.exe"],
            "launchers": ["a.exe"]
        });
        let pkg = decode(doc.clone(), Arch::X64).unwrap();
        assert_eq!(pkg.links, vec!["bin64/a.exe"]);
        assert_eq!(pkg.launchers, vec!["a.exe"]);

        let pkg = decode(doc, Arch::Arm64).unwrap();
        assert_eq!(pkg.links, vec!["bin/a.exe"]);
        assert_eq!(pkg.launchers, vec!["a.exe"]);
    }

    #[test]
    fn test_arm64_links_last_resort_links64() {
        let doc = json!({ "url": "u", "links64": ["bin64/a.exe"] });
        let pkg = decode(doc, Arch::Arm64).unwrap();
        assert_eq!(pkg.links, vec!["bin64/a.exe"]);
    }

    #[test]
    fn test_arm64_launchers_reuse_links() {
        let doc = json!({ "url": "u", "links": ["bin/a.exe"] });
        let pkg = decode(doc.clone(), Arch::Arm64).unwrap();
        assert_eq!(pkg.launchers, vec!["bin/a.exe"]);

        let pkg = decode(doc, Arch::X64).unwrap();
        assert!(pkg.launchers.is_empty());
    }

    #[test]
    fn test_common_fields_and_venv() {
        let doc = json!({
            "description": "Archiver",
            "version": "23.01",
            "extension": "ZIP",
            "homepage": "https://7-zip.org",
            "license": "LGPL",
            "notes": "n",
            "rename": "7z.zip",
            "url": "u",
            "suggest": ["wget", "curl"],
            "force_delete": "data/cache",
            "venv": {
                "category": "python",
                "path": ["bin", "Scripts"],
                "env": ["PYTHONHOME={BAULK_VENV}"],
                "dependencies": "vc-runtime"
            }
        });
        let pkg = decode(doc, Arch::X64).unwrap();
        assert_eq!(pkg.extension, "zip");
        assert_eq!(pkg.version, "23.01");
        assert_eq!(pkg.rename, "7z.zip");
        assert_eq!(pkg.suggest, vec!["wget", "curl"]);
        assert_eq!(pkg.force_delete, vec!["data/cache"]);
        let venv = pkg.venv.unwrap();
        assert_eq!(venv.category, "python");
        assert_eq!(venv.paths, vec!["bin", "Scripts"]);
        assert!(venv.includes.is_empty());
        assert!(venv.libs.is_empty());
        assert!(venv.mkdirs.is_empty());
        assert_eq!(venv.envs.len(), 1);
        assert_eq!(venv.dependencies, vec!["vc-runtime"]);
    }

    #[test]
    fn test_missing_optional_fields() {
        let pkg = decode(json!({ "url": "u" }), Arch::X64).unwrap();
        assert!(pkg.suggest.is_empty());
        assert!(pkg.force_delete.is_empty());
        assert!(pkg.venv.is_none());
        assert_eq!(pkg.description, "");
    }

    #[test]
    fn test_load_descriptor_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(load_descriptor(&bad), Err(Error::DescriptorParse { .. })));

        let array = dir.path().join("array.json");
        std::fs::write(&array, "[1, 2]").unwrap();
        assert!(matches!(load_descriptor(&array), Err(Error::DescriptorParse { .. })));

        assert!(matches!(
            load_descriptor(&dir.path().join("missing.json")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_arch_parse() {
        assert_eq!("aarch64".parse::<Arch>().unwrap(), Arch::Arm64);
        assert_eq!("AMD64".parse::<Arch>().unwrap(), Arch::X64);
        assert!("mips".parse::<Arch>().is_err());
    }
}
