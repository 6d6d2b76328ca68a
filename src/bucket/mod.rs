// src/bucket/mod.rs

//! Buckets and the package resolver
//!
//! A bucket is a directory of JSON descriptors under
//! `<root>/<bucket>/bucket/<name>.json`. The registry holds the configured
//! buckets in configuration order and resolves, enumerates and searches
//! packages across them.

pub mod metadata;

use crate::error::{Error, Result};
use crate::package::Package;
use glob::{MatchOptions, Pattern};
use metadata::{decode_package, load_descriptor, Arch};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Descriptor layout dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketVariant {
    #[default]
    Native,
    Scoop,
}

impl fmt::Display for BucketVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Scoop => write!(f, "scoop"),
        }
    }
}

/// A configured metadata source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Upstream location the bucket is synced from
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub variant: BucketVariant,
    /// Higher wins when two buckets carry the same version
    #[serde(default)]
    pub weights: i64,
}

impl Bucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            url: String::new(),
            variant: BucketVariant::Native,
            weights: 0,
        }
    }
}

/// Configured buckets rooted at one directory
#[derive(Debug, Clone)]
pub struct BucketRegistry {
    root: PathBuf,
    buckets: Vec<Bucket>,
    arch: Arch,
}

impl BucketRegistry {
    pub fn new(root: impl Into<PathBuf>, buckets: Vec<Bucket>) -> Self {
        Self {
            root: root.into(),
            buckets,
            arch: Arch::host(),
        }
    }

    /// Resolve descriptors for a different architecture
    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = arch;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn bucket(&self, name: &str) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.name.eq_ignore_ascii_case(name))
    }

    /// Folder holding a bucket's descriptors
    pub fn descriptor_dir(&self, bucket: &Bucket) -> PathBuf {
        self.root.join(&bucket.name).join("bucket")
    }

    /// Descriptor file for `name`; `<name>.json` unless only a differently
    /// cased extension exists
    pub fn descriptor_path(&self, bucket: &Bucket, name: &str) -> PathBuf {
        let dir = self.descriptor_dir(bucket);
        let path = dir.join(format!("{name}.json"));
        if path.exists() {
            return path;
        }
        fs::read_dir(&dir)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|candidate| descriptor_stem(candidate) == Some(name))
            .unwrap_or(path)
    }

    /// Load one package from one bucket
    pub fn resolve(&self, bucket: &Bucket, name: &str) -> Result<Package> {
        match bucket.variant {
            BucketVariant::Native => {
                let path = self.descriptor_path(bucket, name);
                let doc = load_descriptor(&path)?;
                let mut pkg = decode_package(&doc, name, &bucket.name, &path, self.arch)?;
                pkg.weights = bucket.weights;
                Ok(pkg)
            }
            BucketVariant::Scoop => Err(Error::NotImplemented(format!(
                "scoop bucket '{}' cannot be loaded",
                bucket.name
            ))),
        }
    }

    /// Call `on_match(bucket, name)` for every descriptor name accepted by
    /// `predicate`
    ///
    /// Buckets are visited in configuration order, names within a bucket in
    /// sorted order. Hidden entries and non-files are skipped; a bucket
    /// whose folder cannot be read is skipped as well.
    pub fn for_each_matching<P, M>(&self, mut predicate: P, mut on_match: M)
    where
        P: FnMut(&str) -> bool,
        M: FnMut(&Bucket, &str),
    {
        for bucket in &self.buckets {
            let dir = self.descriptor_dir(bucket);
            debug!("Searching bucket {} in {}", bucket.name, dir.display());
            for name in descriptor_names(&dir) {
                if predicate(&name) {
                    on_match(bucket, &name);
                }
            }
        }
    }

    /// Packages whose name matches a case-insensitive glob
    ///
    /// A pattern without wildcards matches as a substring. Descriptors that
    /// fail to resolve are logged and skipped.
    pub fn search(&self, pattern: &str) -> Result<Vec<Package>> {
        let pattern = if pattern.contains(['*', '?', '[']) {
            pattern.to_string()
        } else {
            format!("*{pattern}*")
        };
        let matcher = Pattern::new(&pattern)
            .map_err(|e| Error::Config(format!("invalid search pattern '{pattern}': {e}")))?;
        let options = MatchOptions {
            case_sensitive: false,
            ..Default::default()
        };

        let mut found = Vec::new();
        self.for_each_matching(
            |name| matcher.matches_with(name, options),
            |bucket, name| match self.resolve(bucket, name) {
                Ok(pkg) => found.push(pkg),
                Err(e) => warn!("Skipping {}/{}: {}", bucket.name, name, e),
            },
        );
        Ok(found)
    }

    /// Best candidate for `name` across all buckets
    ///
    /// The highest version wins; equal versions go to the bucket with the
    /// higher weights, then to the one configured first.
    pub fn find(&self, name: &str) -> Result<Package> {
        let mut best: Option<Package> = None;
        let mut first_err = None;

        for bucket in &self.buckets {
            match self.resolve(bucket, name) {
                Ok(pkg) => {
                    let better = best.as_ref().is_none_or(|cur| {
                        (pkg.version(), pkg.weights) > (cur.version(), cur.weights)
                    });
                    if better {
                        best = Some(pkg);
                    }
                }
                Err(Error::NotFound(_)) => {}
                Err(e) => {
                    warn!("{} in bucket {}: {}", name, bucket.name, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        match (best, first_err) {
            (Some(pkg), _) => Ok(pkg),
            (None, Some(e)) => Err(e),
            (None, None) => Err(Error::NotFound(format!("package '{name}' in any bucket"))),
        }
    }
}

/// Sorted descriptor names (without `.json`) in a folder
///
/// Symlinks are followed; the extension matches in any case.
fn descriptor_names(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| fs::metadata(path).is_ok_and(|m| m.is_file()))
        .filter_map(|path| descriptor_stem(&path).map(str::to_string))
        .collect();
    names.sort();
    names
}

/// Package name of a descriptor path, skipping hidden files
fn descriptor_stem(path: &Path) -> Option<&str> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let stem = path.file_stem()?.to_str()?;
    (is_json && !stem.is_empty() && !stem.starts_with('.')).then_some(stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, bucket: &str, name: &str, body: &str) {
        let dir = root.join(bucket).join("bucket");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), body).unwrap();
    }

    fn registry(root: &Path, names: &[&str]) -> BucketRegistry {
        BucketRegistry::new(root, names.iter().map(|n| Bucket::new(*n)).collect()).with_arch(Arch::X64)
    }

    #[test]
    fn test_resolve_native() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "main", "git.json", r#"{"version": "2.42.0", "url": "https://e.com/git.zip"}"#);
        let mut reg = registry(tmp.path(), &["main"]);
        reg.buckets[0].weights = 7;

        let bucket = reg.bucket("MAIN").unwrap().clone();
        let pkg = reg.resolve(&bucket, "git").unwrap();
        assert_eq!(pkg.bucket, "main");
        assert_eq!(pkg.urls, vec!["https://e.com/git.zip"]);
        assert_eq!(pkg.weights, 7);
    }

    #[test]
    fn test_scoop_not_implemented() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "extras", "git.json", r#"{"url": "u"}"#);
        let mut bucket = Bucket::new("extras");
        bucket.variant = BucketVariant::Scoop;
        let reg = BucketRegistry::new(tmp.path(), vec![bucket.clone()]);
        assert!(matches!(reg.resolve(&bucket, "git"), Err(Error::NotImplemented(_))));
    }

    #[test]
    fn test_enumeration_skips_hidden_and_non_json() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "main", "b.json", "{}");
        write(tmp.path(), "main", "a.json", "{}");
        write(tmp.path(), "main", ".hidden.json", "{}");
        write(tmp.path(), "main", "README.md", "");
        fs::create_dir_all(tmp.path().join("main/bucket/dir.json")).unwrap();

        let reg = registry(tmp.path(), &["main", "missing"]);
        let mut seen = Vec::new();
        reg.for_each_matching(|_| true, |b, n| seen.push(format!("{}/{}", b.name, n)));
        assert_eq!(seen, vec!["main/a", "main/b"]);
    }

    #[test]
    fn test_enumeration_follows_symlinks_and_any_extension_case() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "main", "Upper.JSON", r#"{"version": "1.0", "url": "https://e/u.zip"}"#);
        write(tmp.path(), "shared", "linked.json", r#"{"version": "2.0", "url": "https://e/l.zip"}"#);
        #[cfg(unix)]
        std::os::unix::fs::symlink(
            tmp.path().join("shared/bucket/linked.json"),
            tmp.path().join("main/bucket/linked.json"),
        )
        .unwrap();

        let reg = registry(tmp.path(), &["main"]);
        let mut seen = Vec::new();
        reg.for_each_matching(|_| true, |_, n| seen.push(n.to_string()));
        #[cfg(unix)]
        assert_eq!(seen, vec!["Upper", "linked"]);
        #[cfg(not(unix))]
        assert_eq!(seen, vec!["Upper"]);

        let bucket = reg.bucket("main").unwrap().clone();
        assert_eq!(reg.resolve(&bucket, "Upper").unwrap().version, "1.0");
        #[cfg(unix)]
        assert_eq!(reg.resolve(&bucket, "linked").unwrap().urls, vec!["https://e/l.zip"]);
    }

    #[test]
    fn test_search_is_case_insensitive_and_skips_broken() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "main", "Python3.json", r#"{"url": "u"}"#);
        write(tmp.path(), "main", "python-broken.json", "{");
        write(tmp.path(), "main", "ruby.json", r#"{"url": "u"}"#);

        let reg = registry(tmp.path(), &["main"]);
        let found = reg.search("PYTHON").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Python3");

        let found = reg.search("r?by").unwrap();
        assert_eq!(found.len(), 1);
        assert!(reg.search("[").is_err());
    }

    #[test]
    fn test_find_prefers_version_then_weights() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a", "tool.json", r#"{"version": "1.2.0", "url": "a"}"#);
        write(tmp.path(), "b", "tool.json", r#"{"version": "1.10.0", "url": "b"}"#);
        write(tmp.path(), "c", "tool.json", r#"{"version": "1.10.0", "url": "c"}"#);

        let mut reg = registry(tmp.path(), &["a", "b", "c"]);
        assert_eq!(reg.find("tool").unwrap().bucket, "b");

        reg.buckets[2].weights = 10;
        assert_eq!(reg.find("tool").unwrap().bucket, "c");
    }

    #[test]
    fn test_find_missing_and_failing() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a", "x64only.json", r#"{"url64": "u"}"#);
        let reg = registry(tmp.path(), &["a"]);
        assert!(matches!(reg.find("nothing"), Err(Error::NotFound(_))));

        let reg = reg.with_arch(Arch::Other);
        assert!(matches!(reg.find("x64only"), Err(Error::NotPorted { .. })));
    }
}
