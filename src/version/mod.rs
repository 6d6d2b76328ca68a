// src/version/mod.rs

//! Package version ordering
//!
//! Bucket descriptors carry free-form version strings (`23.01`, `2.42.0.2`,
//! `1.0.0-beta.2`, `2024-03-01`). Every string goes through the same
//! scheme: a leading `v` and `+build` metadata are dropped, the rest splits
//! on `.`, `-` and `_`, and the pieces compare left to right. Textual pieces
//! sort before the end of a version, which sorts before numeric pieces, so
//! `1.0.0-beta.2 < 1.0.0 < 1.0.0.1` and `1.2.rc1 < 1.2.0`.

use std::cmp::Ordering;
use std::fmt;

/// A descriptor version string with lenient ordering
#[derive(Debug, Clone)]
pub struct PackageVersion(String);

impl PackageVersion {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare two version strings
    pub fn compare(&self, other: &Self) -> Ordering {
        let left = tokens(&self.0);
        let right = tokens(&other.0);
        let len = left.len().max(right.len());
        (0..len)
            .map(|i| {
                let x = left.get(i).unwrap_or(&Token::End);
                let y = right.get(i).unwrap_or(&Token::End);
                x.cmp(y)
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// One comparable piece of a version; variant order is sort order
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Token<'a> {
    /// Lowercased text (`beta`, `rc1`, `2a`)
    Text(String),
    /// Padding past the last piece
    End,
    /// Digits without leading zeros, ordered by length then value
    Num(usize, &'a str),
}

fn tokens(s: &str) -> Vec<Token<'_>> {
    let s = s.trim_start_matches(['v', 'V']);
    let s = s.split_once('+').map_or(s, |(core, _build)| core);
    s.split(['.', '-', '_'])
        .filter(|seg| !seg.is_empty())
        .map(|seg| {
            if seg.bytes().all(|b| b.is_ascii_digit()) {
                let digits = seg.trim_start_matches('0');
                Token::Num(digits.len(), digits)
            } else {
                Token::Text(seg.to_ascii_lowercase())
            }
        })
        .collect()
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for PackageVersion {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        PackageVersion::new(s)
    }

    #[test]
    fn test_prerelease_precedence() {
        assert!(v("1.0.0-beta.2") < v("1.0.0"));
        assert!(v("1.10.0") > v("1.9.9"));
        assert_eq!(v("v2.0.0"), v("2.0.0"));
        assert_eq!(v("1.4.0+build.7"), v("1.4.0"));
        assert!(v("1.0") < v("1.0.0"));
    }

    #[test]
    fn test_numeric_segments() {
        assert!(v("23.01") > v("22.01"));
        assert!(v("2.42.0.2") > v("2.42.0"));
        assert!(v("2.9") < v("2.10"));
        assert!(v("2024-03-01") > v("2023-12-31"));
    }

    #[test]
    fn test_mixed_segments() {
        assert!(v("1.2.rc1") < v("1.2.0"));
        assert!(v("1.2a") < v("1.2b"));
        assert_eq!(v("1.0.0.0").cmp(&v("1.0.0.0")), Ordering::Equal);
    }

    #[test]
    fn test_ordering_is_transitive() {
        let mut versions: Vec<PackageVersion> = [
            "1.0.0", "1.0.0-rc.1", "1.0", "1.0.0.1", "1.0.a", "1.0.0-1", "v1.0.0-alpha", "01.0.0",
            "1.0.0_beta", "99999999999999999999999.0", "2.0", "",
        ]
        .into_iter()
        .map(v)
        .collect();
        versions.sort();

        for (i, a) in versions.iter().enumerate() {
            for b in &versions[i..] {
                assert_ne!(a.cmp(b), Ordering::Greater, "{a} > {b}");
                for c in &versions {
                    if a <= b && b <= c {
                        assert!(a <= c, "{a} <= {b} <= {c} but {a} > {c}");
                    }
                }
            }
        }
        assert_eq!(versions.last().unwrap().as_str(), "99999999999999999999999.0");
    }

    #[test]
    fn test_leading_zeros_compare_numerically() {
        assert_eq!(v("01.0.0"), v("1.0.0"));
        assert!(v("1.010") > v("1.9"));
    }

    #[test]
    fn test_empty_sorts_first() {
        assert!(v("") < v("0.1"));
    }
}
