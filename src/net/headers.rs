// src/net/headers.rs

//! HTTP header set and the response-header helpers used by downloads
//!
//! Lookup is case-insensitive and duplicate names are kept in arrival order.

use std::fmt;

/// Ordered multi-map of header names to values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header; existing values with the same name are kept
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace every value of `name` with a single value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// First value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in arrival order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.entries {
            write!(f, "{k}: {v}\r\n")?;
        }
        Ok(())
    }
}

/// Parsed `Content-Length`, or -1 when absent or unparseable
pub fn content_length(headers: &Headers) -> i64 {
    headers
        .get("Content-Length")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(-1)
}

/// Whether the server accepts byte-range requests
pub fn supports_partial_download(headers: &Headers) -> bool {
    headers
        .get("Accept-Ranges")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("bytes"))
}

/// First byte position of a `Content-Range: bytes <start>-<end>/<total>`
pub fn content_range_start(headers: &Headers) -> Option<u64> {
    let value = headers.get("Content-Range")?.trim();
    let (unit, range) = value.split_once(' ')?;
    if !unit.eq_ignore_ascii_case("bytes") {
        return None;
    }
    let (start, _) = range.trim().split_once('-')?;
    start.trim().parse().ok()
}

/// Server-suggested filename from `Content-Disposition`
///
/// Parameters are tried in declaration order; the first one that yields a
/// name wins. `None` means the caller should derive a name from the URL.
/// See RFC 6266 section 4.
pub fn extract_filename(headers: &Headers) -> Option<String> {
    let disposition = headers.get("Content-Disposition")?;
    disposition
        .split(';')
        .filter(|p| !p.trim().is_empty())
        .find_map(resolve_filename)
}

/// Interpret a single `Content-Disposition` parameter
pub fn resolve_filename(param: &str) -> Option<String> {
    let (field, value) = param.trim().split_once('=')?;
    let field = field.trim();
    let value = value.trim();

    if field.eq_ignore_ascii_case("filename") {
        return Some(unquote(value).to_string());
    }
    if !field.eq_ignore_ascii_case("filename*") {
        return None;
    }

    match value.split_once("''") {
        None => Some(unquote(value).to_string()),
        Some((charset, encoded)) if charset.trim().eq_ignore_ascii_case("UTF-8") => {
            urlencoding::decode(encoded).ok().map(|s| s.into_owned())
        }
        // unsupported charset
        Some(_) => None,
    }
}

fn unquote(value: &str) -> &str {
    let value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value)
}
