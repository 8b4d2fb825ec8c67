//! Ordered, case-insensitive header storage.

use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A header name that compares and orders case-insensitively (ASCII only)
/// while remembering the casing it was created with.
#[derive(Debug, Clone)]
pub struct HeaderName(String);

impl HeaderName {
    /// The name as originally written.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HeaderName {
    fn from(name: &str) -> Self {
        HeaderName(name.to_string())
    }
}

impl From<String> for HeaderName {
    fn from(name: String) -> Self {
        HeaderName(name)
    }
}

impl PartialEq for HeaderName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for HeaderName {}

impl PartialOrd for HeaderName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeaderName {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.0.bytes().map(|b| b.to_ascii_lowercase());
        let rhs = other.0.bytes().map(|b| b.to_ascii_lowercase());
        lhs.cmp(rhs)
    }
}

/// Header map ordered by case-insensitive name comparison.
///
/// Values keep the casing they were inserted with; inserting under an
/// existing name (in any casing) replaces the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    map: BTreeMap<HeaderName, String>,
}

impl Headers {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing any existing value under the same name.
    pub fn insert(&mut self, name: impl Into<HeaderName>, value: impl Into<String>) {
        self.map.insert(name.into(), value.into());
    }

    /// Looks up a header value; `name` may be in any casing.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(&HeaderName::from(name)).map(String::as_str)
    }

    /// Whether a header with this name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(&HeaderName::from(name))
    }

    /// Iterates `(name, value)` pairs in case-insensitive name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers stored.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Removes every header.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<N: Into<HeaderName>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}
