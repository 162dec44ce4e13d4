//! Insertion-ordered, case-insensitive header set.

use crate::errors::CrawlflowError;
use reqwest::header::{HeaderName, HeaderValue};

/// An ordered set of HTTP headers.
///
/// Names are unique ignoring ASCII case; the spelling of the most recent
/// write is kept. Each name maps to one or more values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderSet {
    /// Creates an empty header set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// Replaces every value of `name` with `values`.
    ///
    /// A replaced header moves to the end of the set.
    ///
    /// # Errors
    ///
    /// Returns `CrawlflowError::InvalidHeader` if the name or any value is
    /// not valid on the wire.
    pub fn set<I, V>(&mut self, name: &str, values: I) -> Result<(), CrawlflowError>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        validate_name(name)?;
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(CrawlflowError::invalid_header(name, "at least one value is required"));
        }
        for value in &values {
            validate_value(name, value)?;
        }

        if let Some(idx) = self.position(name) {
            self.entries.remove(idx);
        }
        self.entries.push((name.to_string(), values));
        Ok(())
    }

    /// Appends a value to `name`, creating the header if needed.
    ///
    /// # Errors
    ///
    /// Returns `CrawlflowError::InvalidHeader` if the name or value is
    /// not valid on the wire.
    pub fn append(&mut self, name: &str, value: impl Into<String>) -> Result<(), CrawlflowError> {
        validate_name(name)?;
        let value = value.into();
        validate_value(name, &value)?;

        match self.position(name) {
            Some(idx) => self.entries[idx].1.push(value),
            None => self.entries.push((name.to_string(), vec![value])),
        }
        Ok(())
    }

    /// Removes a header. Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Whether the header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Returns every value of the header, or an empty slice.
    #[must_use]
    pub fn get(&self, name: &str) -> &[String] {
        self.position(name)
            .map_or(&[][..], |idx| self.entries[idx].1.as_slice())
    }

    /// Returns the values joined with `", "`, as they would appear on one line.
    #[must_use]
    pub fn get_line(&self, name: &str) -> Option<String> {
        self.position(name).map(|idx| self.entries[idx].1.join(", "))
    }

    /// Iterates over `(name, values)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_name(name: &str) -> Result<(), CrawlflowError> {
    HeaderName::from_bytes(name.as_bytes())
        .map(|_| ())
        .map_err(|e| CrawlflowError::invalid_header(name, e.to_string()))
}

fn validate_value(name: &str, value: &str) -> Result<(), CrawlflowError> {
    HeaderValue::from_str(value)
        .map(|_| ())
        .map_err(|e| CrawlflowError::invalid_header(name, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lookup_ignores_case() {
        let mut headers = HeaderSet::new();
        headers.set("Content-Type", ["text/html"]).unwrap();

        assert!(headers.contains("content-type"));
        assert_eq!(headers.get("CONTENT-TYPE"), &["text/html".to_string()]);
    }

    #[test]
    fn test_set_overwrites_and_moves_to_end() {
        let mut headers = HeaderSet::new();
        headers.set("Accept", ["*/*"]).unwrap();
        headers.set("User-Agent", ["crawlflow"]).unwrap();
        headers.set("accept", ["text/html"]).unwrap();

        let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["User-Agent", "accept"]);
        assert_eq!(headers.get("Accept"), &["text/html".to_string()]);
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_append_accumulates_values() {
        let mut headers = HeaderSet::new();
        headers.append("Cookie", "a=1").unwrap();
        headers.append("cookie", "b=2").unwrap();

        assert_eq!(headers.get_line("Cookie"), Some("a=1, b=2".to_string()));
    }

    #[test]
    fn test_invalid_name_and_value_are_rejected() {
        let mut headers = HeaderSet::new();
        assert!(headers.set("Bad Name", ["x"]).is_err());
        assert!(headers.set("X-Ok", ["line\nbreak"]).is_err());
        assert!(headers.set("X-Empty", Vec::<String>::new()).is_err());
        assert!(headers.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut headers = HeaderSet::new();
        headers.set("X-Trace", ["1"]).unwrap();
        assert!(headers.remove("x-trace"));
        assert!(!headers.remove("x-trace"));
        assert!(headers.get("X-Trace").is_empty());
    }
}
