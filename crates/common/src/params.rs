//! Canonical parameter sets.
//!
//! A [`ParamMap`] is the outgoing request body and the input to signing. It
//! keeps insertion order (what a browser form submits) and can produce an
//! independent key-sorted view (what gets signed and what SDK strings use).
//! Keys are unique: inserting a key twice is an error rather than an
//! overwrite, and empty values are never stored.

use error_stack::Report;

use crate::error::AlipayError;

/// Insertion-ordered string map with unique keys and no empty values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamMap {
    entries: Vec<(String, String)>,
}

impl ParamMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`. Empty values are silently skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AlipayError::DuplicateParameter`] if `key` is already present.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), Report<AlipayError>> {
        let value = value.into();
        if value.is_empty() {
            return Ok(());
        }

        let key = key.into();
        if self.contains_key(&key) {
            return Err(Report::new(AlipayError::DuplicateParameter { key }));
        }

        self.entries.push((key, value));
        Ok(())
    }

    /// Like [`ParamMap::insert`], treating `None` as empty.
    ///
    /// # Errors
    ///
    /// Returns [`AlipayError::DuplicateParameter`] if `key` is already present.
    pub fn insert_opt(
        &mut self,
        key: impl Into<String>,
        value: Option<&str>,
    ) -> Result<(), Report<AlipayError>> {
        match value {
            Some(value) => self.insert(key, value),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates in the map's current order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns an independent copy ordered by key, byte-wise ascending.
    #[must_use]
    pub fn sorted(&self) -> Self {
        let mut entries = self.entries.clone();
        entries.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));
        Self { entries }
    }

    /// URL-encodes every pair and joins them with `&` in the current order.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Merges `other` into `self`, failing on the first colliding key.
    ///
    /// # Errors
    ///
    /// Returns [`AlipayError::DuplicateParameter`] on a key collision.
    pub fn extend_from(&mut self, other: &ParamMap) -> Result<(), Report<AlipayError>> {
        for (k, v) in other.iter() {
            self.insert(k, v)?;
        }
        Ok(())
    }

    /// Parses an `application/x-www-form-urlencoded` string.
    ///
    /// Later duplicates are rejected the same way [`ParamMap::insert`] rejects them.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate keys.
    pub fn from_query_string(query: &str) -> Result<Self, Report<AlipayError>> {
        let mut params = Self::new();
        for (k, v) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            params.insert(k.into_owned(), v.into_owned())?;
        }
        Ok(params)
    }
}

/// A file attached to an upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileItem {
    pub file_name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl FileItem {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: "application/octet-stream".to_string(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file_name.is_empty() || self.content.is_empty()
    }
}

/// Named file attachments, keyed by form field name.
pub type FileParams = Vec<(String, FileItem)>;

/// Drops attachments with an empty field name, file name, or content.
#[must_use]
pub fn cleanup_file_params(files: &[(String, FileItem)]) -> FileParams {
    files
        .iter()
        .filter(|(name, item)| !name.is_empty() && !item.is_empty())
        .cloned()
        .collect()
}
