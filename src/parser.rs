//! Response line parsing
//!
//! The device answers in two shapes: `<key> : <value>` inside a bulk
//! `status` block and `<key> <value>` for single-field queries and sets.

use crate::error::Result;
use crate::field::Field;
use regex::Regex;
use tracing::debug;

/// Turns raw response lines into `(Field, value)` pairs
pub struct ResponseParser {
    status_pattern: Regex,
    field_pattern: Regex,
}

impl ResponseParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            status_pattern: Regex::new(r"^(?P<key>.+?) :(?P<value>(?: .*)?)$")?,
            field_pattern: Regex::new(r"^(?P<key>\S+) (?P<value>.+)$")?,
        })
    }

    /// Split a line into key and value without resolving the key.
    ///
    /// Returns `None` for blank lines and lines without a non-empty value.
    pub fn split<'a>(&self, line: &'a str) -> Option<(&'a str, &'a str)> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let captures = self
            .status_pattern
            .captures(line)
            .or_else(|| self.field_pattern.captures(line))?;
        let key = captures.name("key")?.as_str();
        let value = captures.name("value")?.as_str().trim();
        if value.is_empty() {
            return None;
        }
        Some((key, value))
    }

    /// Parse a line into a known field and its value
    pub fn parse(&self, line: &str) -> Option<(Field, String)> {
        let (key, value) = self.split(line)?;
        match Field::from_key(key) {
            Some(field) => Some((field, value.to_string())),
            None => {
                debug!("Ignoring unknown key {}", key);
                None
            }
        }
    }
}
