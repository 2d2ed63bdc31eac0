//! `KEY=VALUE` parameter files
//!
//! Shared by the program cache descriptors and by run-parameter files. One
//! entry per line; `#` starts a comment that runs to the end of the line;
//! keys and values are trimmed; blank lines are skipped. Keys compare
//! case-insensitively and a repeated key keeps its last value.
//!
//! `\#` and `\\` in a value stand for a literal `#` and `\`; other
//! backslashes are kept as written. [`Display`](fmt::Display) escapes values
//! the same way, so every single-line value with no surrounding whitespace
//! survives a write/parse round trip.

use crate::error::{Error, Result};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Line content before the first unescaped `#`.
fn strip_comment(raw: &str) -> &str {
    let mut escaped = false;
    for (i, c) in raw.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '#' {
            return &raw[..i];
        }
    }
    raw
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next @ ('\\' | '#')) = chars.peek() {
                out.push(next);
                chars.next();
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('#', "\\#")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamFile {
    entries: Vec<(String, String)>,
}

impl ParamFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut params = Self::new();
        for (n, raw) in text.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| Error::Parse {
                line: n + 1,
                message: format!("expected KEY=VALUE, got '{line}'"),
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::Parse {
                    line: n + 1,
                    message: "empty key".to_string(),
                });
            }
            params.set(key, unescape(value.trim()));
        }
        Ok(params)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Insert or replace a key, keeping first-insertion order.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Parse a value, returning `Ok(None)` when the key is absent.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(key)
            .map(|v| {
                v.parse::<T>().map_err(|e| {
                    Error::InvalidConfig(format!("{key}: cannot parse '{v}': {e}"))
                })
            })
            .transpose()
    }

    /// Boolean flag accepting `1/0`, `true/false`, `yes/no`, `on/off`.
    pub fn get_flag(&self, key: &str) -> Result<Option<bool>> {
        self.get(key)
            .map(|v| match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(Error::InvalidConfig(format!("{key}: '{v}' is not a flag"))),
            })
            .transpose()
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

impl fmt::Display for ParamFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.entries {
            writeln!(f, "{k}={}", escape(v))?;
        }
        Ok(())
    }
}
