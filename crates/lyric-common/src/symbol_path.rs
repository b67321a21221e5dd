//! Symbol paths.

use std::fmt;
use std::str::FromStr;

use crate::{CommonError, Result};

/// Dotted path naming a symbol inside one object, e.g. `Point.$ctor`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolPath {
    parts: Vec<String>,
}

impl SymbolPath {
    pub fn new<S: Into<String>>(parts: impl IntoIterator<Item = S>) -> Self {
        Self { parts: parts.into_iter().map(Into::into).collect() }
    }

    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(CommonError::InvalidPath(s.to_string()));
        }
        let parts: Vec<String> = s.split('.').map(str::to_string).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CommonError::InvalidPath(s.to_string()));
        }
        Ok(Self { parts })
    }

    #[inline]
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn name(&self) -> Option<&str> {
        self.parts.last().map(String::as_str)
    }

    pub fn is_valid(&self) -> bool {
        !self.parts.is_empty()
    }

    /// Path of the enclosing symbol, if any.
    pub fn parent(&self) -> Option<SymbolPath> {
        if self.parts.len() < 2 {
            return None;
        }
        Some(Self { parts: self.parts[..self.parts.len() - 1].to_vec() })
    }

    pub fn child(&self, name: &str) -> SymbolPath {
        let mut parts = self.parts.clone();
        parts.push(name.to_string());
        Self { parts }
    }
}

impl fmt::Display for SymbolPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join("."))
    }
}

impl FromStr for SymbolPath {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
