//! Module locations.

use std::fmt;
use std::str::FromStr;

use crate::{CommonError, Result};

/// Identifies one assembled object. A location is either absolute (starts with `/`),
/// or carries a scheme (`scheme://authority/path`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleLocation {
    scheme: Option<String>,
    authority: Option<String>,
    path: String,
}

impl ModuleLocation {
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(CommonError::InvalidLocation(s.to_string()));
        }
        if let Some((scheme, rest)) = s.split_once("://") {
            if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
                return Err(CommonError::InvalidLocation(s.to_string()));
            }
            let (authority, path) = match rest.find('/') {
                Some(pos) => (&rest[..pos], &rest[pos..]),
                None => (rest, "/"),
            };
            return Ok(Self {
                scheme: Some(scheme.to_string()),
                authority: if authority.is_empty() { None } else { Some(authority.to_string()) },
                path: path.to_string(),
            });
        }
        if !s.starts_with('/') {
            return Err(CommonError::InvalidLocation(s.to_string()));
        }
        Ok(Self { scheme: None, authority: None, path: s.to_string() })
    }

    /// Absolute location with no scheme.
    pub fn from_path(path: &str) -> Result<Self> {
        if path.starts_with('/') {
            Self::parse(path)
        } else {
            Self::parse(&format!("/{}", path))
        }
    }

    #[inline]
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    #[inline]
    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path components with empty parts removed.
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|p| !p.is_empty())
    }

    pub fn is_absolute(&self) -> bool {
        self.scheme.is_none()
    }
}

impl fmt::Display for ModuleLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}://", scheme)?;
            if let Some(authority) = &self.authority {
                write!(f, "{}", authority)?;
            }
        }
        write!(f, "{}", self.path)
    }
}

impl FromStr for ModuleLocation {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
