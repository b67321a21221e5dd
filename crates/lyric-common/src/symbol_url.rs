//! Symbol urls: `location#path`.

use std::fmt;
use std::str::FromStr;

use crate::{CommonError, ModuleLocation, Result, SymbolPath};

/// A symbol url names a symbol across modules. A url without a location is
/// relative to whichever module contains it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolUrl {
    location: Option<ModuleLocation>,
    path: SymbolPath,
}

impl SymbolUrl {
    pub fn new(location: ModuleLocation, path: SymbolPath) -> Self {
        Self { location: Some(location), path }
    }

    pub fn relative(path: SymbolPath) -> Self {
        Self { location: None, path }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (location, path) = s
            .split_once('#')
            .ok_or_else(|| CommonError::InvalidUrl(s.to_string()))?;
        let path = SymbolPath::parse(path).map_err(|_| CommonError::InvalidUrl(s.to_string()))?;
        if location.is_empty() {
            return Ok(Self::relative(path));
        }
        let location = ModuleLocation::parse(location).map_err(|_| CommonError::InvalidUrl(s.to_string()))?;
        Ok(Self::new(location, path))
    }

    #[inline]
    pub fn location(&self) -> Option<&ModuleLocation> {
        self.location.as_ref()
    }

    #[inline]
    pub fn path(&self) -> &SymbolPath {
        &self.path
    }

    pub fn is_relative(&self) -> bool {
        self.location.is_none()
    }

    /// Anchor a relative url at `base`; absolute urls are returned unchanged.
    pub fn resolve(&self, base: &ModuleLocation) -> SymbolUrl {
        match &self.location {
            Some(_) => self.clone(),
            None => Self::new(base.clone(), self.path.clone()),
        }
    }
}

impl fmt::Display for SymbolUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}#{}", location, self.path),
            None => write!(f, "#{}", self.path),
        }
    }
}

impl FromStr for SymbolUrl {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
