//! Shared value types for the lyric runtime.
//!
//! - `ModuleLocation`: where an assembled object lives (`/std/core`, `dev.zuri.pkg://...`)
//! - `SymbolPath`: dotted path of a symbol inside an object (`Point.x`)
//! - `SymbolUrl`: a location plus a path, the unit of cross-module linkage

pub mod module_location;
pub mod symbol_path;
pub mod symbol_url;

pub use module_location::ModuleLocation;
pub use symbol_path::SymbolPath;
pub use symbol_url::SymbolUrl;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommonError {
    #[error("invalid module location '{0}'")]
    InvalidLocation(String),
    #[error("invalid symbol path '{0}'")]
    InvalidPath(String),
    #[error("invalid symbol url '{0}'")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, CommonError>;
