//! Object decoding errors.

use lyric_common::CommonError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    #[error("bad object magic")]
    BadMagic,
    #[error("unsupported object version {0}")]
    UnsupportedVersion(u32),
    #[error("object truncated at offset {0}")]
    Truncated(usize),
    #[error("invalid {what} tag {tag} at offset {offset}")]
    InvalidTag { what: &'static str, tag: u8, offset: usize },
    #[error("invalid utf-8 string at offset {0}")]
    InvalidUtf8(usize),
    #[error("invalid proc at offset {offset}: {reason}")]
    InvalidProc { offset: u32, reason: &'static str },
    #[error("{0} trailing bytes after object")]
    TrailingBytes(usize),
    #[error(transparent)]
    Common(#[from] CommonError),
}

pub type Result<T> = std::result::Result<T, ObjectError>;
