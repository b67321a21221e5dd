//! Lyric object format.
//!
//! An object is the immutable output of the assembler for one module:
//! - descriptor tables for every linkage section (calls, classes, fields, ...)
//! - a link table naming symbols in other modules
//! - a symbol table mapping paths to descriptors
//! - one bytecode blob holding every proc
//!
//! The runtime only reads objects. `ObjectBuilder` and `BytecodeBuilder`
//! exist so that hosts and tests can produce objects without an assembler.

pub mod address;
pub mod builder;
pub mod bytecode;
pub mod codec;
pub mod descriptors;
pub mod error;
pub mod object;
pub mod opcode;
pub mod proc;

pub use address::*;
pub use builder::{BytecodeBuilder, Label, ObjectBuilder, ProcBuilder};
pub use bytecode::{BytecodeIterator, OpCell, Operands};
pub use descriptors::*;
pub use error::{ObjectError, Result};
pub use object::LyricObject;
pub use opcode::*;
pub use proc::{LexicalEntry, ProcHeader, PROC_HEADER_SIZE, LEXICAL_ENTRY_SIZE};
