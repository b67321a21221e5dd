//! Runtime values.

use std::fmt;
use std::hash::{Hash, Hasher};

use lyric_object::LinkageSection;

use crate::heap::RefHandle;

/// A symbol inside a loaded segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Descriptor {
    pub segment: u32,
    pub index: u32,
}

impl Descriptor {
    #[inline]
    pub fn new(segment: u32, index: u32) -> Self {
        Self { segment, index }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataCellType {
    Invalid,
    Nil,
    Undef,
    Bool,
    I64,
    Dbl,
    Chr,
    Class,
    Struct,
    Instance,
    Concept,
    Enum,
    Call,
    Field,
    Action,
    Type,
    Existential,
    Namespace,
    String,
    Url,
    Bytes,
    Rest,
    Ref,
    Status,
}

/// One slot on a data stack, in a frame or in a ref's fields.
///
/// Heap variants hold a handle, not the object; the heap decides when the
/// object dies. Equality on heap variants is handle identity. Compare string
/// or byte contents through `AbstractHeap::content_equals`.
#[derive(Debug, Clone, Copy, Default)]
pub enum DataCell {
    #[default]
    Invalid,
    Nil,
    Undef,
    Bool(bool),
    I64(i64),
    Dbl(f64),
    Chr(char),
    Class(Descriptor),
    Struct(Descriptor),
    Instance(Descriptor),
    Concept(Descriptor),
    Enum(Descriptor),
    Call(Descriptor),
    Field(Descriptor),
    Action(Descriptor),
    Type(Descriptor),
    Existential(Descriptor),
    Namespace(Descriptor),
    String(RefHandle),
    Url(RefHandle),
    Bytes(RefHandle),
    Rest(RefHandle),
    Ref(RefHandle),
    Status(RefHandle),
}

impl DataCell {
    /// Descriptor cell for a symbol in the given section. Sections without a
    /// descriptor form (literals) yield `None`.
    pub fn for_descriptor(section: LinkageSection, segment: u32, index: u32) -> Option<Self> {
        let d = Descriptor::new(segment, index);
        Some(match section {
            LinkageSection::Class => DataCell::Class(d),
            LinkageSection::Struct => DataCell::Struct(d),
            LinkageSection::Instance => DataCell::Instance(d),
            LinkageSection::Concept => DataCell::Concept(d),
            LinkageSection::Enum => DataCell::Enum(d),
            LinkageSection::Call => DataCell::Call(d),
            LinkageSection::Field => DataCell::Field(d),
            LinkageSection::Action => DataCell::Action(d),
            LinkageSection::Type => DataCell::Type(d),
            LinkageSection::Existential => DataCell::Existential(d),
            LinkageSection::Namespace => DataCell::Namespace(d),
            LinkageSection::Static | LinkageSection::Literal | LinkageSection::Invalid => return None,
        })
    }

    pub fn cell_type(&self) -> DataCellType {
        match self {
            DataCell::Invalid => DataCellType::Invalid,
            DataCell::Nil => DataCellType::Nil,
            DataCell::Undef => DataCellType::Undef,
            DataCell::Bool(_) => DataCellType::Bool,
            DataCell::I64(_) => DataCellType::I64,
            DataCell::Dbl(_) => DataCellType::Dbl,
            DataCell::Chr(_) => DataCellType::Chr,
            DataCell::Class(_) => DataCellType::Class,
            DataCell::Struct(_) => DataCellType::Struct,
            DataCell::Instance(_) => DataCellType::Instance,
            DataCell::Concept(_) => DataCellType::Concept,
            DataCell::Enum(_) => DataCellType::Enum,
            DataCell::Call(_) => DataCellType::Call,
            DataCell::Field(_) => DataCellType::Field,
            DataCell::Action(_) => DataCellType::Action,
            DataCell::Type(_) => DataCellType::Type,
            DataCell::Existential(_) => DataCellType::Existential,
            DataCell::Namespace(_) => DataCellType::Namespace,
            DataCell::String(_) => DataCellType::String,
            DataCell::Url(_) => DataCellType::Url,
            DataCell::Bytes(_) => DataCellType::Bytes,
            DataCell::Rest(_) => DataCellType::Rest,
            DataCell::Ref(_) => DataCellType::Ref,
            DataCell::Status(_) => DataCellType::Status,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        !matches!(self, DataCell::Invalid)
    }

    pub fn descriptor(&self) -> Option<Descriptor> {
        match self {
            DataCell::Class(d)
            | DataCell::Struct(d)
            | DataCell::Instance(d)
            | DataCell::Concept(d)
            | DataCell::Enum(d)
            | DataCell::Call(d)
            | DataCell::Field(d)
            | DataCell::Action(d)
            | DataCell::Type(d)
            | DataCell::Existential(d)
            | DataCell::Namespace(d) => Some(*d),
            _ => None,
        }
    }

    /// Linkage section of a descriptor cell.
    pub fn section(&self) -> Option<LinkageSection> {
        Some(match self {
            DataCell::Class(_) => LinkageSection::Class,
            DataCell::Struct(_) => LinkageSection::Struct,
            DataCell::Instance(_) => LinkageSection::Instance,
            DataCell::Concept(_) => LinkageSection::Concept,
            DataCell::Enum(_) => LinkageSection::Enum,
            DataCell::Call(_) => LinkageSection::Call,
            DataCell::Field(_) => LinkageSection::Field,
            DataCell::Action(_) => LinkageSection::Action,
            DataCell::Type(_) => LinkageSection::Type,
            DataCell::Existential(_) => LinkageSection::Existential,
            DataCell::Namespace(_) => LinkageSection::Namespace,
            _ => return None,
        })
    }

    /// Heap handle of a heap-backed cell.
    pub fn handle(&self) -> Option<RefHandle> {
        match self {
            DataCell::String(h)
            | DataCell::Url(h)
            | DataCell::Bytes(h)
            | DataCell::Rest(h)
            | DataCell::Ref(h)
            | DataCell::Status(h) => Some(*h),
            _ => None,
        }
    }

    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataCell::I64(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataCell::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_ref_handle(&self) -> Option<RefHandle> {
        match self {
            DataCell::Ref(h) => Some(*h),
            _ => None,
        }
    }
}

impl PartialEq for DataCell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DataCell::Invalid, DataCell::Invalid) => true,
            (DataCell::Nil, DataCell::Nil) => true,
            (DataCell::Undef, DataCell::Undef) => true,
            (DataCell::Bool(a), DataCell::Bool(b)) => a == b,
            (DataCell::I64(a), DataCell::I64(b)) => a == b,
            (DataCell::Dbl(a), DataCell::Dbl(b)) => a.to_bits() == b.to_bits(),
            (DataCell::Chr(a), DataCell::Chr(b)) => a == b,
            _ => {
                if self.cell_type() != other.cell_type() {
                    return false;
                }
                match (self.descriptor(), other.descriptor()) {
                    (Some(a), Some(b)) => a == b,
                    _ => self.handle().is_some() && self.handle() == other.handle(),
                }
            }
        }
    }
}

impl Eq for DataCell {}

impl Hash for DataCell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cell_type().hash(state);
        match self {
            DataCell::Bool(b) => b.hash(state),
            DataCell::I64(i) => i.hash(state),
            DataCell::Dbl(d) => d.to_bits().hash(state),
            DataCell::Chr(c) => c.hash(state),
            _ => {
                if let Some(d) = self.descriptor() {
                    d.hash(state);
                } else if let Some(h) = self.handle() {
                    h.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for DataCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataCell::Invalid => write!(f, "Invalid"),
            DataCell::Nil => write!(f, "nil"),
            DataCell::Undef => write!(f, "undef"),
            DataCell::Bool(b) => write!(f, "{}", b),
            DataCell::I64(i) => write!(f, "{}", i),
            DataCell::Dbl(d) => write!(f, "{}", d),
            DataCell::Chr(c) => write!(f, "'{}'", c),
            _ => match (self.descriptor(), self.handle()) {
                (Some(d), _) => write!(f, "{:?}({}:{})", self.cell_type(), d.segment, d.index),
                (_, Some(h)) => write!(f, "{:?}({})", self.cell_type(), h),
                _ => write!(f, "{:?}", self.cell_type()),
            },
        }
    }
}
