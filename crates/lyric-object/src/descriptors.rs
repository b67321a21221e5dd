//! Descriptor tables.
//!
//! Every address stored in a descriptor uses the near/far encoding from
//! [`crate::address`], so a class may extend a class in another module and a
//! method may live in another segment. `INVALID_ADDRESS_U32` marks "none".

use lyric_common::{ModuleLocation, SymbolPath, SymbolUrl};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::address::INVALID_ADDRESS_U32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum LinkageSection {
    Invalid = 0,
    Type,
    Existential,
    Literal,
    Call,
    Field,
    Static,
    Action,
    Class,
    Struct,
    Instance,
    Concept,
    Enum,
    Namespace,
}

/// Builtin types that the prelude binds to existentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum IntrinsicType {
    Nil = 0,
    Undef,
    Bool,
    Char,
    Float,
    Int,
    String,
    Url,
    Bytes,
    Rest,
    Status,
    Class,
    Concept,
    Instance,
    Call,
    Action,
    Field,
    Struct,
    Enum,
    Existential,
    Namespace,
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CallMode {
    Normal = 0,
    Constructor,
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Section and address of the symbol this type describes.
    pub section: LinkageSection,
    pub address: u32,
    /// Address of the super type in the type section, if any.
    pub super_type: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralDescriptor {
    Nil,
    Undef,
    Bool(bool),
    I64(i64),
    Dbl(f64),
    Chr(u32),
    Utf8(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDescriptor {
    pub path: SymbolPath,
    pub mode: CallMode,
    pub proc_offset: u32,
    /// Receiver type address for bound methods.
    pub receiver: u32,
    pub returns_value: bool,
}

impl CallDescriptor {
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.receiver != INVALID_ADDRESS_U32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub path: SymbolPath,
    pub field_type: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticDescriptor {
    pub path: SymbolPath,
    pub static_type: u32,
    /// Call that computes the initial value.
    pub initializer: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    pub path: SymbolPath,
    /// Concept declaring the action.
    pub receiver: u32,
}

/// Layout shared by classes, structs, instances and enums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeDescriptor {
    pub path: SymbolPath,
    pub shape_type: u32,
    pub super_shape: u32,
    /// Field addresses.
    pub members: Vec<u32>,
    /// Call addresses.
    pub methods: Vec<u32>,
    /// Indices into the impl table.
    pub impls: Vec<u32>,
    pub ctor: u32,
    /// Trap index in the module plugin.
    pub allocator_trap: u32,
    pub sealed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptDescriptor {
    pub path: SymbolPath,
    pub concept_type: u32,
    pub super_concept: u32,
    pub actions: Vec<u32>,
    pub impls: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistentialDescriptor {
    pub path: SymbolPath,
    pub existential_type: u32,
    pub super_existential: u32,
    pub intrinsic: Option<IntrinsicType>,
    pub methods: Vec<u32>,
    pub impls: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionDescriptor {
    pub action: u32,
    pub call: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplDescriptor {
    pub concept: u32,
    pub extensions: Vec<ExtensionDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDescriptor {
    pub path: SymbolPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDescriptor {
    pub linkage: LinkageSection,
    pub url: SymbolUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDescriptor {
    pub location: ModuleLocation,
    pub flags: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolDescriptor {
    pub path: SymbolPath,
    pub section: LinkageSection,
    pub index: u32,
}

impl ShapeDescriptor {
    /// A shape with no super type, members, methods, ctor or allocator.
    pub fn new(path: SymbolPath) -> Self {
        Self {
            path,
            shape_type: INVALID_ADDRESS_U32,
            super_shape: INVALID_ADDRESS_U32,
            members: Vec::new(),
            methods: Vec::new(),
            impls: Vec::new(),
            ctor: INVALID_ADDRESS_U32,
            allocator_trap: INVALID_ADDRESS_U32,
            sealed: false,
        }
    }
}

impl ExistentialDescriptor {
    pub fn new(path: SymbolPath, intrinsic: Option<IntrinsicType>) -> Self {
        Self {
            path,
            existential_type: INVALID_ADDRESS_U32,
            super_existential: INVALID_ADDRESS_U32,
            intrinsic,
            methods: Vec::new(),
            impls: Vec::new(),
        }
    }
}

impl ConceptDescriptor {
    pub fn new(path: SymbolPath) -> Self {
        Self {
            path,
            concept_type: INVALID_ADDRESS_U32,
            super_concept: INVALID_ADDRESS_U32,
            actions: Vec::new(),
            impls: Vec::new(),
        }
    }
}
