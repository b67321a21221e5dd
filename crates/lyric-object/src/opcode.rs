//! Opcodes, operand shapes and operand flag constants.

use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const LOAD_ARGUMENT: u8 = 0x01;
pub const LOAD_LOCAL: u8 = 0x02;
pub const LOAD_LEXICAL: u8 = 0x03;
pub const LOAD_FIELD: u8 = 0x04;
pub const LOAD_STATIC: u8 = 0x05;
pub const LOAD_INSTANCE: u8 = 0x06;
pub const LOAD_ENUM: u8 = 0x07;

pub const STORE_ARGUMENT: u8 = 0x01;
pub const STORE_LOCAL: u8 = 0x02;
pub const STORE_LEXICAL: u8 = 0x03;
pub const STORE_FIELD: u8 = 0x04;
pub const STORE_STATIC: u8 = 0x05;

pub const CALL_RECEIVER_FOLLOWS: u8 = 0x01;
pub const CALL_FORWARD_REST: u8 = 0x02;

pub const LEXICAL_ARGUMENT: u8 = 0x01;
pub const LEXICAL_LOCAL: u8 = 0x02;

pub const NEW_CLASS: u8 = 0x01;
pub const NEW_ENUM: u8 = 0x02;
pub const NEW_INSTANCE: u8 = 0x03;
pub const NEW_STRUCT: u8 = 0x04;

pub const TRAP_INDEX_FOLLOWS: u8 = 0x01;

pub const SYNTHETIC_THIS: u8 = 0x01;
pub const SYNTHETIC_REST: u8 = 0x02;

/// Call flags live in the low nibble of the flags operand.
#[inline]
pub fn call_flags(flags: u8) -> u8 {
    flags & 0x0F
}

/// The `NEW` type lives in bits 4..7 of the flags operand.
#[inline]
pub fn new_type(flags: u8) -> u8 {
    (flags & 0x70) >> 4
}

#[inline]
pub fn new_flags(new_type: u8, call_flags: u8) -> u8 {
    ((new_type << 4) & 0x70) | (call_flags & 0x0F)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Unknown = 0,
    Noop,

    // load and store
    Undef,
    Nil,
    True,
    False,
    I64,
    Dbl,
    Chr,
    Literal,
    String,
    Url,
    Static,
    Synthetic,
    Descriptor,
    Load,
    Store,

    // variadic args
    VaLoad,
    VaSize,

    // data stack
    Pop,
    Dup,
    Pick,
    Drop,
    RPick,
    RDrop,

    I64Add,
    I64Sub,
    I64Mul,
    I64Div,
    I64Neg,

    DblAdd,
    DblSub,
    DblMul,
    DblDiv,
    DblNeg,

    BoolCmp,
    I64Cmp,
    DblCmp,
    ChrCmp,
    TypeCmp,

    LogicalAnd,
    LogicalOr,
    LogicalNot,

    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseRightShift,
    BitwiseLeftShift,

    // branching
    IfNil,
    IfNotNil,
    IfTrue,
    IfFalse,
    IfZero,
    IfNotZero,
    IfGt,
    IfGe,
    IfLt,
    IfLe,
    Jump,

    Import,

    // invocation
    CallStatic,
    CallVirtual,
    CallConcept,
    CallExistential,
    Trap,
    Return,

    New,

    // interpreter services
    TypeOf,
    Interrupt,
    Halt,
    Abort,
}

/// Operand layout following an opcode byte. All multi-byte operands are big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpInfoType {
    NoOperands,
    AddressU32,
    FlagsU8AddressU32,
    JumpI16,
    OffsetU16,
    FlagsU8AddressU32PlacementU16,
    FlagsU8OffsetU16PlacementU16,
    TypeU8,
    ImmediateI64,
    ImmediateDbl,
    ImmediateChr,
}

impl OpInfoType {
    /// Number of operand bytes after the opcode byte.
    pub fn operand_size(self) -> usize {
        match self {
            OpInfoType::NoOperands => 0,
            OpInfoType::AddressU32 => 4,
            OpInfoType::FlagsU8AddressU32 => 5,
            OpInfoType::JumpI16 => 2,
            OpInfoType::OffsetU16 => 2,
            OpInfoType::FlagsU8AddressU32PlacementU16 => 7,
            OpInfoType::FlagsU8OffsetU16PlacementU16 => 5,
            OpInfoType::TypeU8 => 1,
            OpInfoType::ImmediateI64 => 8,
            OpInfoType::ImmediateDbl => 8,
            OpInfoType::ImmediateChr => 4,
        }
    }
}

impl Opcode {
    #[inline]
    pub fn from_u8(v: u8) -> Self {
        Self::try_from(v).unwrap_or(Opcode::Unknown)
    }

    pub fn info_type(self) -> OpInfoType {
        use Opcode::*;
        match self {
            I64 => OpInfoType::ImmediateI64,
            Dbl => OpInfoType::ImmediateDbl,
            Chr => OpInfoType::ImmediateChr,
            Literal | String | Url | Static | Import => OpInfoType::AddressU32,
            Synthetic => OpInfoType::TypeU8,
            Descriptor | Load | Store | Trap => OpInfoType::FlagsU8AddressU32,
            Pick | Drop | RPick | RDrop => OpInfoType::OffsetU16,
            IfNil | IfNotNil | IfTrue | IfFalse | IfZero | IfNotZero | IfGt | IfGe | IfLt | IfLe
            | Jump => OpInfoType::JumpI16,
            CallStatic | CallVirtual | CallConcept | CallExistential | New => {
                OpInfoType::FlagsU8AddressU32PlacementU16
            }
            _ => OpInfoType::NoOperands,
        }
    }

    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Unknown => "UNKNOWN",
            Noop => "NOOP",
            Undef => "UNDEF",
            Nil => "NIL",
            True => "TRUE",
            False => "FALSE",
            I64 => "I64",
            Dbl => "DBL",
            Chr => "CHR",
            Literal => "LITERAL",
            String => "STRING",
            Url => "URL",
            Static => "STATIC",
            Synthetic => "SYNTHETIC",
            Descriptor => "DESCRIPTOR",
            Load => "LOAD",
            Store => "STORE",
            VaLoad => "VA_LOAD",
            VaSize => "VA_SIZE",
            Pop => "POP",
            Dup => "DUP",
            Pick => "PICK",
            Drop => "DROP",
            RPick => "RPICK",
            RDrop => "RDROP",
            I64Add => "I64_ADD",
            I64Sub => "I64_SUB",
            I64Mul => "I64_MUL",
            I64Div => "I64_DIV",
            I64Neg => "I64_NEG",
            DblAdd => "DBL_ADD",
            DblSub => "DBL_SUB",
            DblMul => "DBL_MUL",
            DblDiv => "DBL_DIV",
            DblNeg => "DBL_NEG",
            BoolCmp => "BOOL_CMP",
            I64Cmp => "I64_CMP",
            DblCmp => "DBL_CMP",
            ChrCmp => "CHR_CMP",
            TypeCmp => "TYPE_CMP",
            LogicalAnd => "LOGICAL_AND",
            LogicalOr => "LOGICAL_OR",
            LogicalNot => "LOGICAL_NOT",
            BitwiseAnd => "BITWISE_AND",
            BitwiseOr => "BITWISE_OR",
            BitwiseXor => "BITWISE_XOR",
            BitwiseRightShift => "BITWISE_RIGHT_SHIFT",
            BitwiseLeftShift => "BITWISE_LEFT_SHIFT",
            IfNil => "IF_NIL",
            IfNotNil => "IF_NOTNIL",
            IfTrue => "IF_TRUE",
            IfFalse => "IF_FALSE",
            IfZero => "IF_ZERO",
            IfNotZero => "IF_NOTZERO",
            IfGt => "IF_GT",
            IfGe => "IF_GE",
            IfLt => "IF_LT",
            IfLe => "IF_LE",
            Jump => "JUMP",
            Import => "IMPORT",
            CallStatic => "CALL_STATIC",
            CallVirtual => "CALL_VIRTUAL",
            CallConcept => "CALL_CONCEPT",
            CallExistential => "CALL_EXISTENTIAL",
            Trap => "TRAP",
            Return => "RETURN",
            New => "NEW",
            TypeOf => "TYPE_OF",
            Interrupt => "INTERRUPT",
            Halt => "HALT",
            Abort => "ABORT",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OP_{}", self.name())
    }
}
