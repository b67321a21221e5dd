//! Bytecode iteration.

use std::sync::Arc;

use crate::opcode::{OpInfoType, Opcode};

/// Decoded operands of one instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operands {
    None,
    Address(u32),
    FlagsAddress { flags: u8, address: u32 },
    Jump(i16),
    Offset(u16),
    FlagsAddressPlacement { flags: u8, address: u32, placement: u16 },
    FlagsOffsetPlacement { flags: u8, offset: u16, placement: u16 },
    Type(u8),
    I64(i64),
    Dbl(f64),
    Chr(i32),
}

/// One decoded instruction and the offset of its opcode byte.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpCell {
    pub opcode: Opcode,
    pub operands: Operands,
    pub offset: u32,
}

/// Cursor over a shared bytecode blob.
///
/// The blob is reference counted so that many coroutines can walk the same
/// segment without borrowing it.
#[derive(Debug, Clone)]
pub struct BytecodeIterator {
    bytecode: Arc<[u8]>,
    curr: usize,
}

impl BytecodeIterator {
    pub fn new(bytecode: Arc<[u8]>) -> Self {
        Self { bytecode, curr: 0 }
    }

    pub fn at(bytecode: Arc<[u8]>, offset: u32) -> Option<Self> {
        let mut it = Self::new(bytecode);
        if it.reset(offset) {
            Some(it)
        } else {
            None
        }
    }

    pub fn empty() -> Self {
        Self::new(Arc::from(Vec::new()))
    }

    #[inline]
    pub fn bytecode(&self) -> &Arc<[u8]> {
        &self.bytecode
    }

    #[inline]
    pub fn position(&self) -> u32 {
        self.curr as u32
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.bytecode.len() as u32
    }

    #[inline]
    pub fn has_next(&self) -> bool {
        self.curr < self.bytecode.len()
    }

    /// Reposition at an absolute offset. The end of the blob is a valid position.
    pub fn reset(&mut self, offset: u32) -> bool {
        if offset as usize > self.bytecode.len() {
            return false;
        }
        self.curr = offset as usize;
        true
    }

    /// Move relative to the current position, which is the byte after the
    /// last decoded instruction.
    pub fn move_by(&mut self, delta: i16) -> bool {
        let target = self.curr as i64 + delta as i64;
        if target < 0 || target > self.bytecode.len() as i64 {
            return false;
        }
        self.curr = target as usize;
        true
    }

    /// Decode the next instruction. Returns `None` at the end of the blob or
    /// when the operands are truncated; the cursor does not move in the latter case.
    pub fn next_op(&mut self) -> Option<OpCell> {
        let offset = self.curr;
        let byte = *self.bytecode.get(offset)?;
        let opcode = Opcode::from_u8(byte);
        let info = opcode.info_type();
        let start = offset + 1;
        let end = start + info.operand_size();
        if end > self.bytecode.len() {
            return None;
        }
        let b = &self.bytecode[start..end];
        let operands = match info {
            OpInfoType::NoOperands => Operands::None,
            OpInfoType::AddressU32 => Operands::Address(be_u32(b)),
            OpInfoType::FlagsU8AddressU32 => Operands::FlagsAddress { flags: b[0], address: be_u32(&b[1..]) },
            OpInfoType::JumpI16 => Operands::Jump(be_u16(b) as i16),
            OpInfoType::OffsetU16 => Operands::Offset(be_u16(b)),
            OpInfoType::FlagsU8AddressU32PlacementU16 => Operands::FlagsAddressPlacement {
                flags: b[0],
                address: be_u32(&b[1..]),
                placement: be_u16(&b[5..]),
            },
            OpInfoType::FlagsU8OffsetU16PlacementU16 => Operands::FlagsOffsetPlacement {
                flags: b[0],
                offset: be_u16(&b[1..]),
                placement: be_u16(&b[3..]),
            },
            OpInfoType::TypeU8 => Operands::Type(b[0]),
            OpInfoType::ImmediateI64 => Operands::I64(be_u64(b) as i64),
            OpInfoType::ImmediateDbl => Operands::Dbl(f64::from_bits(be_u64(b))),
            OpInfoType::ImmediateChr => Operands::Chr(be_u32(b) as i32),
        };
        self.curr = end;
        Some(OpCell { opcode, operands, offset: offset as u32 })
    }
}

#[inline]
fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

#[inline]
fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

#[inline]
fn be_u64(b: &[u8]) -> u64 {
    u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}
