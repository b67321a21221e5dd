//! Instruction handlers, grouped by instruction family.
//!
//! Handlers work on the current coroutine of the state. Operand shapes are
//! checked here so a malformed instruction surfaces as the matching
//! `InvalidOperand*` condition instead of a panic.

pub mod arith;
pub mod branch;
pub mod call;
pub mod load;
pub mod stack;

use lyric_object::{OpCell, Operands};

use crate::data_cell::DataCell;
use crate::error::{InterpreterCondition, InterpreterError, Result};

/// What the loop does after an instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecResult {
    Continue,
    /// Leave the current sub-interpreter with this cell.
    Exit(DataCell),
}

pub(crate) fn address(op: &OpCell) -> Result<u32> {
    match op.operands {
        Operands::Address(address) => Ok(address),
        _ => Err(InterpreterError::new(
            InterpreterCondition::InvalidOperandAddressV1,
            format!("invalid operand for {}", op.opcode),
        )),
    }
}

pub(crate) fn flags_address(op: &OpCell) -> Result<(u8, u32)> {
    match op.operands {
        Operands::FlagsAddress { flags, address } => Ok((flags, address)),
        _ => Err(InterpreterError::new(
            InterpreterCondition::InvalidOperandFlagsAddressV1,
            format!("invalid operand for {}", op.opcode),
        )),
    }
}

pub(crate) fn flags_address_placement(op: &OpCell) -> Result<(u8, u32, u16)> {
    match op.operands {
        Operands::FlagsAddressPlacement { flags, address, placement } => Ok((flags, address, placement)),
        _ => Err(InterpreterError::new(
            InterpreterCondition::InvalidOperandFlagsAddressV1,
            format!("invalid operand for {}", op.opcode),
        )),
    }
}

pub(crate) fn jump(op: &OpCell) -> Result<i16> {
    match op.operands {
        Operands::Jump(delta) => Ok(delta),
        _ => Err(InterpreterError::new(
            InterpreterCondition::InvalidOperandJumpV1,
            format!("invalid operand for {}", op.opcode),
        )),
    }
}

pub(crate) fn offset(op: &OpCell) -> Result<u16> {
    match op.operands {
        Operands::Offset(offset) => Ok(offset),
        _ => Err(InterpreterError::new(
            InterpreterCondition::InvalidOperandOffsetV1,
            format!("invalid operand for {}", op.opcode),
        )),
    }
}

pub(crate) fn type_tag(op: &OpCell) -> Result<u8> {
    match op.operands {
        Operands::Type(tag) => Ok(tag),
        _ => Err(InterpreterError::new(
            InterpreterCondition::InvalidOperandTypeV1,
            format!("invalid operand for {}", op.opcode),
        )),
    }
}

#[inline]
pub(crate) fn stack_v1(message: impl Into<String>) -> InterpreterError {
    InterpreterError::new(InterpreterCondition::InvalidDataStackV1, message)
}

#[inline]
pub(crate) fn stack_v2(message: impl Into<String>) -> InterpreterError {
    InterpreterError::new(InterpreterCondition::InvalidDataStackV2, message)
}
