//! Arithmetic, comparison, logical and bitwise instructions.
//!
//! Binary instructions pop the right operand first. A wrong right operand is
//! an `InvalidDataStackV2`, a wrong left operand an `InvalidDataStackV1`.

use std::cmp::Ordering;

use lyric_object::{OpCell, Opcode};

use super::{stack_v1, stack_v2};
use crate::coroutine::StackfulCoroutine;
use crate::data_cell::DataCell;
use crate::error::{InterpreterError, Result};
use crate::segment_manager::SegmentManager;
use crate::type_manager::TypeManager;

fn pop_operands<T>(
    coro: &mut StackfulCoroutine,
    op: &OpCell,
    extract: impl Fn(DataCell) -> Option<T>,
) -> Result<(T, T)> {
    let rhs = extract(coro.pop_data()?).ok_or_else(|| stack_v2(format!("wrong rhs type for {}", op.opcode)))?;
    let lhs = extract(coro.pop_data()?).ok_or_else(|| stack_v1(format!("wrong lhs type for {}", op.opcode)))?;
    Ok((lhs, rhs))
}

fn pop_operand<T>(coro: &mut StackfulCoroutine, op: &OpCell, extract: impl Fn(DataCell) -> Option<T>) -> Result<T> {
    extract(coro.pop_data()?).ok_or_else(|| stack_v1(format!("wrong operand type for {}", op.opcode)))
}

fn i64_of(cell: DataCell) -> Option<i64> {
    cell.as_i64()
}

fn dbl_of(cell: DataCell) -> Option<f64> {
    match cell {
        DataCell::Dbl(d) => Some(d),
        _ => None,
    }
}

fn bool_of(cell: DataCell) -> Option<bool> {
    cell.as_bool()
}

fn chr_of(cell: DataCell) -> Option<char> {
    match cell {
        DataCell::Chr(c) => Some(c),
        _ => None,
    }
}

fn type_of(cell: DataCell) -> Option<DataCell> {
    matches!(cell, DataCell::Type(_)).then_some(cell)
}

/// -1, 0 or 1. Unordered operands compare as 0.
fn compare<T: PartialOrd>(lhs: T, rhs: T) -> i64 {
    match lhs.partial_cmp(&rhs) {
        Some(Ordering::Less) => -1,
        Some(Ordering::Greater) => 1,
        _ => 0,
    }
}

pub fn exec_i64(coro: &mut StackfulCoroutine, op: &OpCell) -> Result<()> {
    let result = match op.opcode {
        Opcode::I64Neg => pop_operand(coro, op, i64_of)?.wrapping_neg(),
        Opcode::I64Add => {
            let (lhs, rhs) = pop_operands(coro, op, i64_of)?;
            lhs.wrapping_add(rhs)
        }
        Opcode::I64Sub => {
            let (lhs, rhs) = pop_operands(coro, op, i64_of)?;
            lhs.wrapping_sub(rhs)
        }
        Opcode::I64Mul => {
            let (lhs, rhs) = pop_operands(coro, op, i64_of)?;
            lhs.wrapping_mul(rhs)
        }
        Opcode::I64Div => {
            let (lhs, rhs) = pop_operands(coro, op, i64_of)?;
            if rhs == 0 {
                return Err(stack_v2("division by zero"));
            }
            lhs.wrapping_div(rhs)
        }
        other => return Err(InterpreterError::invariant(format!("{} is not an integer instruction", other))),
    };
    coro.push_data(DataCell::I64(result));
    Ok(())
}

pub fn exec_dbl(coro: &mut StackfulCoroutine, op: &OpCell) -> Result<()> {
    let result = match op.opcode {
        Opcode::DblNeg => -pop_operand(coro, op, dbl_of)?,
        Opcode::DblAdd | Opcode::DblSub | Opcode::DblMul | Opcode::DblDiv => {
            let (lhs, rhs) = pop_operands(coro, op, dbl_of)?;
            match op.opcode {
                Opcode::DblAdd => lhs + rhs,
                Opcode::DblSub => lhs - rhs,
                Opcode::DblMul => lhs * rhs,
                _ => lhs / rhs,
            }
        }
        other => return Err(InterpreterError::invariant(format!("{} is not a float instruction", other))),
    };
    coro.push_data(DataCell::Dbl(result));
    Ok(())
}

/// BOOL_CMP, I64_CMP, DBL_CMP and CHR_CMP push -1, 0 or 1.
pub fn exec_cmp(coro: &mut StackfulCoroutine, op: &OpCell) -> Result<()> {
    let result = match op.opcode {
        Opcode::BoolCmp => {
            let (lhs, rhs) = pop_operands(coro, op, bool_of)?;
            compare(lhs, rhs)
        }
        Opcode::I64Cmp => {
            let (lhs, rhs) = pop_operands(coro, op, i64_of)?;
            compare(lhs, rhs)
        }
        Opcode::DblCmp => {
            let (lhs, rhs) = pop_operands(coro, op, dbl_of)?;
            compare(lhs, rhs)
        }
        Opcode::ChrCmp => {
            let (lhs, rhs) = pop_operands(coro, op, chr_of)?;
            compare(lhs, rhs)
        }
        other => return Err(InterpreterError::invariant(format!("{} is not a compare instruction", other))),
    };
    coro.push_data(DataCell::I64(result));
    Ok(())
}

pub fn exec_type_cmp(
    coro: &mut StackfulCoroutine,
    types: &TypeManager,
    segments: &mut SegmentManager,
    op: &OpCell,
) -> Result<()> {
    let (lhs, rhs) = pop_operands(coro, op, type_of)?;
    let comparison = types.compare_types(&lhs, &rhs, segments)?;
    coro.push_data(DataCell::I64(comparison.as_i64()));
    Ok(())
}

pub fn exec_logical(coro: &mut StackfulCoroutine, op: &OpCell) -> Result<()> {
    let result = match op.opcode {
        Opcode::LogicalNot => !pop_operand(coro, op, bool_of)?,
        Opcode::LogicalAnd => {
            let (lhs, rhs) = pop_operands(coro, op, bool_of)?;
            lhs && rhs
        }
        Opcode::LogicalOr => {
            let (lhs, rhs) = pop_operands(coro, op, bool_of)?;
            lhs || rhs
        }
        other => return Err(InterpreterError::invariant(format!("{} is not a logical instruction", other))),
    };
    coro.push_data(DataCell::Bool(result));
    Ok(())
}

pub fn exec_bitwise(coro: &mut StackfulCoroutine, op: &OpCell) -> Result<()> {
    let (lhs, rhs) = pop_operands(coro, op, i64_of)?;
    let result = match op.opcode {
        Opcode::BitwiseAnd => lhs & rhs,
        Opcode::BitwiseOr => lhs | rhs,
        Opcode::BitwiseXor => lhs ^ rhs,
        Opcode::BitwiseRightShift => lhs.wrapping_shr(rhs as u32),
        Opcode::BitwiseLeftShift => lhs.wrapping_shl(rhs as u32),
        other => return Err(InterpreterError::invariant(format!("{} is not a bitwise instruction", other))),
    };
    coro.push_data(DataCell::I64(result));
    Ok(())
}
