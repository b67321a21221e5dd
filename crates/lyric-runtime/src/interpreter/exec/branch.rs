//! Conditional and unconditional jumps.

use lyric_object::{OpCell, Opcode};

use super::{jump, stack_v1};
use crate::coroutine::StackfulCoroutine;
use crate::data_cell::DataCell;
use crate::error::{InterpreterCondition, InterpreterError, Result};

fn pop_bool(coro: &mut StackfulCoroutine, op: &OpCell) -> Result<bool> {
    coro.pop_data()?
        .as_bool()
        .ok_or_else(|| stack_v1(format!("{} requires a Bool", op.opcode)))
}

/// The IF_ZERO family tests the I64 result of a compare against zero.
fn pop_i64(coro: &mut StackfulCoroutine, op: &OpCell) -> Result<i64> {
    coro.pop_data()?
        .as_i64()
        .ok_or_else(|| stack_v1(format!("{} requires an Integer", op.opcode)))
}

pub fn exec_branch(coro: &mut StackfulCoroutine, op: &OpCell) -> Result<()> {
    let delta = jump(op)?;
    let taken = match op.opcode {
        Opcode::Jump => true,
        Opcode::IfNil => coro.pop_data()? == DataCell::Nil,
        Opcode::IfNotNil => coro.pop_data()? != DataCell::Nil,
        Opcode::IfTrue => pop_bool(coro, op)?,
        Opcode::IfFalse => !pop_bool(coro, op)?,
        Opcode::IfZero => pop_i64(coro, op)? == 0,
        Opcode::IfNotZero => pop_i64(coro, op)? != 0,
        Opcode::IfGt => pop_i64(coro, op)? > 0,
        Opcode::IfGe => pop_i64(coro, op)? >= 0,
        Opcode::IfLt => pop_i64(coro, op)? < 0,
        Opcode::IfLe => pop_i64(coro, op)? <= 0,
        other => return Err(InterpreterError::invariant(format!("{} is not a branch instruction", other))),
    };
    if taken && !coro.move_ip(delta) {
        return Err(InterpreterError::new(
            InterpreterCondition::InvalidOperandJumpV1,
            format!("invalid jump offset {}", delta),
        ));
    }
    Ok(())
}
