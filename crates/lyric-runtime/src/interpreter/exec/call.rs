//! Invocation instructions: CALL_*, TRAP, NEW, TYPE_OF

use lyric_object::{call_flags, new_type, OpCell, Opcode, CALL_FORWARD_REST, CALL_RECEIVER_FOLLOWS, TRAP_INDEX_FOLLOWS};

use super::{flags_address, flags_address_placement, stack_v1};
use crate::coroutine::StackfulCoroutine;
use crate::data_cell::DataCell;
use crate::error::{InterpreterCondition, InterpreterError, Result};
use crate::interpreter::BytecodeInterpreter;
use crate::state::InterpreterState;

/// Pop `placement` arguments, then append the current frame's rest
/// arguments when the call forwards them.
fn pop_arguments(coro: &mut StackfulCoroutine, flags: u8, placement: u16) -> Result<Vec<DataCell>> {
    let mut args = coro.pop_data_n(placement as usize)?;
    if call_flags(flags) & CALL_FORWARD_REST != 0 {
        args.extend(coro.peek_call()?.rest.iter().copied());
    }
    Ok(args)
}

/// Receiver and arguments in the order the call flags put them on the stack.
fn pop_receiver_and_arguments(
    coro: &mut StackfulCoroutine,
    flags: u8,
    placement: u16,
) -> Result<(DataCell, Vec<DataCell>)> {
    if call_flags(flags) & CALL_RECEIVER_FOLLOWS != 0 {
        let receiver = coro.pop_data()?;
        let args = pop_arguments(coro, flags, placement)?;
        Ok((receiver, args))
    } else {
        let args = pop_arguments(coro, flags, placement)?;
        let receiver = coro.pop_data()?;
        Ok((receiver, args))
    }
}

fn require_ref(receiver: DataCell, opcode: Opcode) -> Result<DataCell> {
    match receiver {
        DataCell::Ref(_) => Ok(receiver),
        _ => Err(InterpreterError::new(
            InterpreterCondition::InvalidReceiver,
            format!("invalid receiver {} for {}", receiver, opcode),
        )),
    }
}

pub fn exec_call(state: &mut InterpreterState, op: &OpCell) -> Result<()> {
    let (flags, address, placement) = flags_address_placement(op)?;
    let coro = state.current_coro_mut()?;
    match op.opcode {
        Opcode::CallStatic => {
            let args = pop_arguments(coro, flags, placement)?;
            state.call_static(address, args)
        }
        Opcode::CallVirtual => {
            let (receiver, args) = pop_receiver_and_arguments(coro, flags, placement)?;
            state.call_virtual(require_ref(receiver, op.opcode)?, address, args)
        }
        Opcode::CallConcept => {
            let concept = coro.pop_data()?;
            if !matches!(concept, DataCell::Concept(_)) {
                return Err(stack_v1(format!("invalid concept {} for {}", concept, op.opcode)));
            }
            let (receiver, args) = pop_receiver_and_arguments(coro, flags, placement)?;
            state.call_concept(require_ref(receiver, op.opcode)?, concept, address, args)
        }
        Opcode::CallExistential => {
            let existential = coro.pop_data()?;
            if !matches!(existential, DataCell::Existential(_)) {
                return Err(stack_v1(format!("invalid existential {} for {}", existential, op.opcode)));
            }
            let (receiver, args) = pop_receiver_and_arguments(coro, flags, placement)?;
            state.call_existential(receiver, existential, address, args)
        }
        other => Err(InterpreterError::invariant(format!("{} is not a call instruction", other))),
    }
}

/// Run a native trap of the current segment. With `TRAP_INDEX_FOLLOWS` the
/// trap index is popped from the stack and the address operand must be 0.
pub fn exec_trap(interp: &mut BytecodeInterpreter, state: &mut InterpreterState, op: &OpCell) -> Result<()> {
    let (flags, address) = flags_address(op)?;
    let coro = state.current_coro_mut()?;
    let index = if flags & TRAP_INDEX_FOLLOWS != 0 {
        if address != 0 {
            return Err(InterpreterError::new(
                InterpreterCondition::InvalidOperandFlagsAddressV2,
                "trap address must be 0 when the index follows",
            ));
        }
        let index = coro.pop_data()?;
        index
            .as_i64()
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| stack_v1(format!("invalid trap index {}", index)))?
    } else {
        address
    };
    let sp = coro.peek_sp();
    let trap = state
        .segment_manager
        .get_trap(sp, index)
        .ok_or_else(|| InterpreterError::invariant(format!("no trap {} in segment {}", index, sp)))?;
    trap(interp, state)
}

/// Allocate through the type's native allocator, then enter its constructor.
pub fn exec_new(interp: &mut BytecodeInterpreter, state: &mut InterpreterState, op: &OpCell) -> Result<()> {
    let (flags, address, placement) = flags_address_placement(op)?;
    let args = pop_arguments(state.current_coro_mut()?, flags, placement)?;
    let allocator = state.prepare_new(new_type(flags), address)?;
    allocator(interp, state)?;
    state.return_to_caller()?;
    state.construct_new(args)
}

pub fn exec_type_of(state: &mut InterpreterState) -> Result<()> {
    let value = state.current_coro_mut()?.pop_data()?;
    let type_cell = state.type_manager.type_of(&value, &state.heap)?;
    if !matches!(type_cell, DataCell::Type(_)) {
        return Err(InterpreterError::invariant(format!("no type for {}", value)));
    }
    state.current_coro_mut()?.push_data(type_cell);
    Ok(())
}
