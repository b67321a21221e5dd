//! Load instructions: immediates, literals, descriptors, LOAD, STORE, VA_LOAD

use lyric_object::{
    LinkageSection, LiteralDescriptor, OpCell, Opcode, Operands, LOAD_ARGUMENT, LOAD_ENUM, LOAD_FIELD, LOAD_INSTANCE,
    LOAD_LEXICAL, LOAD_LOCAL, LOAD_STATIC, NEW_ENUM, NEW_INSTANCE, STORE_ARGUMENT, STORE_FIELD, STORE_LEXICAL,
    STORE_LOCAL, STORE_STATIC, SYNTHETIC_REST, SYNTHETIC_THIS,
};

use super::{address, flags_address, stack_v1, type_tag};
use crate::coroutine::StackfulCoroutine;
use crate::data_cell::DataCell;
use crate::error::{InterpreterCondition, InterpreterError, Result};
use crate::heap::RefHandle;
use crate::interpreter::BytecodeInterpreter;
use crate::state::{no_current_coro, InterpreterState};

fn chr_value(value: u32) -> Result<DataCell> {
    char::from_u32(value).map(DataCell::Chr).ok_or_else(|| {
        InterpreterError::new(
            InterpreterCondition::InvalidOperandImmediateChrV1,
            format!("invalid character {:#x}", value),
        )
    })
}

fn flags_error(message: &str) -> InterpreterError {
    InterpreterError::new(InterpreterCondition::InvalidOperandFlagsAddressV1, message)
}

/// UNDEF, NIL, TRUE, FALSE, I64, DBL, CHR
pub fn exec_immediate(coro: &mut StackfulCoroutine, op: &OpCell) -> Result<()> {
    let value = match (op.opcode, op.operands) {
        (Opcode::Undef, _) => DataCell::Undef,
        (Opcode::Nil, _) => DataCell::Nil,
        (Opcode::True, _) => DataCell::Bool(true),
        (Opcode::False, _) => DataCell::Bool(false),
        (Opcode::I64, Operands::I64(i)) => DataCell::I64(i),
        (Opcode::Dbl, Operands::Dbl(d)) => DataCell::Dbl(d),
        (Opcode::Chr, Operands::Chr(c)) => chr_value(c as u32)?,
        (opcode, operands) => {
            return Err(InterpreterError::invariant(format!("invalid immediate {:?} for {}", operands, opcode)))
        }
    };
    coro.push_data(value);
    Ok(())
}

pub fn exec_literal(state: &mut InterpreterState, op: &OpCell) -> Result<()> {
    let address = address(op)?;
    let coro = state.scheduler.current_coro_mut().ok_or_else(no_current_coro)?;
    match state.segment_manager.push_literal_onto_stack(coro, address)? {
        Some(LiteralDescriptor::Utf8(s)) => state.load_string_onto_stack(s),
        Some(LiteralDescriptor::Bytes(b)) => state.load_bytes_onto_stack(b),
        Some(other) => Err(InterpreterError::invariant(format!("unexpected literal {:?}", other))),
        None => Ok(()),
    }
}

/// STRING and URL allocate a fresh ref from a literal.
pub fn exec_string(state: &mut InterpreterState, op: &OpCell) -> Result<()> {
    let address = address(op)?;
    match op.opcode {
        Opcode::Url => state.load_literal_url_onto_stack(address),
        _ => state.load_literal_string_onto_stack(address),
    }
}

pub fn exec_synthetic(state: &mut InterpreterState, op: &OpCell) -> Result<()> {
    match type_tag(op)? {
        SYNTHETIC_THIS => {
            let coro = state.current_coro_mut()?;
            let receiver = coro.peek_call()?.receiver;
            coro.push_data(receiver);
            Ok(())
        }
        SYNTHETIC_REST => state.load_rest_onto_stack(),
        other => Err(InterpreterError::new(
            InterpreterCondition::InvalidOperandTypeV1,
            format!("unknown SYNTHETIC type {}", other),
        )),
    }
}

pub fn exec_descriptor(state: &mut InterpreterState, op: &OpCell) -> Result<()> {
    let (flags, address) = flags_address(op)?;
    let section = LinkageSection::try_from(flags)
        .ok()
        .filter(|s| *s != LinkageSection::Invalid)
        .ok_or_else(|| flags_error("invalid DESCRIPTOR section"))?;
    let coro = state.scheduler.current_coro_mut().ok_or_else(no_current_coro)?;
    state.segment_manager.push_descriptor_onto_stack(coro, section, address)
}

/// Load a static, running its initializer in a sub-interpreter on first use.
pub fn load_static(interp: &mut BytecodeInterpreter, state: &mut InterpreterState, address: u32) -> Result<()> {
    let sp = state.current_coro()?.peek_sp();
    let mut value = state.segment_manager.load_static(sp, address)?;
    if !value.is_valid() {
        state.init_static(address)?;
        value = interp.run_subinterpreter(state)?;
        state.segment_manager.store_static(sp, address, value)?;
        log::trace!("initialized static {} to {}", address, value);
    }
    state.current_coro_mut()?.push_data(value);
    Ok(())
}

/// Load an instance or enum singleton, allocating and constructing it in a
/// sub-interpreter on first use.
fn load_singleton(
    interp: &mut BytecodeInterpreter,
    state: &mut InterpreterState,
    new_type: u8,
    address: u32,
) -> Result<()> {
    let sp = state.current_coro()?.peek_sp();
    let stored = match new_type {
        NEW_ENUM => state.segment_manager.load_enum(sp, address)?,
        _ => state.segment_manager.load_instance(sp, address)?,
    };
    if stored.is_valid() {
        state.current_coro_mut()?.push_data(stored);
        return Ok(());
    }

    let allocator = state.prepare_new(new_type, address)?;
    allocator(interp, state)?;
    state.return_to_caller()?;
    state.construct_new(Vec::new())?;
    // the constructor leaves the receiver on the stack, which the
    // sub-interpreter pops as its result
    let value = interp.run_subinterpreter(state)?;
    match new_type {
        NEW_ENUM => state.segment_manager.store_enum(sp, address, value)?,
        _ => state.segment_manager.store_instance(sp, address, value)?,
    }
    state.current_coro_mut()?.push_data(value);
    Ok(())
}

fn pop_receiver(coro: &mut StackfulCoroutine, opcode: &str) -> Result<RefHandle> {
    match coro.pop_data()? {
        DataCell::Ref(handle) => Ok(handle),
        _ => Err(InterpreterError::new(
            InterpreterCondition::InvalidReceiver,
            format!("invalid receiver for {}", opcode),
        )),
    }
}

pub fn exec_load(interp: &mut BytecodeInterpreter, state: &mut InterpreterState, op: &OpCell) -> Result<()> {
    let (flags, address) = flags_address(op)?;
    match flags {
        LOAD_ARGUMENT | LOAD_LOCAL | LOAD_LEXICAL => {
            let coro = state.current_coro_mut()?;
            let frame = coro.peek_call()?;
            let value = match flags {
                LOAD_ARGUMENT => frame.get_argument(address),
                LOAD_LOCAL => frame.get_local(address),
                _ => frame.get_lexical(address),
            };
            let value = value.ok_or_else(|| InterpreterError::invariant(format!("invalid slot {} for LOAD", address)))?;
            coro.push_data(value);
            Ok(())
        }
        LOAD_FIELD => {
            let sp = state.current_coro()?.peek_sp();
            let field = state.segment_manager.resolve_descriptor(sp, LinkageSection::Field, address)?;
            let coro = state.scheduler.current_coro_mut().ok_or_else(no_current_coro)?;
            let receiver = pop_receiver(coro, "LOAD")?;
            let value = state
                .heap
                .get(receiver)?
                .get_field(&field)
                .ok_or_else(|| InterpreterError::invariant(format!("missing field {}", field)))?;
            coro.push_data(value);
            Ok(())
        }
        LOAD_STATIC => load_static(interp, state, address),
        LOAD_INSTANCE => load_singleton(interp, state, NEW_INSTANCE, address),
        LOAD_ENUM => load_singleton(interp, state, NEW_ENUM, address),
        _ => Err(flags_error("unknown LOAD flags")),
    }
}

pub fn exec_store(state: &mut InterpreterState, op: &OpCell) -> Result<()> {
    let (flags, address) = flags_address(op)?;
    let value = state.current_coro_mut()?.pop_data()?;
    match flags {
        STORE_ARGUMENT | STORE_LOCAL | STORE_LEXICAL => {
            let frame = state.current_coro_mut()?.peek_call_mut()?;
            let stored = match flags {
                STORE_ARGUMENT => frame.set_argument(address, value),
                STORE_LOCAL => frame.set_local(address, value),
                _ => frame.set_lexical(address, value),
            };
            if !stored {
                return Err(InterpreterError::invariant(format!("invalid slot {} for STORE", address)));
            }
        }
        STORE_FIELD => {
            let sp = state.current_coro()?.peek_sp();
            let field = state.segment_manager.resolve_descriptor(sp, LinkageSection::Field, address)?;
            let coro = state.scheduler.current_coro_mut().ok_or_else(no_current_coro)?;
            let receiver = pop_receiver(coro, "STORE")?;
            state
                .heap
                .get_mut(receiver)?
                .set_field(&field, value)
                .ok_or_else(|| InterpreterError::invariant(format!("missing field {}", field)))?;
        }
        STORE_STATIC => {
            let sp = state.current_coro()?.peek_sp();
            state.segment_manager.store_static(sp, address, value)?;
        }
        _ => return Err(flags_error("unknown STORE flags")),
    }
    Ok(())
}

pub fn exec_va_load(coro: &mut StackfulCoroutine) -> Result<()> {
    let index = coro
        .pop_data()?
        .as_i64()
        .ok_or_else(|| stack_v1("VA_LOAD index must be Integer"))?;
    let frame = coro.peek_call()?;
    let value = u32::try_from(index)
        .ok()
        .and_then(|i| frame.get_rest(i))
        .ok_or_else(|| stack_v1(format!("invalid rest index {}", index)))?;
    coro.push_data(value);
    Ok(())
}

pub fn exec_va_size(coro: &mut StackfulCoroutine) -> Result<()> {
    let size = coro.peek_call()?.num_rest();
    coro.push_data(DataCell::I64(size as i64));
    Ok(())
}
