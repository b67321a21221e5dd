//! Native plugins.

use crate::error::{InterpreterError, Result};
use crate::heap::BaseRef;
use crate::interpreter::BytecodeInterpreter;
use crate::segment::BytecodeSegment;
use crate::state::InterpreterState;

/// A native trap. Traps operate on the current coroutine's data stack.
pub type NativeFunc = fn(&mut BytecodeInterpreter, &mut InterpreterState) -> Result<()>;

/// Allocator trap for types whose instances are plain field records. Runs in
/// the frame pushed by `prepare_new` and pushes a fresh `BaseRef`.
pub fn base_allocator(_interp: &mut BytecodeInterpreter, state: &mut InterpreterState) -> Result<()> {
    let vtable = state
        .current_coro()?
        .peek_call()?
        .vtable
        .clone()
        .ok_or_else(|| InterpreterError::invariant("allocator frame has no virtual table"))?;
    let cell = state.allocate_ref(Box::new(BaseRef::new(vtable)));
    state.current_coro_mut()?.push_data(cell);
    Ok(())
}

/// Native code bound to one module. The segment manager loads a plugin when
/// the module's object names one, and unloads it when the state is dropped.
pub trait AbstractPlugin {
    fn load(&mut self, segment: &BytecodeSegment) -> Result<()>;

    fn unload(&mut self, _segment: &BytecodeSegment) {}

    fn get_trap(&self, index: u32) -> Option<NativeFunc>;

    fn num_traps(&self) -> u32;
}

/// A plugin backed by a fixed trap table.
#[derive(Clone, Default)]
pub struct TrapTable {
    traps: Vec<NativeFunc>,
}

impl TrapTable {
    pub fn new(traps: Vec<NativeFunc>) -> Self {
        Self { traps }
    }
}

impl AbstractPlugin for TrapTable {
    fn load(&mut self, segment: &BytecodeSegment) -> Result<()> {
        log::debug!("loaded {} traps for {}", self.traps.len(), segment.location());
        Ok(())
    }

    fn get_trap(&self, index: u32) -> Option<NativeFunc> {
        self.traps.get(index as usize).copied()
    }

    fn num_traps(&self) -> u32 {
        self.traps.len() as u32
    }
}
