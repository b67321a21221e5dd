//! Hooks for debuggers and tracers.

use lyric_object::OpCell;

use crate::data_cell::DataCell;
use crate::error::{InterpreterError, Result};
use crate::state::InterpreterState;

/// Observes the interpreter loop. Every hook has a pass-through default, so
/// an implementation only overrides what it needs.
pub trait AbstractInspector {
    fn before_op(&mut self, _op: &OpCell, _state: &mut InterpreterState) -> Result<()> {
        Ok(())
    }

    fn after_op(&mut self, _op: &OpCell, _state: &mut InterpreterState) -> Result<()> {
        Ok(())
    }

    /// Called when an instruction fails. Returning a cell ends the current
    /// sub-interpreter with that cell instead of the error.
    fn on_error(&mut self, _op: &OpCell, err: InterpreterError, _state: &mut InterpreterState) -> Result<DataCell> {
        Err(err)
    }

    /// Called on `HALT` and when the main task returns from its entry proc
    /// or runs off the end of its code (`op` is `None` then).
    fn on_halt(&mut self, _op: Option<&OpCell>, main_return: DataCell, _state: &mut InterpreterState) -> Result<DataCell> {
        Ok(main_return)
    }

    /// Called on `INTERRUPT` with the popped cell. An `Ok` result stops the
    /// loop with an `Interrupted` error.
    fn on_interrupt(&mut self, _value: DataCell, _state: &mut InterpreterState) -> Result<()> {
        Ok(())
    }
}
