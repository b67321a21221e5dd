//! The fetch/decode/execute loop.
//!
//! `run` drives the main task until it halts. Lazy initializers and native
//! traps re-enter the loop through `run_subinterpreter`, which returns once
//! the frame it was entered for returns. Every slice of instructions the loop
//! polls the scheduler and rotates to the next ready task; when no task is
//! ready it blocks until a waiter fires.

pub mod exec;

use std::cell::Cell;
use std::rc::Rc;

use lyric_object::{OpCell, Opcode};

use crate::data_cell::DataCell;
use crate::error::{InterpreterCondition, InterpreterError, Result, StatusCode};
use crate::inspector::AbstractInspector;
use crate::scheduler::TaskId;
use crate::state::InterpreterState;
use exec::ExecResult;

/// Result of a completed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpreterExit {
    pub status_code: StatusCode,
    pub main_return: DataCell,
    pub start_epoch_millis: u64,
    pub instruction_count: u64,
}

/// Counts nested sub-interpreters for as long as it lives.
struct RecursionLocker {
    depth: Rc<Cell<u32>>,
}

impl RecursionLocker {
    fn lock(depth: &Rc<Cell<u32>>, max_depth: u32) -> Result<Self> {
        let next = depth.get() + 1;
        if next > max_depth {
            return Err(InterpreterError::new(
                InterpreterCondition::ExceededMaximumRecursion,
                format!("exceeded maximum recursion depth {}", max_depth),
            ));
        }
        depth.set(next);
        Ok(Self { depth: depth.clone() })
    }
}

impl Drop for RecursionLocker {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

#[derive(Default)]
pub struct BytecodeInterpreter {
    inspector: Option<Box<dyn AbstractInspector>>,
    slice_counter: u32,
    instruction_count: u64,
    depth: Rc<Cell<u32>>,
}

impl BytecodeInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inspector(inspector: Box<dyn AbstractInspector>) -> Self {
        Self { inspector: Some(inspector), ..Self::default() }
    }

    #[inline]
    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    /// Current sub-interpreter nesting, 0 outside of `run`.
    #[inline]
    pub fn recursion_depth(&self) -> u32 {
        self.depth.get()
    }

    /// Run a loaded state until the main task halts. On failure the state is
    /// halted with the error's status code.
    pub fn run(&mut self, state: &mut InterpreterState) -> Result<InterpreterExit> {
        match self.run_subinterpreter(state) {
            Ok(main_return) => Ok(InterpreterExit {
                status_code: state.status_code(),
                main_return,
                start_epoch_millis: state.load_epoch_millis(),
                instruction_count: self.instruction_count,
            }),
            Err(err) => {
                log::debug!("interpreter failed: {}", err);
                if state.is_active() {
                    state.halt(err.status_code())?;
                }
                Err(err)
            }
        }
    }

    /// Run until the frame on top of the current coroutine returns, and
    /// return the value it left on the stack (`Invalid` if none).
    pub fn run_subinterpreter(&mut self, state: &mut InterpreterState) -> Result<DataCell> {
        let _locker = RecursionLocker::lock(&self.depth, state.options().max_recursion_depth)?;
        let time_slice = state.options().time_slice;
        let fast_poll_iterations = state.options().fast_poll_iterations;

        let coro = state.current_coro_mut()?;
        let guard = coro.call_stack_size();
        coro.push_guard(guard)?;
        let mut last_task: Option<TaskId> = state.scheduler.current_task();

        loop {
            self.slice_counter += 1;
            if self.slice_counter >= time_slice {
                self.slice_counter = 0;
                for _ in 0..fast_poll_iterations {
                    if state.scheduler.poll()? {
                        break;
                    }
                }
                state.scheduler.select_next_ready();
            }

            while state.scheduler.current_task().is_none() {
                // whichever task is selected next counts as a switch
                last_task = None;
                state.scheduler.blocking_poll()?;
                state.scheduler.select_next_ready();
            }

            let task = state.scheduler.current_task();
            if task != last_task {
                if let Some(id) = task {
                    log::trace!("switched to {}", id);
                    adapt_pending_promises(state, id)?;
                }
                last_task = task;
            }

            let coro = state.current_coro_mut()?;
            if !coro.check_guard() {
                return Err(InterpreterError::invariant("stack guard is above the call stack"));
            }

            let Some(op) = coro.next_op() else {
                match self.on_end_of_code(state)? {
                    ExecResult::Continue => continue,
                    ExecResult::Exit(value) => return Ok(value),
                }
            };
            self.instruction_count += 1;

            if let Some(inspector) = self.inspector.as_mut() {
                inspector.before_op(&op, state)?;
            }
            let result = match self.execute(&op, state) {
                Ok(result) => result,
                Err(err) => return self.on_error(&op, err, state),
            };
            if let Some(inspector) = self.inspector.as_mut() {
                inspector.after_op(&op, state)?;
            }
            if let ExecResult::Exit(value) = result {
                return Ok(value);
            }
        }
    }

    fn execute(&mut self, op: &OpCell, state: &mut InterpreterState) -> Result<ExecResult> {
        use exec::{arith, branch, call, load, stack};

        log::trace!("{} {:?}", op.opcode, op.operands);
        match op.opcode {
            Opcode::Noop => {}
            Opcode::Undef | Opcode::Nil | Opcode::True | Opcode::False | Opcode::I64 | Opcode::Dbl | Opcode::Chr => {
                load::exec_immediate(state.current_coro_mut()?, op)?
            }
            Opcode::Literal => load::exec_literal(state, op)?,
            Opcode::String | Opcode::Url => load::exec_string(state, op)?,
            Opcode::Static => load::load_static(self, state, exec::address(op)?)?,
            Opcode::Synthetic => load::exec_synthetic(state, op)?,
            Opcode::Descriptor => load::exec_descriptor(state, op)?,
            Opcode::Load => load::exec_load(self, state, op)?,
            Opcode::Store => load::exec_store(state, op)?,
            Opcode::VaLoad => load::exec_va_load(state.current_coro_mut()?)?,
            Opcode::VaSize => load::exec_va_size(state.current_coro_mut()?)?,

            Opcode::Pop | Opcode::Dup | Opcode::Pick | Opcode::Drop | Opcode::RPick | Opcode::RDrop => {
                stack::exec_stack(state.current_coro_mut()?, op)?
            }

            Opcode::I64Add | Opcode::I64Sub | Opcode::I64Mul | Opcode::I64Div | Opcode::I64Neg => {
                arith::exec_i64(state.current_coro_mut()?, op)?
            }
            Opcode::DblAdd | Opcode::DblSub | Opcode::DblMul | Opcode::DblDiv | Opcode::DblNeg => {
                arith::exec_dbl(state.current_coro_mut()?, op)?
            }
            Opcode::BoolCmp | Opcode::I64Cmp | Opcode::DblCmp | Opcode::ChrCmp => {
                arith::exec_cmp(state.current_coro_mut()?, op)?
            }
            Opcode::TypeCmp => {
                let coro = state
                    .scheduler
                    .current_coro_mut()
                    .ok_or_else(crate::state::no_current_coro)?;
                arith::exec_type_cmp(coro, &state.type_manager, &mut state.segment_manager, op)?
            }
            Opcode::LogicalAnd | Opcode::LogicalOr | Opcode::LogicalNot => {
                arith::exec_logical(state.current_coro_mut()?, op)?
            }
            Opcode::BitwiseAnd
            | Opcode::BitwiseOr
            | Opcode::BitwiseXor
            | Opcode::BitwiseRightShift
            | Opcode::BitwiseLeftShift => arith::exec_bitwise(state.current_coro_mut()?, op)?,

            Opcode::IfNil
            | Opcode::IfNotNil
            | Opcode::IfTrue
            | Opcode::IfFalse
            | Opcode::IfZero
            | Opcode::IfNotZero
            | Opcode::IfGt
            | Opcode::IfGe
            | Opcode::IfLt
            | Opcode::IfLe
            | Opcode::Jump => branch::exec_branch(state.current_coro_mut()?, op)?,

            Opcode::CallStatic | Opcode::CallVirtual | Opcode::CallConcept | Opcode::CallExistential => {
                call::exec_call(state, op)?
            }
            Opcode::Trap => {
                call::exec_trap(self, state, op)?;
                // a trap may await a promise that has already settled
                if let Some(task) = state.scheduler.current_task() {
                    adapt_pending_promises(state, task)?;
                }
            }
            Opcode::Return => return self.exec_return(op, state),
            Opcode::New => call::exec_new(self, state, op)?,
            Opcode::TypeOf => call::exec_type_of(state)?,

            Opcode::Interrupt => {
                let value = state.current_coro_mut()?.pop_data()?;
                if let Some(inspector) = self.inspector.as_mut() {
                    inspector.on_interrupt(value, state)?;
                }
                return Err(InterpreterError::new(InterpreterCondition::Interrupted, "interrupted"));
            }
            Opcode::Halt => return Ok(ExecResult::Exit(self.on_halt(Some(op), state)?)),
            Opcode::Abort => return Err(InterpreterError::new(InterpreterCondition::Aborted, "aborted")),
            Opcode::Import => return Err(InterpreterError::invariant("IMPORT is not supported")),
            Opcode::Unknown => {
                return Err(InterpreterError::invariant(format!("unknown instruction at offset {}", op.offset)))
            }
        }
        Ok(ExecResult::Continue)
    }

    /// Leave the current frame. The main task halts when its entry frame
    /// returns; the sub-interpreter exits when its guarded frame returns.
    fn exec_return(&mut self, op: &OpCell, state: &mut InterpreterState) -> Result<ExecResult> {
        let coro = state.current_coro_mut()?;
        let reached = coro.peek_guard() == Some(coro.call_stack_size());
        if reached {
            coro.pop_guard()?;
        }
        let has_caller = state.return_to_caller()?;
        if !has_caller && self.current_is_main(state) {
            return Ok(ExecResult::Exit(self.on_halt(Some(op), state)?));
        }
        if reached {
            return Ok(ExecResult::Exit(pop_result(state)?));
        }
        Ok(ExecResult::Continue)
    }

    /// The current coroutine has no instruction left.
    fn on_end_of_code(&mut self, state: &mut InterpreterState) -> Result<ExecResult> {
        let coro = state.current_coro_mut()?;
        if let Some(guard) = coro.peek_guard() {
            let reached = guard == coro.call_stack_size();
            if reached {
                coro.pop_guard()?;
            }
            if state.return_to_caller()? {
                return Ok(if reached {
                    ExecResult::Exit(pop_result(state)?)
                } else {
                    ExecResult::Continue
                });
            }
        }

        if self.current_is_main(state) {
            return Ok(ExecResult::Exit(self.on_halt(None, state)?));
        }
        if let Some(task) = state.scheduler.current_task() {
            log::debug!("{} finished", task);
            state.scheduler.terminate_task(task)?;
        }
        Ok(ExecResult::Continue)
    }

    fn current_is_main(&self, state: &InterpreterState) -> bool {
        state.scheduler.current_task() == Some(state.scheduler.main_task())
    }

    fn on_error(&mut self, op: &OpCell, err: InterpreterError, state: &mut InterpreterState) -> Result<DataCell> {
        log::debug!("{} at offset {} failed: {}", op.opcode, op.offset, err);
        match self.inspector.as_mut() {
            Some(inspector) => inspector.on_error(op, err, state),
            None => Err(err),
        }
    }

    /// Pop the main return value and deactivate the state.
    fn on_halt(&mut self, op: Option<&OpCell>, state: &mut InterpreterState) -> Result<DataCell> {
        let main_return = pop_result(state)?;
        if state.is_active() {
            state.halt(StatusCode::Ok)?;
        }
        log::debug!("halted with {} after {} instructions", main_return, self.instruction_count);
        match self.inspector.as_mut() {
            Some(inspector) => inspector.on_halt(op, main_return, state),
            None => Ok(main_return),
        }
    }
}

fn pop_result(state: &mut InterpreterState) -> Result<DataCell> {
    let coro = state.current_coro_mut()?;
    if coro.data_stack_size() > 0 {
        coro.pop_data()
    } else {
        Ok(DataCell::Nil)
    }
}

/// Run the adapt step of every promise that settled while `task` waited.
fn adapt_pending_promises(state: &mut InterpreterState, task: TaskId) -> Result<()> {
    for promise in state.scheduler.take_pending_promises(task) {
        let adapt = promise.borrow_mut().take_adapt();
        if let Some(adapt) = adapt {
            adapt(&promise.borrow(), state)?;
        }
    }
    Ok(())
}
