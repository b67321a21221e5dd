//! Entering and leaving procs.

use std::sync::Arc;

use lyric_object::{
    is_near, BytecodeIterator, CallMode, LinkageSection, ProcHeader, INVALID_ADDRESS_U32, LEXICAL_ARGUMENT,
    LEXICAL_LOCAL,
};

use crate::call_cell::CallCell;
use crate::coroutine::StackfulCoroutine;
use crate::data_cell::{DataCell, Descriptor};
use crate::error::{InterpreterError, Result};
use crate::scheduler::TaskId;
use crate::segment_manager::SegmentManager;
use crate::state::{no_current_coro, InterpreterState};
use crate::virtual_table::{VirtualMethod, VirtualTable};

/// Upper bound (exclusive) on arguments passed to one call.
pub const MAX_ARGUMENTS: usize = 65535;

/// Split `args` into declared arguments and rest arguments.
pub(crate) fn process_arguments(frame: &mut CallCell, header: &ProcHeader, mut args: Vec<DataCell>) -> Result<()> {
    if args.len() >= MAX_ARGUMENTS {
        return Err(InterpreterError::invariant("too many arguments"));
    }
    let num_arguments = header.num_arguments as usize;
    if args.len() < num_arguments {
        return Err(InterpreterError::invariant("not enough arguments"));
    }
    frame.rest = args.split_off(num_arguments);
    frame.arguments = args;
    Ok(())
}

/// Copy each lexical from the nearest active frame of its defining call.
pub(crate) fn import_lexicals(frame: &mut CallCell, header: &ProcHeader, coro: &StackfulCoroutine) -> Result<()> {
    for lexical in &header.lexicals {
        let activation = coro
            .calls()
            .find(|c| c.call_segment == frame.call_segment && c.call_index == lexical.activation_call)
            .ok_or_else(|| InterpreterError::invariant("missing lexical"))?;
        let value = match lexical.target {
            LEXICAL_ARGUMENT => activation.get_argument(lexical.target_offset),
            LEXICAL_LOCAL => activation.get_local(lexical.target_offset),
            _ => return Err(InterpreterError::invariant("invalid lexical target")),
        };
        let value = value.ok_or_else(|| InterpreterError::invariant("missing lexical"))?;
        frame.lexicals.push(value);
    }
    Ok(())
}

/// Push a frame for `method` on `coro` and jump to the first instruction of
/// its proc. The frame returns to the coroutine's current position.
pub(crate) fn enter_proc(
    coro: &mut StackfulCoroutine,
    segments: &SegmentManager,
    method: &VirtualMethod,
    returns_value: bool,
    args: Vec<DataCell>,
    receiver: DataCell,
    vtable: Option<Arc<VirtualTable>>,
) -> Result<()> {
    let bytecode = segments.segment(method.segment)?.bytecode().clone();
    let header = ProcHeader::read(&bytecode, method.proc_offset)?;
    let mut frame = CallCell::new(method.call_index, method.segment, method.proc_offset, returns_value)
        .with_locals(header.num_locals)
        .with_return(coro.peek_sp(), Some(coro.peek_ip().clone()));
    process_arguments(&mut frame, &header, args)?;
    import_lexicals(&mut frame, &header, coro)?;
    frame.receiver = receiver;
    frame.vtable = vtable;
    frame.stack_guard = coro.data_stack_size();

    let ip = BytecodeIterator::at(bytecode, header.code_offset)
        .ok_or_else(|| InterpreterError::invariant("invalid proc code offset"))?;
    log::trace!("entering call {} in segment {}", method.call_index, method.segment);
    coro.push_call(frame, ip, method.segment);
    Ok(())
}

/// Pop the top frame and continue at its return address. Cells pushed by the
/// frame are dropped, except the top cell when the frame returns a value.
/// Returns false when the frame had no return address.
pub(crate) fn return_from_frame(coro: &mut StackfulCoroutine) -> Result<bool> {
    let frame = coro.pop_call()?;
    let ip = frame.return_ip.clone().unwrap_or_else(BytecodeIterator::empty);
    coro.transfer_control(ip, frame.return_segment);
    if coro.data_stack_size() > frame.stack_guard {
        if frame.returns_value {
            let value = coro.pop_data()?;
            coro.resize_data_stack(frame.stack_guard);
            coro.push_data(value);
        } else {
            coro.resize_data_stack(frame.stack_guard);
        }
    }
    Ok(frame.return_ip.is_some())
}

impl InterpreterState {
    fn current_sp(&self) -> Result<u32> {
        Ok(self.current_coro()?.peek_sp())
    }

    fn enter_current(
        &mut self,
        method: &VirtualMethod,
        args: Vec<DataCell>,
        receiver: DataCell,
        vtable: Option<Arc<VirtualTable>>,
    ) -> Result<()> {
        let coro = self.scheduler.current_coro_mut().ok_or_else(no_current_coro)?;
        enter_proc(coro, &self.segment_manager, method, method.returns_value, args, receiver, vtable)
    }

    /// Static call through a near or far call address.
    pub fn call_static(&mut self, address: u32, args: Vec<DataCell>) -> Result<()> {
        let sp = self.current_sp()?;
        let call = self.segment_manager.resolve_descriptor(sp, LinkageSection::Call, address)?;
        self.call_static_descriptor(&call, args)
    }

    pub fn call_static_descriptor(&mut self, call: &DataCell, args: Vec<DataCell>) -> Result<()> {
        let method = self.free_method(call)?;
        self.enter_current(&method, args, DataCell::Invalid, None)
    }

    /// Method for a call that is neither a constructor nor bound to a receiver.
    fn free_method(&self, call: &DataCell) -> Result<VirtualMethod> {
        let method = self.segment_manager.virtual_method(call)?;
        let descriptor = self
            .segment_manager
            .segment(method.segment)?
            .object()
            .get_call(method.call_index)
            .ok_or_else(|| InterpreterError::invariant(format!("missing call {}", call)))?;
        if descriptor.mode == CallMode::Constructor || descriptor.is_bound() {
            return Err(InterpreterError::invariant(format!("invalid call flags for {}", descriptor.path)));
        }
        Ok(method)
    }

    fn dispatch_table(&self, receiver: &DataCell) -> Result<Arc<VirtualTable>> {
        let table = match receiver {
            DataCell::Ref(handle) | DataCell::Status(handle) => self.heap.get(*handle)?.virtual_table().cloned(),
            _ => None,
        };
        table.ok_or_else(|| InterpreterError::invariant("cannot resolve method; invalid receiver"))
    }

    /// Call the method `address` names on the receiver's table.
    pub fn call_virtual(&mut self, receiver: DataCell, address: u32, args: Vec<DataCell>) -> Result<()> {
        let vtable = self.dispatch_table(&receiver)?;
        let sp = self.current_sp()?;
        let call = self.segment_manager.resolve_descriptor(sp, LinkageSection::Call, address)?;
        let method = *vtable
            .get_method(&call)
            .ok_or_else(|| InterpreterError::invariant(format!("missing method {} on {}", call, vtable.symbol_url())))?;
        self.enter_current(&method, args, receiver, Some(vtable))
    }

    /// Call the receiver's implementation of the action `address` from `concept`.
    pub fn call_concept(
        &mut self,
        receiver: DataCell,
        concept: DataCell,
        address: u32,
        args: Vec<DataCell>,
    ) -> Result<()> {
        let vtable = self.dispatch_table(&receiver)?;
        let sp = self.current_sp()?;
        let action = self.segment_manager.resolve_descriptor(sp, LinkageSection::Action, address)?;
        let method = *vtable.get_extension(&concept, &action).ok_or_else(|| {
            InterpreterError::invariant(format!("missing extension {} for {} on {}", action, concept, vtable.symbol_url()))
        })?;
        self.enter_current(&method, args, receiver, Some(vtable))
    }

    /// Call a method of `existential` with any value as the receiver.
    pub fn call_existential(
        &mut self,
        receiver: DataCell,
        existential: DataCell,
        address: u32,
        args: Vec<DataCell>,
    ) -> Result<()> {
        let etable = self.segment_manager.resolve_existential_table(&existential)?;
        let sp = self.current_sp()?;
        let call = self.segment_manager.resolve_descriptor(sp, LinkageSection::Call, address)?;
        let method = *etable
            .get_method(&call)
            .ok_or_else(|| InterpreterError::invariant(format!("missing method {} on {}", call, etable.symbol_url())))?;
        self.enter_current(&method, args, receiver, Some(etable))
    }

    /// Enter the initializer of the static at `address`.
    pub fn init_static(&mut self, address: u32) -> Result<()> {
        let sp = self.current_sp()?;
        let (segment, index) = self.segment_manager.resolve_address(sp, LinkageSection::Static, address)?;
        let initializer = self
            .segment_manager
            .segment(segment)?
            .object()
            .get_static(index)
            .ok_or_else(|| InterpreterError::invariant(format!("missing static {}", index)))?
            .initializer;
        if initializer == INVALID_ADDRESS_U32 || !is_near(initializer) {
            return Err(InterpreterError::invariant("invalid static init"));
        }
        let call = DataCell::Call(Descriptor::new(segment, initializer));
        let method = self.segment_manager.virtual_method(&call)?;
        self.enter_current(&method, Vec::new(), DataCell::Invalid, None)
    }

    /// Leave the current frame. Returns false when the frame was the bottom
    /// frame of its task.
    pub fn return_to_caller(&mut self) -> Result<bool> {
        return_from_frame(self.current_coro_mut()?)
    }

    /// New worker task, still `Initial`, whose coroutine is positioned at the
    /// proc of `call`. Returning from that proc ends the task.
    pub fn create_worker(&mut self, call: &DataCell, args: Vec<DataCell>) -> Result<TaskId> {
        let method = self.free_method(call)?;
        let task = self.scheduler.create_task();
        let coro = self
            .scheduler
            .task_mut(task)
            .ok_or_else(|| InterpreterError::invariant(format!("missing {}", task)))?
            .coro_mut();
        enter_proc(coro, &self.segment_manager, &method, method.returns_value, args, DataCell::Invalid, None)?;
        coro.peek_call_mut()?.return_ip = None;
        log::debug!("created worker {} for {}", task, call);
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InterpreterCondition;
    use lyric_object::LexicalEntry;

    fn header(num_arguments: u16, lexicals: Vec<LexicalEntry>) -> ProcHeader {
        ProcHeader {
            proc_offset: 0,
            proc_size: 0,
            num_arguments,
            num_locals: 0,
            lexicals,
            code_offset: 0,
            code_size: 0,
        }
    }

    #[test]
    fn test_extra_arguments_become_rest() {
        let mut frame = CallCell::new(0, 0, 0, false);
        let args = vec![DataCell::I64(1), DataCell::I64(2), DataCell::I64(3)];
        process_arguments(&mut frame, &header(1, Vec::new()), args).unwrap();
        assert_eq!(frame.arguments, vec![DataCell::I64(1)]);
        assert_eq!(frame.rest, vec![DataCell::I64(2), DataCell::I64(3)]);
    }

    #[test]
    fn test_argument_count_is_validated() {
        let mut frame = CallCell::new(0, 0, 0, false);
        let err = process_arguments(&mut frame, &header(2, Vec::new()), vec![DataCell::Nil]).unwrap_err();
        assert_eq!(err.message, "not enough arguments");
        let err = process_arguments(&mut frame, &header(0, Vec::new()), vec![DataCell::Nil; MAX_ARGUMENTS]).unwrap_err();
        assert_eq!(err.message, "too many arguments");
    }

    #[test]
    fn test_lexicals_come_from_nearest_activation() {
        let mut coro = StackfulCoroutine::new();
        let mut outer = CallCell::new(3, 0, 0, false).with_locals(2);
        outer.set_local(1, DataCell::I64(10));
        coro.push_call(outer, BytecodeIterator::empty(), 0);
        let mut inner = CallCell::new(3, 0, 0, false).with_locals(2);
        inner.set_local(1, DataCell::I64(20));
        coro.push_call(inner, BytecodeIterator::empty(), 0);

        let lexical = LexicalEntry { activation_call: 3, target_offset: 1, target: LEXICAL_LOCAL };
        let mut frame = CallCell::new(4, 0, 0, false);
        import_lexicals(&mut frame, &header(0, vec![lexical]), &coro).unwrap();
        assert_eq!(frame.lexicals, vec![DataCell::I64(20)]);

        let missing = LexicalEntry { activation_call: 9, target_offset: 0, target: LEXICAL_LOCAL };
        let mut frame = CallCell::new(4, 0, 0, false);
        let err = import_lexicals(&mut frame, &header(0, vec![missing]), &coro).unwrap_err();
        assert_eq!(err.condition, InterpreterCondition::RuntimeInvariant);
    }

    #[test]
    fn test_return_keeps_only_the_result() {
        let mut coro = StackfulCoroutine::new();
        coro.push_data(DataCell::I64(1));
        let mut frame = CallCell::new(0, 0, 0, true).with_return(0, Some(BytecodeIterator::empty()));
        frame.stack_guard = 1;
        coro.push_call(frame, BytecodeIterator::empty(), 0);
        coro.push_data(DataCell::I64(2));
        coro.push_data(DataCell::I64(3));
        assert!(return_from_frame(&mut coro).unwrap());
        assert_eq!(coro.data().copied().collect::<Vec<_>>(), vec![DataCell::I64(3), DataCell::I64(1)]);
    }

    #[test]
    fn test_return_without_value_drops_everything_above_guard() {
        let mut coro = StackfulCoroutine::new();
        coro.push_data(DataCell::I64(1));
        let mut frame = CallCell::new(0, 0, 0, false);
        frame.stack_guard = 1;
        coro.push_call(frame, BytecodeIterator::empty(), 0);
        coro.push_data(DataCell::I64(4));
        coro.push_data(DataCell::I64(5));
        assert!(!return_from_frame(&mut coro).unwrap());
        assert_eq!(coro.data().copied().collect::<Vec<_>>(), vec![DataCell::I64(1)]);
        assert!(return_from_frame(&mut coro).is_err());
    }
}
