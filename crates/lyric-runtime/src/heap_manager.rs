//! Allocation, construction and garbage collection.

use std::sync::Arc;

use lyric_object::{LinkageSection, LiteralDescriptor, NEW_CLASS, NEW_ENUM, NEW_INSTANCE, NEW_STRUCT};

use crate::call_cell::CallCell;
use crate::data_cell::DataCell;
use crate::error::{InterpreterCondition, InterpreterError, Result, StatusCode};
use crate::heap::{AbstractRef, BytesRef, RestRef, StatusRef, StringRef, UrlRef};
use crate::plugin::NativeFunc;
use crate::state::{no_current_coro, InterpreterState};
use crate::subroutine::enter_proc;
use crate::virtual_table::VirtualTable;

/// How far marking follows refs from the roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MarkPolicy {
    /// Mark only cells reachable directly from a root.
    #[default]
    Shallow,
    /// Follow every ref's children until no new ref is marked.
    Transitive,
}

/// Outcome of one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcStats {
    pub marked: usize,
    pub deleted: usize,
    pub live: usize,
}

impl InterpreterState {
    pub fn allocate_ref(&mut self, value: Box<dyn AbstractRef>) -> DataCell {
        DataCell::Ref(self.heap.insert(value))
    }

    pub fn allocate_string(&mut self, value: impl Into<String>) -> DataCell {
        DataCell::String(self.heap.insert(Box::new(StringRef::new(value))))
    }

    pub fn allocate_url(&mut self, value: impl Into<String>) -> DataCell {
        DataCell::Url(self.heap.insert(Box::new(UrlRef::new(value))))
    }

    pub fn allocate_bytes(&mut self, value: impl Into<Vec<u8>>) -> DataCell {
        DataCell::Bytes(self.heap.insert(Box::new(BytesRef::new(value))))
    }

    pub fn allocate_rest(&mut self, frame: &CallCell) -> DataCell {
        DataCell::Rest(self.heap.insert(Box::new(RestRef::new(frame.rest.clone()))))
    }

    /// Status value, bound to the prelude's class for `code` when there is one.
    pub fn allocate_status(&mut self, code: StatusCode, message: impl Into<String>) -> DataCell {
        let status = match self.status_tables.get(&code) {
            Some(table) => StatusRef::with_table(code, message, table.clone()),
            None => StatusRef::new(code, message),
        };
        DataCell::Status(self.heap.insert(Box::new(status)))
    }

    fn push_current(&mut self, value: DataCell) -> Result<()> {
        self.current_coro_mut()?.push_data(value);
        Ok(())
    }

    fn resolve_current_literal(&mut self, address: u32) -> Result<LiteralDescriptor> {
        let sp = self.current_coro()?.peek_sp();
        self.segment_manager.resolve_literal(sp, address)
    }

    pub fn load_string_onto_stack(&mut self, value: impl Into<String>) -> Result<()> {
        let cell = self.allocate_string(value);
        self.push_current(cell)
    }

    pub fn load_url_onto_stack(&mut self, value: impl Into<String>) -> Result<()> {
        let cell = self.allocate_url(value);
        self.push_current(cell)
    }

    pub fn load_bytes_onto_stack(&mut self, value: impl Into<Vec<u8>>) -> Result<()> {
        let cell = self.allocate_bytes(value);
        self.push_current(cell)
    }

    pub fn load_literal_string_onto_stack(&mut self, address: u32) -> Result<()> {
        match self.resolve_current_literal(address)? {
            LiteralDescriptor::Utf8(value) => self.load_string_onto_stack(value),
            other => Err(InterpreterError::invariant(format!("invalid string literal {:?}", other))),
        }
    }

    pub fn load_literal_url_onto_stack(&mut self, address: u32) -> Result<()> {
        match self.resolve_current_literal(address)? {
            LiteralDescriptor::Utf8(value) => self.load_url_onto_stack(value),
            other => Err(InterpreterError::invariant(format!("invalid url literal {:?}", other))),
        }
    }

    pub fn load_literal_bytes_onto_stack(&mut self, address: u32) -> Result<()> {
        match self.resolve_current_literal(address)? {
            LiteralDescriptor::Bytes(value) => self.load_bytes_onto_stack(value),
            LiteralDescriptor::Utf8(value) => self.load_bytes_onto_stack(value.into_bytes()),
            other => Err(InterpreterError::invariant(format!("invalid bytes literal {:?}", other))),
        }
    }

    /// Push the rest arguments of the current frame as one `Rest` cell.
    pub fn load_rest_onto_stack(&mut self) -> Result<()> {
        let rest = self.current_coro()?.peek_call()?.rest.clone();
        let cell = DataCell::Rest(self.heap.insert(Box::new(RestRef::new(rest))));
        self.push_current(cell)
    }

    /// Push the frame a native allocator runs in and return the allocator.
    ///
    /// The allocator pushes the new ref; `return_to_caller` then pops the
    /// frame and leaves the ref on the stack for `construct_new`.
    pub fn prepare_new(&mut self, new_type: u8, address: u32) -> Result<NativeFunc> {
        let section = match new_type {
            NEW_CLASS => LinkageSection::Class,
            NEW_ENUM => LinkageSection::Enum,
            NEW_INSTANCE => LinkageSection::Instance,
            NEW_STRUCT => LinkageSection::Struct,
            _ => return Err(InterpreterError::invariant(format!("invalid new type {}", new_type))),
        };
        let sp = self.current_coro()?.peek_sp();
        let descriptor = self.segment_manager.resolve_descriptor(sp, section, address)?;
        let vtable = self.segment_manager.resolve_virtual_table(&descriptor)?;
        let (segment, allocator) = vtable
            .find_allocator()
            .map(|(table, trap)| (table.segment(), trap))
            .ok_or_else(|| InterpreterError::invariant(format!("missing allocator for {}", vtable.symbol_url())))?;

        let coro = self.current_coro_mut()?;
        let mut frame = CallCell::for_allocator(segment, vtable);
        frame.stack_guard = coro.data_stack_size();
        frame = frame.with_return(coro.peek_sp(), Some(coro.peek_ip().clone()));
        coro.push_call(frame, lyric_object::BytecodeIterator::empty(), segment);
        Ok(allocator)
    }

    /// Run the constructor of the ref on top of the data stack. The ref
    /// stays on the stack when the constructor returns.
    pub fn construct_new(&mut self, args: Vec<DataCell>) -> Result<()> {
        let receiver = self.current_coro()?.peek_data()?;
        let vtable = self.receiver_table(&receiver)?;
        let ctor = *vtable
            .ctor()
            .ok_or_else(|| InterpreterError::invariant(format!("missing ctor for {}", vtable.symbol_url())))?;
        let coro = self.scheduler.current_coro_mut().ok_or_else(no_current_coro)?;
        enter_proc(coro, &self.segment_manager, &ctor, false, args, receiver, Some(vtable))
    }

    fn receiver_table(&self, receiver: &DataCell) -> Result<Arc<VirtualTable>> {
        let table = match receiver {
            DataCell::Ref(handle) | DataCell::Status(handle) => self.heap.get(*handle)?.virtual_table().cloned(),
            _ => None,
        };
        table.ok_or_else(|| InterpreterError::new(InterpreterCondition::InvalidReceiver, "invalid data cell"))
    }

    /// Mark every ref reachable from the roots and free the rest.
    pub fn collect_garbage(&mut self) -> GcStats {
        self.heap.clear_reachable();

        let mut roots: Vec<DataCell> = Vec::new();
        let scheduler = &self.scheduler;
        let tasks = scheduler
            .current_task()
            .and_then(|id| scheduler.task(id))
            .into_iter()
            .chain(scheduler.waiting_tasks())
            .chain(scheduler.ready_tasks());
        for task in tasks {
            let coro = task.coro();
            roots.extend(coro.data().copied());
            for frame in coro.calls() {
                roots.extend(frame.slots().copied());
            }
            roots.extend(task.pending_promises().map(|p| p.borrow().result()));
        }
        roots.extend(scheduler.waiter_promises().map(|p| p.borrow().result()));
        for segment in self.segment_manager.segments() {
            roots.extend(segment.stored_cells().copied());
        }
        roots.extend(self.main_arguments.iter().copied());

        let mut marked = 0;
        let mut pending: Vec<DataCell> = roots;
        while let Some(cell) = pending.pop() {
            let Some(handle) = cell.handle() else { continue };
            if !self.heap.set_reachable(handle) {
                continue;
            }
            marked += 1;
            if self.options().mark_policy == MarkPolicy::Transitive {
                pending.extend(self.heap.children(handle));
            }
        }

        let deleted = self.heap.delete_unreachable();
        let stats = GcStats { marked, deleted, live: self.heap.len() };
        log::debug!("gc marked {} refs, deleted {}, {} live", stats.marked, stats.deleted, stats.live);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::StaticLoader;
    use crate::state::InterpreterStateOptions;
    use lyric_common::ModuleLocation;
    use lyric_object::{CallMode, ObjectBuilder, Opcode, ProcBuilder};

    fn state(policy: MarkPolicy) -> InterpreterState {
        let mut proc = ProcBuilder::new(0, 1);
        proc.code.emit(Opcode::Nil).emit(Opcode::Return);
        let mut builder = ObjectBuilder::new();
        builder.add_call("$entry", CallMode::Normal, &proc, true).unwrap();
        let mut loader = StaticLoader::new();
        loader.insert_module(ModuleLocation::parse("/main").unwrap(), builder.build());
        let options = InterpreterStateOptions { mark_policy: policy, ..Default::default() };
        let mut state = InterpreterState::create(Box::new(loader), options);
        state.load(&ModuleLocation::parse("/main").unwrap()).unwrap();
        state
    }

    #[test]
    fn test_stack_and_frame_cells_are_roots() {
        let mut state = state(MarkPolicy::Shallow);
        let on_stack = state.allocate_string("stack");
        let in_local = state.allocate_bytes(vec![1u8, 2]);
        let garbage = state.allocate_string("garbage");
        let coro = state.current_coro_mut().unwrap();
        coro.push_data(on_stack);
        coro.peek_call_mut().unwrap().set_local(0, in_local);

        let stats = state.collect_garbage();
        assert_eq!(stats.deleted, 1);
        assert!(state.heap().contains(on_stack.handle().unwrap()));
        assert!(state.heap().contains(in_local.handle().unwrap()));
        assert!(!state.heap().contains(garbage.handle().unwrap()));
    }

    #[test]
    fn test_transitive_policy_follows_children() {
        for (policy, survives) in [(MarkPolicy::Shallow, false), (MarkPolicy::Transitive, true)] {
            let mut state = state(policy);
            let inner = state.allocate_string("inner");
            let mut frame = CallCell::new(0, 0, 0, false);
            frame.rest = vec![inner];
            let rest = state.allocate_rest(&frame);
            state.current_coro_mut().unwrap().push_data(rest);
            state.collect_garbage();
            assert!(state.heap().contains(rest.handle().unwrap()));
            assert_eq!(state.heap().contains(inner.handle().unwrap()), survives);
        }
    }

    #[test]
    fn test_status_without_prelude_has_no_table() {
        let mut state = state(MarkPolicy::Shallow);
        let status = state.allocate_status(StatusCode::Cancelled, "stopped");
        let handle = status.handle().unwrap();
        let value = state.heap().get_as::<StatusRef>(handle).unwrap();
        assert_eq!(value.code(), StatusCode::Cancelled);
        assert!(value.virtual_table().is_none());
    }

    #[test]
    fn test_construct_new_requires_ref() {
        let mut state = state(MarkPolicy::Shallow);
        state.current_coro_mut().unwrap().push_data(DataCell::I64(1));
        let err = state.construct_new(Vec::new()).unwrap_err();
        assert_eq!(err.condition, InterpreterCondition::InvalidReceiver);
    }
}
