//! Activation records.

use std::sync::Arc;

use lyric_object::BytecodeIterator;

use crate::data_cell::DataCell;
use crate::virtual_table::VirtualTable;

pub const INVALID_INDEX: u32 = u32::MAX;

/// One frame on a coroutine's call stack.
///
/// Lexicals are copied from the defining frame when the call is made; stores
/// into them are local to this frame.
#[derive(Debug, Clone)]
pub struct CallCell {
    pub call_index: u32,
    pub call_segment: u32,
    pub proc_offset: u32,
    pub return_segment: u32,
    /// `None` when returning from this frame ends the task.
    pub return_ip: Option<BytecodeIterator>,
    pub returns_value: bool,
    /// Data stack size when the call was made.
    pub stack_guard: usize,
    pub arguments: Vec<DataCell>,
    pub locals: Vec<DataCell>,
    pub lexicals: Vec<DataCell>,
    pub rest: Vec<DataCell>,
    pub receiver: DataCell,
    pub vtable: Option<Arc<VirtualTable>>,
}

impl CallCell {
    pub fn new(call_index: u32, call_segment: u32, proc_offset: u32, returns_value: bool) -> Self {
        Self {
            call_index,
            call_segment,
            proc_offset,
            return_segment: INVALID_INDEX,
            return_ip: None,
            returns_value,
            stack_guard: 0,
            arguments: Vec::new(),
            locals: Vec::new(),
            lexicals: Vec::new(),
            rest: Vec::new(),
            receiver: DataCell::Invalid,
            vtable: None,
        }
    }

    /// Frame pushed while a native allocator runs.
    pub fn for_allocator(segment: u32, vtable: Arc<VirtualTable>) -> Self {
        let mut cell = Self::new(INVALID_INDEX, segment, INVALID_INDEX, true);
        cell.vtable = Some(vtable);
        cell
    }

    pub fn with_return(mut self, return_segment: u32, return_ip: Option<BytecodeIterator>) -> Self {
        self.return_segment = return_segment;
        self.return_ip = return_ip;
        self
    }

    pub fn with_locals(mut self, num_locals: u16) -> Self {
        self.locals = vec![DataCell::Invalid; num_locals as usize];
        self
    }

    #[inline]
    pub fn num_arguments(&self) -> usize {
        self.arguments.len()
    }

    #[inline]
    pub fn num_locals(&self) -> usize {
        self.locals.len()
    }

    #[inline]
    pub fn num_lexicals(&self) -> usize {
        self.lexicals.len()
    }

    #[inline]
    pub fn num_rest(&self) -> usize {
        self.rest.len()
    }

    pub fn get_argument(&self, index: u32) -> Option<DataCell> {
        self.arguments.get(index as usize).copied()
    }

    pub fn set_argument(&mut self, index: u32, value: DataCell) -> bool {
        set_slot(&mut self.arguments, index, value)
    }

    pub fn get_local(&self, index: u32) -> Option<DataCell> {
        self.locals.get(index as usize).copied()
    }

    pub fn set_local(&mut self, index: u32, value: DataCell) -> bool {
        set_slot(&mut self.locals, index, value)
    }

    pub fn get_lexical(&self, index: u32) -> Option<DataCell> {
        self.lexicals.get(index as usize).copied()
    }

    pub fn set_lexical(&mut self, index: u32, value: DataCell) -> bool {
        set_slot(&mut self.lexicals, index, value)
    }

    pub fn get_rest(&self, index: u32) -> Option<DataCell> {
        self.rest.get(index as usize).copied()
    }

    /// Every cell held by the frame, receiver included.
    pub fn slots(&self) -> impl Iterator<Item = &DataCell> {
        self.arguments
            .iter()
            .chain(self.locals.iter())
            .chain(self.lexicals.iter())
            .chain(self.rest.iter())
            .chain(std::iter::once(&self.receiver))
    }
}

fn set_slot(slots: &mut [DataCell], index: u32, value: DataCell) -> bool {
    match slots.get_mut(index as usize) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}
