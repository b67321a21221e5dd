//! Stackful coroutines.

use lyric_object::{BytecodeIterator, OpCell};

use crate::call_cell::{CallCell, INVALID_INDEX};
use crate::data_cell::DataCell;
use crate::error::{InterpreterCondition, InterpreterError, Result};

/// Map a stack offset to an index: negative offsets count from the top
/// (`-1` is the top), non-negative offsets from the bottom.
fn stack_index(len: usize, offset: isize) -> Option<usize> {
    if offset < 0 {
        let from_top = offset.unsigned_abs();
        (from_top <= len).then(|| len - from_top)
    } else {
        let index = offset as usize;
        (index < len).then_some(index)
    }
}

fn data_error(message: &str) -> InterpreterError {
    InterpreterError::new(InterpreterCondition::InvalidDataStackV1, message)
}

/// Execution context of one task: instruction pointer, current segment, and
/// the call, data and guard stacks.
#[derive(Debug, Clone)]
pub struct StackfulCoroutine {
    ip: BytecodeIterator,
    sp: u32,
    call_stack: Vec<CallCell>,
    data_stack: Vec<DataCell>,
    guard_stack: Vec<usize>,
}

impl Default for StackfulCoroutine {
    fn default() -> Self {
        Self::new()
    }
}

impl StackfulCoroutine {
    pub fn new() -> Self {
        Self {
            ip: BytecodeIterator::empty(),
            sp: INVALID_INDEX,
            call_stack: Vec::new(),
            data_stack: Vec::new(),
            guard_stack: Vec::new(),
        }
    }

    /// Drop all frames, data and guards and clear the instruction pointer.
    pub fn reset(&mut self) {
        self.ip = BytecodeIterator::empty();
        self.sp = INVALID_INDEX;
        self.call_stack.clear();
        self.data_stack.clear();
        self.guard_stack.clear();
    }

    #[inline]
    pub fn next_op(&mut self) -> Option<OpCell> {
        self.ip.next_op()
    }

    #[inline]
    pub fn move_ip(&mut self, delta: i16) -> bool {
        self.ip.move_by(delta)
    }

    #[inline]
    pub fn peek_ip(&self) -> &BytecodeIterator {
        &self.ip
    }

    /// Index of the segment the coroutine is executing.
    #[inline]
    pub fn peek_sp(&self) -> u32 {
        self.sp
    }

    /// Continue at `ip` in `sp`. An invalid segment index keeps the current one.
    pub fn transfer_control(&mut self, ip: BytecodeIterator, sp: u32) {
        self.ip = ip;
        if sp != INVALID_INDEX {
            self.sp = sp;
        }
    }

    pub fn push_call(&mut self, call: CallCell, ip: BytecodeIterator, sp: u32) {
        self.ip = ip;
        self.sp = sp;
        self.call_stack.push(call);
    }

    pub fn pop_call(&mut self) -> Result<CallCell> {
        self.call_stack
            .pop()
            .ok_or_else(|| InterpreterError::invariant("call stack is empty"))
    }

    pub fn peek_call(&self) -> Result<&CallCell> {
        self.call_stack
            .last()
            .ok_or_else(|| InterpreterError::invariant("empty call stack"))
    }

    pub fn peek_call_mut(&mut self) -> Result<&mut CallCell> {
        self.call_stack
            .last_mut()
            .ok_or_else(|| InterpreterError::invariant("empty call stack"))
    }

    pub fn peek_call_at(&self, offset: isize) -> Result<&CallCell> {
        stack_index(self.call_stack.len(), offset)
            .map(|i| &self.call_stack[i])
            .ok_or_else(|| InterpreterError::invariant("invalid call stack offset"))
    }

    pub fn drop_call(&mut self, offset: isize) -> Result<()> {
        let index = stack_index(self.call_stack.len(), offset)
            .ok_or_else(|| InterpreterError::invariant("invalid call stack offset"))?;
        self.call_stack.remove(index);
        Ok(())
    }

    #[inline]
    pub fn call_stack_size(&self) -> usize {
        self.call_stack.len()
    }

    /// Frames from the top of the stack down.
    pub fn calls(&self) -> impl Iterator<Item = &CallCell> {
        self.call_stack.iter().rev()
    }

    #[inline]
    pub fn push_data(&mut self, value: DataCell) {
        self.data_stack.push(value);
    }

    pub fn pop_data(&mut self) -> Result<DataCell> {
        self.data_stack.pop().ok_or_else(|| data_error("data stack is empty"))
    }

    /// Pop `count` cells, returned bottom first.
    pub fn pop_data_n(&mut self, count: usize) -> Result<Vec<DataCell>> {
        if count > self.data_stack.len() {
            return Err(InterpreterError::new(
                InterpreterCondition::InvalidDataStackV2,
                "not enough values on data stack",
            ));
        }
        let start = self.data_stack.len() - count;
        Ok(self.data_stack.split_off(start))
    }

    pub fn peek_data(&self) -> Result<DataCell> {
        self.data_stack.last().copied().ok_or_else(|| data_error("data stack is empty"))
    }

    pub fn peek_data_at(&self, offset: isize) -> Result<DataCell> {
        stack_index(self.data_stack.len(), offset)
            .map(|i| self.data_stack[i])
            .ok_or_else(|| data_error("invalid data stack offset"))
    }

    pub fn drop_data(&mut self, offset: isize) -> Result<()> {
        let index = stack_index(self.data_stack.len(), offset)
            .ok_or_else(|| data_error("invalid data stack offset"))?;
        self.data_stack.remove(index);
        Ok(())
    }

    #[inline]
    pub fn data_stack_size(&self) -> usize {
        self.data_stack.len()
    }

    /// Cells from the top of the stack down.
    pub fn data(&self) -> impl Iterator<Item = &DataCell> {
        self.data_stack.iter().rev()
    }

    pub fn extend_data_stack(&mut self, count: usize) {
        self.data_stack.resize(self.data_stack.len() + count, DataCell::Invalid);
    }

    pub fn resize_data_stack(&mut self, size: usize) {
        self.data_stack.resize(size, DataCell::Invalid);
    }

    /// Push a guard at `call_stack_size`. Guards must strictly increase.
    pub fn push_guard(&mut self, guard: usize) -> Result<()> {
        if guard == 0 || self.guard_stack.last().is_some_and(|g| *g >= guard) {
            return Err(InterpreterError::invariant(format!("invalid stack guard {}", guard)));
        }
        self.guard_stack.push(guard);
        Ok(())
    }

    pub fn pop_guard(&mut self) -> Result<usize> {
        self.guard_stack
            .pop()
            .ok_or_else(|| InterpreterError::invariant("guard stack is empty"))
    }

    #[inline]
    pub fn peek_guard(&self) -> Option<usize> {
        self.guard_stack.last().copied()
    }

    /// True while the innermost guard's frames are still on the call stack.
    pub fn check_guard(&self) -> bool {
        self.guard_stack.last().map_or(true, |g| *g <= self.call_stack.len())
    }

    #[inline]
    pub fn guard_stack_size(&self) -> usize {
        self.guard_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_restores_size() {
        let mut coro = StackfulCoroutine::new();
        coro.push_data(DataCell::Nil);
        let before = coro.data_stack_size();
        for i in 0..5 {
            coro.push_data(DataCell::I64(i));
        }
        for i in (0..5).rev() {
            assert_eq!(coro.pop_data().unwrap(), DataCell::I64(i));
        }
        assert_eq!(coro.data_stack_size(), before);
    }

    #[test]
    fn test_offsets() {
        let mut coro = StackfulCoroutine::new();
        for i in 0..3 {
            coro.push_data(DataCell::I64(i));
        }
        assert_eq!(coro.peek_data_at(-1).unwrap(), DataCell::I64(2));
        assert_eq!(coro.peek_data_at(-3).unwrap(), DataCell::I64(0));
        assert_eq!(coro.peek_data_at(0).unwrap(), DataCell::I64(0));
        assert!(coro.peek_data_at(3).is_err());
        assert!(coro.peek_data_at(-4).is_err());
    }

    #[test]
    fn test_out_of_range_drop_leaves_stack_intact() {
        let mut coro = StackfulCoroutine::new();
        coro.push_data(DataCell::I64(1));
        coro.push_data(DataCell::I64(2));
        let err = coro.drop_data(5).unwrap_err();
        assert_eq!(err.condition, InterpreterCondition::InvalidDataStackV1);
        assert!(coro.drop_data(-3).is_err());
        assert_eq!(coro.data_stack_size(), 2);
        coro.drop_data(0).unwrap();
        assert_eq!(coro.pop_data().unwrap(), DataCell::I64(2));
        assert!(coro.pop_data().is_err());
    }

    #[test]
    fn test_pop_data_n() {
        let mut coro = StackfulCoroutine::new();
        for i in 0..4 {
            coro.push_data(DataCell::I64(i));
        }
        assert_eq!(coro.pop_data_n(2).unwrap(), vec![DataCell::I64(2), DataCell::I64(3)]);
        assert!(coro.pop_data_n(3).is_err());
        assert_eq!(coro.data_stack_size(), 2);
    }

    #[test]
    fn test_guards() {
        let mut coro = StackfulCoroutine::new();
        assert!(coro.check_guard());
        for i in 0..2 {
            coro.push_call(CallCell::new(i, 0, 0, false), BytecodeIterator::empty(), 0);
        }
        coro.push_guard(2).unwrap();
        assert!(coro.push_guard(2).is_err());
        assert!(coro.check_guard());
        coro.pop_call().unwrap();
        assert!(!coro.check_guard());
        assert_eq!(coro.pop_guard().unwrap(), 2);
        assert!(coro.pop_guard().is_err());
        assert!(coro.peek_guard().is_none());
    }

    #[test]
    fn test_call_stack_errors() {
        let mut coro = StackfulCoroutine::new();
        assert_eq!(coro.pop_call().unwrap_err().condition, InterpreterCondition::RuntimeInvariant);
        assert!(coro.peek_call().is_err());
        coro.push_call(CallCell::new(7, 0, 0, false), BytecodeIterator::empty(), 0);
        assert_eq!(coro.peek_call_at(-1).unwrap().call_index, 7);
        assert!(coro.drop_call(1).is_err());
        assert_eq!(coro.calls().count(), 1);
    }
}
