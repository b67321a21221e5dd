//! The heap: a generational slot arena that exclusively owns every ref.

pub mod abstract_ref;
pub mod base_ref;
pub mod bytes_ref;
pub mod rest_ref;
pub mod status_ref;
pub mod string_ref;

use std::fmt;

pub use abstract_ref::AbstractRef;
pub use base_ref::BaseRef;
pub use bytes_ref::BytesRef;
pub use rest_ref::RestRef;
pub use status_ref::StatusRef;
pub use string_ref::{StringRef, UrlRef};

use crate::data_cell::DataCell;
use crate::error::{InterpreterError, Result};

/// Index plus generation. A handle whose generation no longer matches its
/// slot refers to a ref that has been collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefHandle {
    index: u32,
    generation: u32,
}

impl RefHandle {
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for RefHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

struct Slot {
    generation: u32,
    value: Option<Box<dyn AbstractRef>>,
}

#[derive(Default)]
pub struct AbstractHeap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl AbstractHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live refs.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn insert(&mut self, value: Box<dyn AbstractRef>) -> RefHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return RefHandle::new(index, slot.generation);
        }
        self.slots.push(Slot { generation: 0, value: Some(value) });
        RefHandle::new(self.slots.len() as u32 - 1, 0)
    }

    pub fn contains(&self, handle: RefHandle) -> bool {
        self.slot(handle).is_some()
    }

    fn slot(&self, handle: RefHandle) -> Option<&Slot> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation && s.value.is_some())
    }

    pub fn get(&self, handle: RefHandle) -> Result<&dyn AbstractRef> {
        self.slot(handle)
            .and_then(|s| s.value.as_deref())
            .ok_or_else(|| InterpreterError::invariant(format!("stale ref handle {}", handle)))
    }

    pub fn get_mut(&mut self, handle: RefHandle) -> Result<&mut dyn AbstractRef> {
        match self.slots.get_mut(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation => match slot.value.as_mut() {
                Some(value) => Ok(value.as_mut()),
                None => Err(InterpreterError::invariant(format!("stale ref handle {}", handle))),
            },
            _ => Err(InterpreterError::invariant(format!("stale ref handle {}", handle))),
        }
    }

    /// Downcast a ref to its concrete type.
    pub fn get_as<T: AbstractRef>(&self, handle: RefHandle) -> Result<&T> {
        self.get(handle)?
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| InterpreterError::invariant(format!("ref {} has unexpected type", handle)))
    }

    pub fn get_as_mut<T: AbstractRef>(&mut self, handle: RefHandle) -> Result<&mut T> {
        self.get_mut(handle)?
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| InterpreterError::invariant(format!("ref {} has unexpected type", handle)))
    }

    /// Content equality for heap cells; falls back to identity for other cells.
    pub fn content_equals(&self, lhs: &DataCell, rhs: &DataCell) -> Result<bool> {
        match (lhs, rhs) {
            (DataCell::String(a), DataCell::String(b))
            | (DataCell::Url(a), DataCell::Url(b))
            | (DataCell::Bytes(a), DataCell::Bytes(b))
            | (DataCell::Ref(a), DataCell::Ref(b))
            | (DataCell::Rest(a), DataCell::Rest(b))
            | (DataCell::Status(a), DataCell::Status(b)) => {
                if a == b {
                    return Ok(true);
                }
                Ok(self.get(*a)?.equals(self.get(*b)?))
            }
            _ => Ok(lhs == rhs),
        }
    }

    pub fn clear_reachable(&mut self) {
        for value in self.slots.iter_mut().filter_map(|s| s.value.as_mut()) {
            value.set_reachable(false);
        }
    }

    /// Mark a ref; returns true when the ref was not already marked.
    pub fn set_reachable(&mut self, handle: RefHandle) -> bool {
        match self.get_mut(handle) {
            Ok(value) if !value.is_reachable() => {
                value.set_reachable(true);
                true
            }
            _ => false,
        }
    }

    pub fn is_reachable(&self, handle: RefHandle) -> bool {
        self.get(handle).map(|r| r.is_reachable()).unwrap_or(false)
    }

    /// Cells held by a ref.
    pub fn children(&self, handle: RefHandle) -> Vec<DataCell> {
        let mut cells = Vec::new();
        if let Ok(value) = self.get(handle) {
            value.visit_children(&mut |cell| cells.push(cell));
        }
        cells
    }

    /// Finalize and free every unmarked ref. Returns the number freed.
    pub fn delete_unreachable(&mut self) -> usize {
        let mut deleted = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let unreachable = matches!(&slot.value, Some(value) if !value.is_reachable());
            if !unreachable {
                continue;
            }
            if let Some(mut value) = slot.value.take() {
                value.finalize();
            }
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
            deleted += 1;
        }
        self.live -= deleted;
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut heap = AbstractHeap::new();
        let h = heap.insert(Box::new(StringRef::new("hello")));
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.get(h).unwrap().utf8_value(), Some("hello"));
        assert_eq!(heap.get_as::<StringRef>(h).unwrap().value(), "hello");
        assert!(heap.get_as::<BytesRef>(h).is_err());
    }

    #[test]
    fn test_stale_handle_is_detected() {
        let mut heap = AbstractHeap::new();
        let h = heap.insert(Box::new(StringRef::new("gone")));
        heap.clear_reachable();
        assert_eq!(heap.delete_unreachable(), 1);
        assert!(!heap.contains(h));
        assert!(heap.get(h).is_err());

        // the slot is reused under a new generation
        let h2 = heap.insert(Box::new(StringRef::new("new")));
        assert_eq!(h2.index(), h.index());
        assert_ne!(h2.generation(), h.generation());
        assert!(heap.get(h).is_err());
        assert!(heap.get(h2).is_ok());
    }

    #[test]
    fn test_content_equality() {
        let mut heap = AbstractHeap::new();
        let a = DataCell::String(heap.insert(Box::new(StringRef::new("x"))));
        let b = DataCell::String(heap.insert(Box::new(StringRef::new("x"))));
        let c = DataCell::String(heap.insert(Box::new(StringRef::new("y"))));
        assert_ne!(a, b);
        assert!(heap.content_equals(&a, &b).unwrap());
        assert!(!heap.content_equals(&a, &c).unwrap());
    }

    #[test]
    fn test_marked_refs_survive() {
        let mut heap = AbstractHeap::new();
        let keep = heap.insert(Box::new(StringRef::new("keep")));
        let drop = heap.insert(Box::new(StringRef::new("drop")));
        heap.clear_reachable();
        assert!(heap.set_reachable(keep));
        assert!(!heap.set_reachable(keep));
        assert_eq!(heap.delete_unreachable(), 1);
        assert!(heap.contains(keep));
        assert!(!heap.contains(drop));
    }
}
