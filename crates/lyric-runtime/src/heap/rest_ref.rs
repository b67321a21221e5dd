//! Variadic argument refs.

use std::any::Any;

use crate::data_cell::DataCell;
use crate::heap::AbstractRef;

/// Snapshot of a frame's rest arguments, iterable from the front.
#[derive(Debug, Clone)]
pub struct RestRef {
    values: Vec<DataCell>,
    cursor: usize,
    reachable: bool,
}

impl RestRef {
    pub fn new(values: Vec<DataCell>) -> Self {
        Self { values, cursor: 0, reachable: false }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<DataCell> {
        self.values.get(index).copied()
    }
}

impl AbstractRef for RestRef {
    fn describe(&self) -> String {
        format!("<rest len={}>", self.values.len())
    }

    fn iterator_valid(&self) -> bool {
        self.cursor < self.values.len()
    }

    fn iterator_next(&mut self) -> Option<DataCell> {
        let value = self.values.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(value)
    }

    fn is_reachable(&self) -> bool {
        self.reachable
    }

    fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }

    fn visit_children(&self, visit: &mut dyn FnMut(DataCell)) {
        for value in &self.values {
            visit(*value);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration() {
        let mut rest = RestRef::new(vec![DataCell::I64(1), DataCell::I64(2)]);
        assert!(rest.iterator_valid());
        assert_eq!(rest.iterator_next(), Some(DataCell::I64(1)));
        assert_eq!(rest.iterator_next(), Some(DataCell::I64(2)));
        assert!(!rest.iterator_valid());
        assert_eq!(rest.iterator_next(), None);
    }
}
