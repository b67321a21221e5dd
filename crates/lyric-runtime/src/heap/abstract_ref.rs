//! The contract every heap value implements.

use std::any::Any;
use std::sync::Arc;

use crate::data_cell::DataCell;
use crate::virtual_table::VirtualTable;

/// A value owned by the heap. Plugins may implement this for their own
/// native objects; the heap owns them like any builtin ref.
pub trait AbstractRef: Any {
    fn describe(&self) -> String;

    /// Dispatch table for `Ref` cells.
    fn virtual_table(&self) -> Option<&Arc<VirtualTable>> {
        None
    }

    fn get_field(&self, _field: &DataCell) -> Option<DataCell> {
        None
    }

    /// Store a field value, returning the previous one.
    fn set_field(&mut self, _field: &DataCell, _value: DataCell) -> Option<DataCell> {
        None
    }

    /// Content equality against another ref.
    fn equals(&self, _other: &dyn AbstractRef) -> bool {
        false
    }

    fn hash_value(&self) -> Option<u64> {
        None
    }

    /// Size in bytes of the raw payload.
    fn raw_size(&self) -> usize {
        0
    }

    /// Copy raw payload bytes starting at `offset`; returns bytes copied.
    fn raw_copy(&self, _offset: usize, _dst: &mut [u8]) -> usize {
        0
    }

    fn utf8_value(&self) -> Option<&str> {
        None
    }

    fn uri_value(&self) -> Option<&str> {
        None
    }

    fn bytes_value(&self) -> Option<&[u8]> {
        None
    }

    fn iterator_valid(&self) -> bool {
        false
    }

    fn iterator_next(&mut self) -> Option<DataCell> {
        None
    }

    fn is_reachable(&self) -> bool;

    fn set_reachable(&mut self, reachable: bool);

    /// Report every cell this ref holds.
    fn visit_children(&self, _visit: &mut dyn FnMut(DataCell)) {}

    /// Called once, right before the heap frees the ref.
    fn finalize(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
