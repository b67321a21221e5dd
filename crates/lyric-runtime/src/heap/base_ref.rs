//! Instances of classes, structs, instances and enums.

use std::any::Any;
use std::sync::Arc;

use crate::data_cell::DataCell;
use crate::heap::AbstractRef;
use crate::virtual_table::VirtualTable;

/// A ref with one field slot per member of its table, inherited members
/// first. Allocator traps for plain shapes create these.
#[derive(Debug, Clone)]
pub struct BaseRef {
    vtable: Arc<VirtualTable>,
    fields: Vec<DataCell>,
    reachable: bool,
}

impl BaseRef {
    pub fn new(vtable: Arc<VirtualTable>) -> Self {
        let fields = vec![DataCell::Invalid; vtable.layout_total() as usize];
        Self { vtable, fields, reachable: false }
    }

    #[inline]
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Field value by layout offset.
    pub fn field_at(&self, offset: u32) -> Option<DataCell> {
        self.fields.get(offset as usize).copied()
    }

    fn layout_offset(&self, field: &DataCell) -> Option<usize> {
        self.vtable.get_member(field).map(|m| m.layout_offset as usize)
    }
}

impl AbstractRef for BaseRef {
    fn describe(&self) -> String {
        format!("<{} fields={}>", self.vtable.symbol_url(), self.fields.len())
    }

    fn virtual_table(&self) -> Option<&Arc<VirtualTable>> {
        Some(&self.vtable)
    }

    fn get_field(&self, field: &DataCell) -> Option<DataCell> {
        let offset = self.layout_offset(field)?;
        self.fields.get(offset).copied()
    }

    fn set_field(&mut self, field: &DataCell, value: DataCell) -> Option<DataCell> {
        let offset = self.layout_offset(field)?;
        let slot = self.fields.get_mut(offset)?;
        Some(std::mem::replace(slot, value))
    }

    fn is_reachable(&self) -> bool {
        self.reachable
    }

    fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }

    fn visit_children(&self, visit: &mut dyn FnMut(DataCell)) {
        for field in &self.fields {
            visit(*field);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
