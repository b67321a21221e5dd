//! Builds virtual tables from descriptors.

use std::sync::Arc;

use hashbrown::HashMap;
use lyric_object::{CallMode, ExtensionDescriptor, LinkageSection, INVALID_ADDRESS_U32};

use crate::data_cell::DataCell;
use crate::error::{InterpreterError, Result};
use crate::segment_manager::SegmentManager;
use crate::virtual_table::{ImplTable, TableKind, VirtualMember, VirtualMethod, VirtualTable};

/// Descriptor fields shared by every table kind.
struct TableSource {
    type_address: u32,
    super_address: u32,
    members: Vec<u32>,
    methods: Vec<u32>,
    impls: Vec<u32>,
    ctor: u32,
    allocator_trap: u32,
    sealed: bool,
}

fn table_kind(descriptor: &DataCell) -> Option<TableKind> {
    Some(match descriptor {
        DataCell::Class(_) => TableKind::Class,
        DataCell::Struct(_) => TableKind::Struct,
        DataCell::Instance(_) => TableKind::Instance,
        DataCell::Enum(_) => TableKind::Enum,
        DataCell::Existential(_) => TableKind::Existential,
        DataCell::Concept(_) => TableKind::Concept,
        _ => return None,
    })
}

impl SegmentManager {
    pub fn resolve_class_virtual_table(&mut self, descriptor: &DataCell) -> Result<Arc<VirtualTable>> {
        self.resolve_table_of_kind(descriptor, TableKind::Class)
    }

    pub fn resolve_struct_virtual_table(&mut self, descriptor: &DataCell) -> Result<Arc<VirtualTable>> {
        self.resolve_table_of_kind(descriptor, TableKind::Struct)
    }

    pub fn resolve_instance_virtual_table(&mut self, descriptor: &DataCell) -> Result<Arc<VirtualTable>> {
        self.resolve_table_of_kind(descriptor, TableKind::Instance)
    }

    pub fn resolve_enum_virtual_table(&mut self, descriptor: &DataCell) -> Result<Arc<VirtualTable>> {
        self.resolve_table_of_kind(descriptor, TableKind::Enum)
    }

    pub fn resolve_existential_table(&mut self, descriptor: &DataCell) -> Result<Arc<VirtualTable>> {
        self.resolve_table_of_kind(descriptor, TableKind::Existential)
    }

    pub fn resolve_concept_table(&mut self, descriptor: &DataCell) -> Result<Arc<VirtualTable>> {
        self.resolve_table_of_kind(descriptor, TableKind::Concept)
    }

    /// Table for any class, struct, instance, enum, existential or concept
    /// descriptor.
    pub fn resolve_virtual_table(&mut self, descriptor: &DataCell) -> Result<Arc<VirtualTable>> {
        self.build_table(descriptor, 0)
    }

    fn resolve_table_of_kind(&mut self, descriptor: &DataCell, kind: TableKind) -> Result<Arc<VirtualTable>> {
        if table_kind(descriptor) != Some(kind) {
            return Err(InterpreterError::invariant(format!("invalid {:?} descriptor {}", kind, descriptor)));
        }
        self.build_table(descriptor, 0)
    }

    fn build_table(&mut self, descriptor: &DataCell, depth: usize) -> Result<Arc<VirtualTable>> {
        if let Some(table) = self.tables.get(descriptor) {
            return Ok(table.clone());
        }
        if depth > self.max_table_depth {
            return Err(InterpreterError::invariant(format!(
                "table depth exceeded {} resolving {}",
                self.max_table_depth, descriptor
            )));
        }
        let kind = table_kind(descriptor)
            .ok_or_else(|| InterpreterError::invariant(format!("{} has no virtual table", descriptor)))?;
        let Some(d) = descriptor.descriptor() else {
            return Err(InterpreterError::invariant("invalid table descriptor"));
        };
        let section = descriptor.section().unwrap_or(LinkageSection::Invalid);
        let segment = d.segment;
        let source = self.table_source(kind, section, segment, d.index)?;

        let parent = if source.super_address != INVALID_ADDRESS_U32 {
            let super_cell = self.resolve_descriptor(segment, section, source.super_address)?;
            Some(self.build_table(&super_cell, depth + 1)?)
        } else {
            None
        };
        let layout_base = parent.as_ref().map(|p| p.layout_total()).unwrap_or(0);

        let type_cell = if source.type_address != INVALID_ADDRESS_U32 {
            self.resolve_descriptor(segment, LinkageSection::Type, source.type_address)?
        } else {
            DataCell::Invalid
        };

        let mut members = HashMap::new();
        for (i, address) in source.members.iter().enumerate() {
            let field = self.resolve_descriptor(segment, LinkageSection::Field, *address)?;
            let Some(fd) = field.descriptor() else { continue };
            members.insert(
                field,
                VirtualMember { segment: fd.segment, index: fd.index, layout_offset: layout_base + i as u32 },
            );
        }

        let mut methods = HashMap::new();
        for address in &source.methods {
            let call = self.resolve_descriptor(segment, LinkageSection::Call, *address)?;
            methods.insert(call, self.virtual_method(&call)?);
        }

        let mut impls = HashMap::new();
        for impl_index in &source.impls {
            let (concept_address, extensions) = {
                let object = self.segment(segment)?.object();
                let descriptor = object
                    .get_impl(*impl_index)
                    .ok_or_else(|| InterpreterError::invariant(format!("missing impl {}", impl_index)))?;
                (descriptor.concept, descriptor.extensions.clone())
            };
            let concept = self.resolve_descriptor(segment, LinkageSection::Concept, concept_address)?;
            let mut table = ImplTable { concept, extensions: HashMap::new() };
            for ExtensionDescriptor { action, call } in extensions {
                let action = self.resolve_descriptor(segment, LinkageSection::Action, action)?;
                let call = self.resolve_descriptor(segment, LinkageSection::Call, call)?;
                let method = self.virtual_method(&call)?;
                table.extensions.insert(action, method);
                methods.insert(call, method);
            }
            impls.insert(concept, table);
        }

        let ctor = if source.ctor != INVALID_ADDRESS_U32 {
            let call = self.resolve_descriptor(segment, LinkageSection::Call, source.ctor)?;
            let method = self.virtual_method(&call)?;
            let mode = self.call_mode(&call)?;
            if mode != CallMode::Constructor {
                return Err(InterpreterError::invariant(format!("invalid ctor flags for {}", descriptor)));
            }
            Some(method)
        } else {
            None
        };

        let allocator = if source.allocator_trap != INVALID_ADDRESS_U32 {
            let trap = self
                .get_trap(segment, source.allocator_trap)
                .ok_or_else(|| InterpreterError::invariant(format!("invalid allocator for {}", descriptor)))?;
            Some(trap)
        } else {
            None
        };

        let symbol_url = self
            .segment(segment)?
            .symbol_url(section, d.index)
            .ok_or_else(|| InterpreterError::invariant(format!("missing symbol for {}", descriptor)))?;

        let table = VirtualTable::new(kind, segment, *descriptor, type_cell, symbol_url, parent, members, methods, impls)
            .with_ctor(ctor)
            .with_allocator(allocator)
            .with_sealed(source.sealed);
        log::debug!("built {:?} table for {}", kind, table.symbol_url());

        let table = Arc::new(table);
        self.tables.insert(*descriptor, table.clone());
        Ok(table)
    }

    fn table_source(&self, kind: TableKind, section: LinkageSection, segment: u32, index: u32) -> Result<TableSource> {
        let object = self.segment(segment)?.object();
        let missing = || InterpreterError::invariant(format!("missing {:?} descriptor {}", kind, index));
        Ok(match kind {
            TableKind::Class | TableKind::Struct | TableKind::Instance | TableKind::Enum => {
                let shape = object.get_shape(section, index).ok_or_else(missing)?;
                TableSource {
                    type_address: shape.shape_type,
                    super_address: shape.super_shape,
                    members: shape.members.clone(),
                    methods: shape.methods.clone(),
                    impls: shape.impls.clone(),
                    ctor: shape.ctor,
                    allocator_trap: shape.allocator_trap,
                    sealed: shape.sealed,
                }
            }
            TableKind::Existential => {
                let existential = object.get_existential(index).ok_or_else(missing)?;
                TableSource {
                    type_address: existential.existential_type,
                    super_address: existential.super_existential,
                    members: Vec::new(),
                    methods: existential.methods.clone(),
                    impls: existential.impls.clone(),
                    ctor: INVALID_ADDRESS_U32,
                    allocator_trap: INVALID_ADDRESS_U32,
                    sealed: false,
                }
            }
            TableKind::Concept => {
                let concept = object.get_concept(index).ok_or_else(missing)?;
                TableSource {
                    type_address: concept.concept_type,
                    super_address: concept.super_concept,
                    members: Vec::new(),
                    methods: Vec::new(),
                    impls: concept.impls.clone(),
                    ctor: INVALID_ADDRESS_U32,
                    allocator_trap: INVALID_ADDRESS_U32,
                    sealed: false,
                }
            }
        })
    }

    /// Build the dispatch entry for a resolved call descriptor.
    pub fn virtual_method(&self, call: &DataCell) -> Result<VirtualMethod> {
        let Some(d) = call.descriptor().filter(|_| matches!(call, DataCell::Call(_))) else {
            return Err(InterpreterError::invariant(format!("invalid call descriptor {}", call)));
        };
        let descriptor = self
            .segment(d.segment)?
            .object()
            .get_call(d.index)
            .ok_or_else(|| InterpreterError::invariant(format!("missing call {}", call)))?;
        Ok(VirtualMethod {
            call: *call,
            segment: d.segment,
            call_index: d.index,
            proc_offset: descriptor.proc_offset,
            returns_value: descriptor.returns_value,
        })
    }

    fn call_mode(&self, call: &DataCell) -> Result<CallMode> {
        let d = call.descriptor().ok_or_else(|| InterpreterError::invariant("invalid call descriptor"))?;
        self.segment(d.segment)?
            .object()
            .get_call(d.index)
            .map(|c| c.mode)
            .ok_or_else(|| InterpreterError::invariant(format!("missing call {}", call)))
    }
}
