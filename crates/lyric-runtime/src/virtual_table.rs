//! Dispatch tables for classes, structs, instances, enums, existentials and concepts.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use lyric_common::SymbolUrl;

use crate::data_cell::DataCell;
use crate::plugin::NativeFunc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Class,
    Struct,
    Instance,
    Enum,
    Existential,
    Concept,
}

impl TableKind {
    /// Capabilities implied by the kind of symbol the table describes.
    pub fn default_capabilities(self) -> u8 {
        match self {
            TableKind::Class | TableKind::Struct | TableKind::Instance | TableKind::Enum => {
                VirtualTable::HAS_MEMBERS | VirtualTable::HAS_CTOR
            }
            TableKind::Existential | TableKind::Concept => 0,
        }
    }
}

/// Field slot of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualMember {
    pub segment: u32,
    pub index: u32,
    pub layout_offset: u32,
}

/// A resolved method: the call descriptor plus where its proc lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualMethod {
    pub call: DataCell,
    pub segment: u32,
    pub call_index: u32,
    pub proc_offset: u32,
    pub returns_value: bool,
}

/// Action to method bindings of one concept impl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImplTable {
    pub concept: DataCell,
    pub extensions: HashMap<DataCell, VirtualMethod>,
}

impl ImplTable {
    pub fn get_extension(&self, action: &DataCell) -> Option<&VirtualMethod> {
        self.extensions.get(action)
    }
}

pub struct VirtualTable {
    kind: TableKind,
    capabilities: u8,
    segment: u32,
    descriptor: DataCell,
    type_cell: DataCell,
    symbol_url: SymbolUrl,
    parent: Option<Arc<VirtualTable>>,
    layout_base: u32,
    members: HashMap<DataCell, VirtualMember>,
    methods: HashMap<DataCell, VirtualMethod>,
    impls: HashMap<DataCell, ImplTable>,
    ctor: Option<VirtualMethod>,
    allocator: Option<NativeFunc>,
}

impl VirtualTable {
    pub const HAS_MEMBERS: u8 = 0x01;
    pub const HAS_CTOR: u8 = 0x02;
    pub const HAS_ALLOCATOR: u8 = 0x04;
    pub const SEALED: u8 = 0x08;

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: TableKind,
        segment: u32,
        descriptor: DataCell,
        type_cell: DataCell,
        symbol_url: SymbolUrl,
        parent: Option<Arc<VirtualTable>>,
        members: HashMap<DataCell, VirtualMember>,
        methods: HashMap<DataCell, VirtualMethod>,
        impls: HashMap<DataCell, ImplTable>,
    ) -> Self {
        let layout_base = parent.as_ref().map(|p| p.layout_total()).unwrap_or(0);
        Self {
            kind,
            capabilities: kind.default_capabilities(),
            segment,
            descriptor,
            type_cell,
            symbol_url,
            parent,
            layout_base,
            members,
            methods,
            impls,
            ctor: None,
            allocator: None,
        }
    }

    pub fn with_ctor(mut self, ctor: Option<VirtualMethod>) -> Self {
        self.ctor = ctor;
        self
    }

    pub fn with_allocator(mut self, allocator: Option<NativeFunc>) -> Self {
        if allocator.is_some() {
            self.capabilities |= Self::HAS_ALLOCATOR;
        } else {
            self.capabilities &= !Self::HAS_ALLOCATOR;
        }
        self.allocator = allocator;
        self
    }

    pub fn with_sealed(mut self, sealed: bool) -> Self {
        if sealed {
            self.capabilities |= Self::SEALED;
        }
        self
    }

    #[inline]
    pub fn kind(&self) -> TableKind {
        self.kind
    }

    #[inline]
    pub fn has_capability(&self, capability: u8) -> bool {
        self.capabilities & capability != 0
    }

    #[inline]
    pub fn segment(&self) -> u32 {
        self.segment
    }

    #[inline]
    pub fn descriptor(&self) -> DataCell {
        self.descriptor
    }

    #[inline]
    pub fn type_cell(&self) -> DataCell {
        self.type_cell
    }

    #[inline]
    pub fn symbol_url(&self) -> &SymbolUrl {
        &self.symbol_url
    }

    #[inline]
    pub fn parent(&self) -> Option<&Arc<VirtualTable>> {
        self.parent.as_ref()
    }

    #[inline]
    pub fn layout_base(&self) -> u32 {
        self.layout_base
    }

    /// Number of field slots for an instance, inherited slots included.
    #[inline]
    pub fn layout_total(&self) -> u32 {
        self.layout_base + self.members.len() as u32
    }

    #[inline]
    pub fn ctor(&self) -> Option<&VirtualMethod> {
        self.ctor.as_ref()
    }

    #[inline]
    pub fn allocator(&self) -> Option<NativeFunc> {
        self.allocator
    }

    /// Iterate this table and its ancestors, nearest first.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    pub fn get_member(&self, field: &DataCell) -> Option<&VirtualMember> {
        self.ancestors().find_map(|t| t.members.get(field))
    }

    pub fn get_method(&self, call: &DataCell) -> Option<&VirtualMethod> {
        self.ancestors().find_map(|t| t.methods.get(call))
    }

    pub fn get_impl(&self, concept: &DataCell) -> Option<&ImplTable> {
        self.ancestors().find_map(|t| t.impls.get(concept))
    }

    /// Method implementing `action` for `concept`.
    pub fn get_extension(&self, concept: &DataCell, action: &DataCell) -> Option<&VirtualMethod> {
        self.ancestors()
            .filter_map(|t| t.impls.get(concept))
            .find_map(|i| i.get_extension(action))
    }

    /// Nearest table in the chain that carries an allocator.
    pub fn find_allocator(&self) -> Option<(&VirtualTable, NativeFunc)> {
        self.ancestors().find_map(|t| t.allocator.map(|a| (t, a)))
    }

    pub fn is_same_or_descendant_of(&self, descriptor: &DataCell) -> bool {
        self.ancestors().any(|t| &t.descriptor == descriptor)
    }
}

impl fmt::Debug for VirtualTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualTable")
            .field("kind", &self.kind)
            .field("descriptor", &self.descriptor)
            .field("symbol_url", &self.symbol_url.to_string())
            .field("parent", &self.parent.as_ref().map(|p| p.descriptor))
            .field("layout_total", &self.layout_total())
            .field("has_allocator", &self.allocator.is_some())
            .finish()
    }
}

pub struct Ancestors<'a> {
    next: Option<&'a VirtualTable>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a VirtualTable;

    fn next(&mut self) -> Option<Self::Item> {
        let curr = self.next?;
        self.next = curr.parent.as_deref();
        Some(curr)
    }
}
