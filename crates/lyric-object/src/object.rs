//! The in-memory form of one assembled module.

use std::sync::Arc;

use lyric_common::SymbolPath;

use crate::descriptors::*;

pub const MAGIC: [u8; 4] = *b"LYRO";

pub const VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct LyricObject {
    /// Specifier of the native plugin backing this module's traps.
    pub plugin: Option<String>,
    pub types: Vec<TypeDescriptor>,
    pub literals: Vec<LiteralDescriptor>,
    pub calls: Vec<CallDescriptor>,
    pub fields: Vec<FieldDescriptor>,
    pub statics: Vec<StaticDescriptor>,
    pub actions: Vec<ActionDescriptor>,
    pub classes: Vec<ShapeDescriptor>,
    pub structs: Vec<ShapeDescriptor>,
    pub instances: Vec<ShapeDescriptor>,
    pub enums: Vec<ShapeDescriptor>,
    pub concepts: Vec<ConceptDescriptor>,
    pub existentials: Vec<ExistentialDescriptor>,
    pub impls: Vec<ImplDescriptor>,
    pub namespaces: Vec<NamespaceDescriptor>,
    pub links: Vec<LinkDescriptor>,
    pub imports: Vec<ImportDescriptor>,
    pub symbols: Vec<SymbolDescriptor>,
    pub bytecode: Arc<[u8]>,
}

impl LyricObject {
    pub fn new() -> Self {
        Self {
            plugin: None,
            types: Vec::new(),
            literals: Vec::new(),
            calls: Vec::new(),
            fields: Vec::new(),
            statics: Vec::new(),
            actions: Vec::new(),
            classes: Vec::new(),
            structs: Vec::new(),
            instances: Vec::new(),
            enums: Vec::new(),
            concepts: Vec::new(),
            existentials: Vec::new(),
            impls: Vec::new(),
            namespaces: Vec::new(),
            links: Vec::new(),
            imports: Vec::new(),
            symbols: Vec::new(),
            bytecode: Arc::from(Vec::new()),
        }
    }

    pub fn get_type(&self, index: u32) -> Option<&TypeDescriptor> {
        self.types.get(index as usize)
    }

    pub fn get_literal(&self, index: u32) -> Option<&LiteralDescriptor> {
        self.literals.get(index as usize)
    }

    pub fn get_call(&self, index: u32) -> Option<&CallDescriptor> {
        self.calls.get(index as usize)
    }

    pub fn get_field(&self, index: u32) -> Option<&FieldDescriptor> {
        self.fields.get(index as usize)
    }

    pub fn get_static(&self, index: u32) -> Option<&StaticDescriptor> {
        self.statics.get(index as usize)
    }

    pub fn get_action(&self, index: u32) -> Option<&ActionDescriptor> {
        self.actions.get(index as usize)
    }

    pub fn get_concept(&self, index: u32) -> Option<&ConceptDescriptor> {
        self.concepts.get(index as usize)
    }

    pub fn get_existential(&self, index: u32) -> Option<&ExistentialDescriptor> {
        self.existentials.get(index as usize)
    }

    pub fn get_impl(&self, index: u32) -> Option<&ImplDescriptor> {
        self.impls.get(index as usize)
    }

    pub fn get_link(&self, index: u32) -> Option<&LinkDescriptor> {
        self.links.get(index as usize)
    }

    /// Class, struct, instance or enum descriptor.
    pub fn get_shape(&self, section: LinkageSection, index: u32) -> Option<&ShapeDescriptor> {
        let table = match section {
            LinkageSection::Class => &self.classes,
            LinkageSection::Struct => &self.structs,
            LinkageSection::Instance => &self.instances,
            LinkageSection::Enum => &self.enums,
            _ => return None,
        };
        table.get(index as usize)
    }

    /// Number of descriptors in a section.
    pub fn section_size(&self, section: LinkageSection) -> usize {
        match section {
            LinkageSection::Invalid => 0,
            LinkageSection::Type => self.types.len(),
            LinkageSection::Existential => self.existentials.len(),
            LinkageSection::Literal => self.literals.len(),
            LinkageSection::Call => self.calls.len(),
            LinkageSection::Field => self.fields.len(),
            LinkageSection::Static => self.statics.len(),
            LinkageSection::Action => self.actions.len(),
            LinkageSection::Class => self.classes.len(),
            LinkageSection::Struct => self.structs.len(),
            LinkageSection::Instance => self.instances.len(),
            LinkageSection::Concept => self.concepts.len(),
            LinkageSection::Enum => self.enums.len(),
            LinkageSection::Namespace => self.namespaces.len(),
        }
    }

    pub fn find_symbol(&self, path: &SymbolPath) -> Option<&SymbolDescriptor> {
        self.symbols.iter().find(|s| &s.path == path)
    }
}

impl Default for LyricObject {
    fn default() -> Self {
        Self::new()
    }
}
