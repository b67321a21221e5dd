//! Builders for bytecode, procs and whole objects.

use lyric_common::{SymbolPath, SymbolUrl};

use crate::address::{link_address, INVALID_ADDRESS_U32};
use crate::descriptors::*;
use crate::error::{ObjectError, Result};
use crate::object::LyricObject;
use crate::opcode::{OpInfoType, Opcode};
use crate::proc::LexicalEntry;

/// A position in the code that jumps can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(u32);

/// The operand of an emitted jump waiting for its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpPatch(u32);

#[derive(Debug, Clone, Default)]
pub struct BytecodeBuilder {
    code: Vec<u8>,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn emit(&mut self, opcode: Opcode) -> &mut Self {
        debug_assert_eq!(opcode.info_type(), OpInfoType::NoOperands);
        self.code.push(opcode as u8);
        self
    }

    pub fn emit_i64(&mut self, v: i64) -> &mut Self {
        self.code.push(Opcode::I64 as u8);
        self.code.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn emit_dbl(&mut self, v: f64) -> &mut Self {
        self.code.push(Opcode::Dbl as u8);
        self.code.extend_from_slice(&v.to_bits().to_be_bytes());
        self
    }

    pub fn emit_chr(&mut self, c: char) -> &mut Self {
        self.code.push(Opcode::Chr as u8);
        self.code.extend_from_slice(&(c as u32).to_be_bytes());
        self
    }

    pub fn emit_address(&mut self, opcode: Opcode, address: u32) -> &mut Self {
        debug_assert_eq!(opcode.info_type(), OpInfoType::AddressU32);
        self.code.push(opcode as u8);
        self.code.extend_from_slice(&address.to_be_bytes());
        self
    }

    pub fn emit_flags_address(&mut self, opcode: Opcode, flags: u8, address: u32) -> &mut Self {
        debug_assert_eq!(opcode.info_type(), OpInfoType::FlagsU8AddressU32);
        self.code.push(opcode as u8);
        self.code.push(flags);
        self.code.extend_from_slice(&address.to_be_bytes());
        self
    }

    pub fn emit_offset(&mut self, opcode: Opcode, offset: u16) -> &mut Self {
        debug_assert_eq!(opcode.info_type(), OpInfoType::OffsetU16);
        self.code.push(opcode as u8);
        self.code.extend_from_slice(&offset.to_be_bytes());
        self
    }

    /// Calls and `NEW`: flags, target address, number of arguments on the stack.
    pub fn emit_call(&mut self, opcode: Opcode, flags: u8, address: u32, placement: u16) -> &mut Self {
        debug_assert_eq!(opcode.info_type(), OpInfoType::FlagsU8AddressU32PlacementU16);
        self.code.push(opcode as u8);
        self.code.push(flags);
        self.code.extend_from_slice(&address.to_be_bytes());
        self.code.extend_from_slice(&placement.to_be_bytes());
        self
    }

    pub fn emit_type(&mut self, opcode: Opcode, tag: u8) -> &mut Self {
        debug_assert_eq!(opcode.info_type(), OpInfoType::TypeU8);
        self.code.push(opcode as u8);
        self.code.push(tag);
        self
    }

    pub fn make_label(&self) -> Label {
        Label(self.code.len() as u32)
    }

    /// Emit a branch whose target is filled in later by [`Self::patch`].
    pub fn emit_jump(&mut self, opcode: Opcode) -> JumpPatch {
        debug_assert_eq!(opcode.info_type(), OpInfoType::JumpI16);
        self.code.push(opcode as u8);
        let patch = JumpPatch(self.code.len() as u32);
        self.code.extend_from_slice(&0i16.to_be_bytes());
        patch
    }

    /// Emit a branch to an already placed label.
    pub fn emit_jump_to(&mut self, opcode: Opcode, label: Label) -> Result<&mut Self> {
        let patch = self.emit_jump(opcode);
        self.patch(patch, label)?;
        Ok(self)
    }

    pub fn patch(&mut self, patch: JumpPatch, label: Label) -> Result<()> {
        let delta = label.0 as i64 - (patch.0 as i64 + 2);
        let delta = i16::try_from(delta)
            .map_err(|_| ObjectError::InvalidProc { offset: patch.0, reason: "jump out of range" })?;
        let at = patch.0 as usize;
        self.code[at..at + 2].copy_from_slice(&delta.to_be_bytes());
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.code
    }
}

/// One proc: header counts, lexical captures and the code.
#[derive(Debug, Clone, Default)]
pub struct ProcBuilder {
    pub num_arguments: u16,
    pub num_locals: u16,
    pub lexicals: Vec<LexicalEntry>,
    pub code: BytecodeBuilder,
}

impl ProcBuilder {
    pub fn new(num_arguments: u16, num_locals: u16) -> Self {
        Self { num_arguments, num_locals, ..Default::default() }
    }

    pub fn add_lexical(&mut self, activation_call: u32, target_offset: u32, target: u8) -> u32 {
        self.lexicals.push(LexicalEntry { activation_call, target_offset, target });
        self.lexicals.len() as u32 - 1
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let code = &self.code.code;
        let proc_size = 6 + 9 * self.lexicals.len() + code.len();
        let mut out = Vec::with_capacity(4 + proc_size);
        out.extend_from_slice(&(proc_size as u32).to_be_bytes());
        out.extend_from_slice(&self.num_arguments.to_be_bytes());
        out.extend_from_slice(&self.num_locals.to_be_bytes());
        out.extend_from_slice(&(self.lexicals.len() as u16).to_be_bytes());
        for lexical in &self.lexicals {
            out.extend_from_slice(&lexical.activation_call.to_be_bytes());
            out.extend_from_slice(&lexical.target_offset.to_be_bytes());
            out.push(lexical.target);
        }
        out.extend_from_slice(code);
        out
    }
}

/// Incrementally assembles a [`LyricObject`]. Every `add_*` returns the near
/// address of the new descriptor; `add_link` returns a far address.
#[derive(Debug, Default)]
pub struct ObjectBuilder {
    object: LyricObject,
    bytecode: Vec<u8>,
}

impl ObjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_plugin(&mut self, specifier: &str) -> &mut Self {
        self.object.plugin = Some(specifier.to_string());
        self
    }

    fn add_symbol(&mut self, path: &SymbolPath, section: LinkageSection, index: u32) {
        self.object.symbols.push(SymbolDescriptor { path: path.clone(), section, index });
    }

    pub fn add_type(&mut self, section: LinkageSection, address: u32, super_type: u32) -> u32 {
        self.object.types.push(TypeDescriptor { section, address, super_type });
        self.object.types.len() as u32 - 1
    }

    pub fn add_literal(&mut self, literal: LiteralDescriptor) -> u32 {
        self.object.literals.push(literal);
        self.object.literals.len() as u32 - 1
    }

    /// Append the proc to the bytecode and declare a call pointing at it.
    pub fn add_call(&mut self, path: &str, mode: CallMode, proc: &ProcBuilder, returns_value: bool) -> Result<u32> {
        self.add_bound_call(path, mode, INVALID_ADDRESS_U32, proc, returns_value)
    }

    pub fn add_bound_call(
        &mut self,
        path: &str,
        mode: CallMode,
        receiver: u32,
        proc: &ProcBuilder,
        returns_value: bool,
    ) -> Result<u32> {
        let path = SymbolPath::parse(path)?;
        let proc_offset = self.bytecode.len() as u32;
        self.bytecode.extend_from_slice(&proc.to_bytes());
        self.object.calls.push(CallDescriptor { path: path.clone(), mode, proc_offset, receiver, returns_value });
        let index = self.object.calls.len() as u32 - 1;
        self.add_symbol(&path, LinkageSection::Call, index);
        Ok(index)
    }

    pub fn add_field(&mut self, path: &str) -> Result<u32> {
        let path = SymbolPath::parse(path)?;
        self.object.fields.push(FieldDescriptor { path: path.clone(), field_type: INVALID_ADDRESS_U32 });
        let index = self.object.fields.len() as u32 - 1;
        self.add_symbol(&path, LinkageSection::Field, index);
        Ok(index)
    }

    pub fn add_static(&mut self, path: &str, initializer: u32) -> Result<u32> {
        let path = SymbolPath::parse(path)?;
        self.object.statics.push(StaticDescriptor { path: path.clone(), static_type: INVALID_ADDRESS_U32, initializer });
        let index = self.object.statics.len() as u32 - 1;
        self.add_symbol(&path, LinkageSection::Static, index);
        Ok(index)
    }

    pub fn add_action(&mut self, path: &str, concept: u32) -> Result<u32> {
        let path = SymbolPath::parse(path)?;
        self.object.actions.push(ActionDescriptor { path: path.clone(), receiver: concept });
        let index = self.object.actions.len() as u32 - 1;
        self.add_symbol(&path, LinkageSection::Action, index);
        Ok(index)
    }

    /// Add a class, struct, instance or enum. A type descriptor is created
    /// for the shape when it has none.
    pub fn add_shape(&mut self, section: LinkageSection, mut shape: ShapeDescriptor) -> u32 {
        let table_len = self.object.section_size(section) as u32;
        if shape.shape_type == INVALID_ADDRESS_U32 {
            let super_type = self.super_type_of(section, shape.super_shape);
            shape.shape_type = self.add_type(section, table_len, super_type);
        }
        let path = shape.path.clone();
        match section {
            LinkageSection::Class => self.object.classes.push(shape),
            LinkageSection::Struct => self.object.structs.push(shape),
            LinkageSection::Instance => self.object.instances.push(shape),
            LinkageSection::Enum => self.object.enums.push(shape),
            _ => return INVALID_ADDRESS_U32,
        }
        self.add_symbol(&path, section, table_len);
        table_len
    }

    fn super_type_of(&self, section: LinkageSection, super_shape: u32) -> u32 {
        if super_shape == INVALID_ADDRESS_U32 || crate::address::is_far(super_shape) {
            return INVALID_ADDRESS_U32;
        }
        self.object
            .get_shape(section, super_shape)
            .map(|s| s.shape_type)
            .unwrap_or(INVALID_ADDRESS_U32)
    }

    pub fn shape_mut(&mut self, section: LinkageSection, index: u32) -> Option<&mut ShapeDescriptor> {
        let table = match section {
            LinkageSection::Class => &mut self.object.classes,
            LinkageSection::Struct => &mut self.object.structs,
            LinkageSection::Instance => &mut self.object.instances,
            LinkageSection::Enum => &mut self.object.enums,
            _ => return None,
        };
        table.get_mut(index as usize)
    }

    pub fn add_concept(&mut self, mut concept: ConceptDescriptor) -> u32 {
        let index = self.object.concepts.len() as u32;
        if concept.concept_type == INVALID_ADDRESS_U32 {
            concept.concept_type = self.add_type(LinkageSection::Concept, index, INVALID_ADDRESS_U32);
        }
        let path = concept.path.clone();
        self.object.concepts.push(concept);
        self.add_symbol(&path, LinkageSection::Concept, index);
        index
    }

    pub fn add_existential(&mut self, mut existential: ExistentialDescriptor) -> u32 {
        let index = self.object.existentials.len() as u32;
        if existential.existential_type == INVALID_ADDRESS_U32 {
            let super_type = if crate::address::is_near(existential.super_existential) {
                self.object
                    .get_existential(existential.super_existential)
                    .map(|e| e.existential_type)
                    .unwrap_or(INVALID_ADDRESS_U32)
            } else {
                INVALID_ADDRESS_U32
            };
            existential.existential_type = self.add_type(LinkageSection::Existential, index, super_type);
        }
        let path = existential.path.clone();
        self.object.existentials.push(existential);
        self.add_symbol(&path, LinkageSection::Existential, index);
        index
    }

    pub fn add_impl(&mut self, concept: u32, extensions: Vec<ExtensionDescriptor>) -> u32 {
        self.object.impls.push(ImplDescriptor { concept, extensions });
        self.object.impls.len() as u32 - 1
    }

    pub fn add_namespace(&mut self, path: &str) -> Result<u32> {
        let path = SymbolPath::parse(path)?;
        self.object.namespaces.push(NamespaceDescriptor { path: path.clone() });
        let index = self.object.namespaces.len() as u32 - 1;
        self.add_symbol(&path, LinkageSection::Namespace, index);
        Ok(index)
    }

    /// Declare a reference to a symbol in another module; returns its far address.
    pub fn add_link(&mut self, linkage: LinkageSection, url: &str) -> Result<u32> {
        let url = SymbolUrl::parse(url)?;
        self.object.links.push(LinkDescriptor { linkage, url });
        Ok(link_address(self.object.links.len() as u32 - 1))
    }

    pub fn add_import(&mut self, location: &str, flags: u8) -> Result<()> {
        let location = lyric_common::ModuleLocation::parse(location)?;
        self.object.imports.push(ImportDescriptor { location, flags });
        Ok(())
    }

    pub fn build(mut self) -> LyricObject {
        self.object.bytecode = self.bytecode.into();
        self.object
    }
}
