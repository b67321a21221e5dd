//! Segment cache, link resolution and the virtual table cache.

use std::sync::Arc;

use hashbrown::HashMap;
use lyric_common::ModuleLocation;
use lyric_object::{is_near, link_offset, LinkageSection, LiteralDescriptor, INVALID_ADDRESS_U32};

use crate::coroutine::StackfulCoroutine;
use crate::data_cell::DataCell;
use crate::error::{InterpreterCondition, InterpreterError, Result};
use crate::loader::AbstractLoader;
use crate::plugin::NativeFunc;
use crate::segment::{BytecodeSegment, LinkEntry};
use crate::virtual_table::VirtualTable;

pub const DEFAULT_MAX_TABLE_DEPTH: usize = 256;

/// Owns every loaded segment for the lifetime of an interpreter state.
///
/// Segments are appended and never removed, so a segment index embedded in a
/// descriptor cell stays valid. Resolved links and built tables are memoized.
pub struct SegmentManager {
    loader: Box<dyn AbstractLoader>,
    segments: Vec<BytecodeSegment>,
    segment_cache: HashMap<ModuleLocation, u32>,
    pub(crate) tables: HashMap<DataCell, Arc<VirtualTable>>,
    pub(crate) max_table_depth: usize,
}

impl SegmentManager {
    pub fn new(loader: Box<dyn AbstractLoader>) -> Self {
        Self::with_max_table_depth(loader, DEFAULT_MAX_TABLE_DEPTH)
    }

    pub fn with_max_table_depth(loader: Box<dyn AbstractLoader>, max_table_depth: usize) -> Self {
        Self {
            loader,
            segments: Vec::new(),
            segment_cache: HashMap::new(),
            tables: HashMap::new(),
            max_table_depth,
        }
    }

    #[inline]
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> impl Iterator<Item = &BytecodeSegment> {
        self.segments.iter()
    }

    #[inline]
    pub fn get_segment(&self, index: u32) -> Option<&BytecodeSegment> {
        self.segments.get(index as usize)
    }

    pub fn segment(&self, index: u32) -> Result<&BytecodeSegment> {
        self.segments
            .get(index as usize)
            .ok_or_else(|| InterpreterError::invariant(format!("missing segment {}", index)))
    }

    pub fn segment_mut(&mut self, index: u32) -> Result<&mut BytecodeSegment> {
        self.segments
            .get_mut(index as usize)
            .ok_or_else(|| InterpreterError::invariant(format!("missing segment {}", index)))
    }

    pub fn find_segment(&self, location: &ModuleLocation) -> Option<u32> {
        self.segment_cache.get(location).copied()
    }

    /// Number of tables built so far.
    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    /// Return the cached segment for `location`, loading it (and its plugin)
    /// on first use.
    pub fn get_or_load_segment(&mut self, location: &ModuleLocation) -> Result<u32> {
        if let Some(index) = self.segment_cache.get(location) {
            return Ok(*index);
        }
        let object = self.loader.load_module(location)?.ok_or_else(|| {
            InterpreterError::new(InterpreterCondition::MissingAssembly, location.to_string())
        })?;

        let index = self.segments.len() as u32;
        let specifier = object.plugin.clone();
        let mut segment = BytecodeSegment::new(index, location.clone(), object);

        if let Some(specifier) = specifier {
            match self.loader.load_plugin(location, &specifier)? {
                Some(mut plugin) => {
                    plugin.load(&segment)?;
                    segment.set_plugin(plugin);
                }
                None => log::warn!("no plugin {} found for {}", specifier, location),
            }
        }

        log::debug!("loaded segment {} from {}", index, location);
        self.segments.push(segment);
        self.segment_cache.insert(location.clone(), index);
        Ok(index)
    }

    /// Resolve the link at `link_index` in `segment`, loading the target
    /// module if needed. The result is memoized in the segment.
    pub fn resolve_link(&mut self, segment: u32, link_index: u32) -> Result<LinkEntry> {
        let entry = self
            .segment(segment)?
            .get_link(link_index)
            .ok_or_else(|| InterpreterError::invariant("missing linkage"))?;
        if entry.is_resolved() {
            return Ok(entry);
        }

        let (url, base) = {
            let sp = self.segment(segment)?;
            let link = sp
                .object()
                .get_link(link_index)
                .ok_or_else(|| InterpreterError::invariant("missing linkage"))?;
            (link.url.clone(), sp.location().clone())
        };
        let url = url.resolve(&base);
        log::trace!("resolving link {} to symbol {}", link_index, url);

        let location = url
            .location()
            .ok_or_else(|| InterpreterError::invariant("invalid link url"))?
            .clone();
        let target = self.get_or_load_segment(&location)?;
        let symbol = self
            .segment(target)?
            .object()
            .find_symbol(url.path())
            .ok_or_else(|| InterpreterError::new(InterpreterCondition::MissingSymbol, url.to_string()))?;

        let resolved = LinkEntry { linkage: symbol.section, segment: target, value: symbol.index };
        log::trace!("resolved {} to descriptor {} in segment {}", url, resolved.value, resolved.segment);
        if !self.segment_mut(segment)?.set_link(link_index, resolved) {
            return Err(InterpreterError::invariant("failed to set link"));
        }
        Ok(resolved)
    }

    /// Follow a near or far address to its segment and index, checking the
    /// linkage section of far addresses.
    pub fn resolve_address(&mut self, segment: u32, section: LinkageSection, address: u32) -> Result<(u32, u32)> {
        if address == INVALID_ADDRESS_U32 {
            return Err(InterpreterError::new(
                InterpreterCondition::InvalidOperandAddressV1,
                format!("invalid {:?} address", section),
            ));
        }
        if is_near(address) {
            return Ok((segment, address));
        }
        let link = self.resolve_link(segment, link_offset(address))?;
        if link.linkage != section {
            return Err(InterpreterError::invariant(format!(
                "invalid linkage for descriptor: expected {:?}, found {:?}",
                section, link.linkage
            )));
        }
        Ok((link.segment, link.value))
    }

    pub fn resolve_descriptor(&mut self, segment: u32, section: LinkageSection, address: u32) -> Result<DataCell> {
        let (target, index) = self.resolve_address(segment, section, address)?;
        if self.segment(target)?.object().section_size(section) <= index as usize {
            return Err(InterpreterError::invariant(format!("missing {:?} descriptor {}", section, index)));
        }
        DataCell::for_descriptor(section, target, index)
            .ok_or_else(|| InterpreterError::invariant("unknown descriptor type"))
    }

    pub fn resolve_literal(&mut self, segment: u32, address: u32) -> Result<LiteralDescriptor> {
        let (target, index) = self.resolve_address(segment, LinkageSection::Literal, address)?;
        self.segment(target)?
            .object()
            .get_literal(index)
            .cloned()
            .ok_or_else(|| InterpreterError::invariant("missing literal"))
    }

    /// Push a scalar literal of the coroutine's segment. String and bytes
    /// literals need the heap and are returned unpushed.
    pub fn push_literal_onto_stack(
        &mut self,
        coro: &mut StackfulCoroutine,
        address: u32,
    ) -> Result<Option<LiteralDescriptor>> {
        let value = match self.resolve_literal(coro.peek_sp(), address)? {
            LiteralDescriptor::Nil => DataCell::Nil,
            LiteralDescriptor::Undef => DataCell::Undef,
            LiteralDescriptor::Bool(b) => DataCell::Bool(b),
            LiteralDescriptor::I64(i) => DataCell::I64(i),
            LiteralDescriptor::Dbl(d) => DataCell::Dbl(d),
            LiteralDescriptor::Chr(c) => char::from_u32(c).map(DataCell::Chr).ok_or_else(|| {
                InterpreterError::new(
                    InterpreterCondition::InvalidOperandImmediateChrV1,
                    format!("invalid character literal {:#x}", c),
                )
            })?,
            literal @ (LiteralDescriptor::Utf8(_) | LiteralDescriptor::Bytes(_)) => return Ok(Some(literal)),
        };
        coro.push_data(value);
        Ok(None)
    }

    pub fn push_descriptor_onto_stack(
        &mut self,
        coro: &mut StackfulCoroutine,
        section: LinkageSection,
        address: u32,
    ) -> Result<()> {
        let descriptor = self.resolve_descriptor(coro.peek_sp(), section, address)?;
        coro.push_data(descriptor);
        Ok(())
    }

    pub fn get_trap(&self, segment: u32, index: u32) -> Option<NativeFunc> {
        self.get_segment(segment).and_then(|s| s.get_trap(index))
    }

    pub fn load_static(&mut self, segment: u32, address: u32) -> Result<DataCell> {
        let (target, index) = self.resolve_address(segment, LinkageSection::Static, address)?;
        self.segment(target)?
            .get_static(index)
            .ok_or_else(|| InterpreterError::invariant("missing static"))
    }

    pub fn store_static(&mut self, segment: u32, address: u32, value: DataCell) -> Result<()> {
        let (target, index) = self.resolve_address(segment, LinkageSection::Static, address)?;
        if !self.segment_mut(target)?.set_static(index, value) {
            return Err(InterpreterError::invariant("missing static"));
        }
        Ok(())
    }

    pub fn load_instance(&mut self, segment: u32, address: u32) -> Result<DataCell> {
        let (target, index) = self.resolve_address(segment, LinkageSection::Instance, address)?;
        self.segment(target)?
            .get_instance(index)
            .ok_or_else(|| InterpreterError::invariant("missing instance"))
    }

    pub fn store_instance(&mut self, segment: u32, address: u32, value: DataCell) -> Result<()> {
        let (target, index) = self.resolve_address(segment, LinkageSection::Instance, address)?;
        if !self.segment_mut(target)?.set_instance(index, value) {
            return Err(InterpreterError::invariant("missing instance"));
        }
        Ok(())
    }

    pub fn load_enum(&mut self, segment: u32, address: u32) -> Result<DataCell> {
        let (target, index) = self.resolve_address(segment, LinkageSection::Enum, address)?;
        self.segment(target)?
            .get_enum(index)
            .ok_or_else(|| InterpreterError::invariant("missing enum"))
    }

    pub fn store_enum(&mut self, segment: u32, address: u32, value: DataCell) -> Result<()> {
        let (target, index) = self.resolve_address(segment, LinkageSection::Enum, address)?;
        if !self.segment_mut(target)?.set_enum(index, value) {
            return Err(InterpreterError::invariant("missing enum"));
        }
        Ok(())
    }
}

impl Drop for SegmentManager {
    fn drop(&mut self) {
        for segment in self.segments.iter_mut() {
            if let Some(mut plugin) = segment.take_plugin() {
                plugin.unload(segment);
            }
        }
    }
}
