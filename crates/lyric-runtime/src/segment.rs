//! A loaded module.

use std::fmt;
use std::sync::Arc;

use lyric_common::{ModuleLocation, SymbolUrl};
use lyric_object::{LinkageSection, LyricObject};

use crate::data_cell::DataCell;
use crate::plugin::{AbstractPlugin, NativeFunc};

/// Memoized result of resolving one link. `linkage == Invalid` means the link
/// has not been resolved yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkEntry {
    pub linkage: LinkageSection,
    pub segment: u32,
    pub value: u32,
}

impl Default for LinkEntry {
    fn default() -> Self {
        Self { linkage: LinkageSection::Invalid, segment: u32::MAX, value: u32::MAX }
    }
}

impl LinkEntry {
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.linkage != LinkageSection::Invalid
    }
}

pub struct BytecodeSegment {
    index: u32,
    location: ModuleLocation,
    object: LyricObject,
    plugin: Option<Box<dyn AbstractPlugin>>,
    statics: Vec<DataCell>,
    instances: Vec<DataCell>,
    enums: Vec<DataCell>,
    links: Vec<LinkEntry>,
}

impl BytecodeSegment {
    pub fn new(index: u32, location: ModuleLocation, object: LyricObject) -> Self {
        Self {
            index,
            statics: vec![DataCell::Invalid; object.statics.len()],
            instances: vec![DataCell::Invalid; object.instances.len()],
            enums: vec![DataCell::Invalid; object.enums.len()],
            links: vec![LinkEntry::default(); object.links.len()],
            location,
            object,
            plugin: None,
        }
    }

    pub(crate) fn set_plugin(&mut self, plugin: Box<dyn AbstractPlugin>) {
        self.plugin = Some(plugin);
    }

    pub(crate) fn take_plugin(&mut self) -> Option<Box<dyn AbstractPlugin>> {
        self.plugin.take()
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn location(&self) -> &ModuleLocation {
        &self.location
    }

    #[inline]
    pub fn object(&self) -> &LyricObject {
        &self.object
    }

    #[inline]
    pub fn bytecode(&self) -> &Arc<[u8]> {
        &self.object.bytecode
    }

    pub fn has_plugin(&self) -> bool {
        self.plugin.is_some()
    }

    pub fn get_trap(&self, index: u32) -> Option<NativeFunc> {
        self.plugin.as_ref().and_then(|p| p.get_trap(index))
    }

    /// Url of a symbol defined in this segment.
    pub fn symbol_url(&self, section: LinkageSection, index: u32) -> Option<SymbolUrl> {
        self.object
            .symbols
            .iter()
            .find(|s| s.section == section && s.index == index)
            .map(|s| SymbolUrl::new(self.location.clone(), s.path.clone()))
    }

    pub fn get_static(&self, index: u32) -> Option<DataCell> {
        self.statics.get(index as usize).copied()
    }

    pub fn set_static(&mut self, index: u32, value: DataCell) -> bool {
        store(&mut self.statics, index, value)
    }

    pub fn get_instance(&self, index: u32) -> Option<DataCell> {
        self.instances.get(index as usize).copied()
    }

    pub fn set_instance(&mut self, index: u32, value: DataCell) -> bool {
        store(&mut self.instances, index, value)
    }

    pub fn get_enum(&self, index: u32) -> Option<DataCell> {
        self.enums.get(index as usize).copied()
    }

    pub fn set_enum(&mut self, index: u32, value: DataCell) -> bool {
        store(&mut self.enums, index, value)
    }

    pub fn get_link(&self, index: u32) -> Option<LinkEntry> {
        self.links.get(index as usize).copied()
    }

    pub fn set_link(&mut self, index: u32, entry: LinkEntry) -> bool {
        match self.links.get_mut(index as usize) {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => false,
        }
    }

    /// Every statically stored cell: statics, instances and enums.
    pub fn stored_cells(&self) -> impl Iterator<Item = &DataCell> {
        self.statics.iter().chain(self.instances.iter()).chain(self.enums.iter())
    }
}

fn store(cells: &mut [DataCell], index: u32, value: DataCell) -> bool {
    match cells.get_mut(index as usize) {
        Some(cell) => {
            *cell = value;
            true
        }
        None => false,
    }
}

impl fmt::Debug for BytecodeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BytecodeSegment")
            .field("index", &self.index)
            .field("location", &self.location.to_string())
            .field("has_plugin", &self.plugin.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyric_common::SymbolPath;
    use lyric_object::ObjectBuilder;

    #[test]
    fn test_storage_starts_invalid() {
        let mut builder = ObjectBuilder::new();
        builder.add_static("counter", lyric_object::INVALID_ADDRESS_U32).unwrap();
        let object = builder.build();
        let mut segment = BytecodeSegment::new(0, ModuleLocation::parse("/main").unwrap(), object);
        assert_eq!(segment.get_static(0), Some(DataCell::Invalid));
        assert!(segment.set_static(0, DataCell::I64(1)));
        assert_eq!(segment.get_static(0), Some(DataCell::I64(1)));
        assert!(!segment.set_static(1, DataCell::Nil));
        assert_eq!(segment.get_static(1), None);
        let url = segment.symbol_url(LinkageSection::Static, 0).unwrap();
        assert_eq!(url.path(), &SymbolPath::parse("counter").unwrap());
    }
}
