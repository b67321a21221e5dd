//! Module loaders.

use std::io;
use std::path::PathBuf;

use hashbrown::HashMap;
use lyric_common::ModuleLocation;
use lyric_object::LyricObject;

use crate::error::{InterpreterCondition, InterpreterError, Result};
use crate::plugin::AbstractPlugin;

/// File extension of encoded objects read by [`DirectoryLoader`].
pub const OBJECT_FILE_EXTENSION: &str = "lyo";

/// Builds a fresh plugin instance for a segment.
pub type PluginFactory = Box<dyn Fn() -> Box<dyn AbstractPlugin>>;

/// Source of module objects and their native plugins. A loader returns
/// `Ok(None)` when it does not know the module.
pub trait AbstractLoader {
    fn has_module(&self, location: &ModuleLocation) -> Result<bool>;

    fn load_module(&mut self, location: &ModuleLocation) -> Result<Option<LyricObject>>;

    fn load_plugin(
        &mut self,
        location: &ModuleLocation,
        specifier: &str,
    ) -> Result<Option<Box<dyn AbstractPlugin>>>;
}

/// Serves objects held in memory.
#[derive(Default)]
pub struct StaticLoader {
    objects: HashMap<ModuleLocation, LyricObject>,
    plugins: HashMap<String, PluginFactory>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_module(&mut self, location: ModuleLocation, object: LyricObject) -> &mut Self {
        self.objects.insert(location, object);
        self
    }

    pub fn insert_plugin(&mut self, specifier: &str, factory: PluginFactory) -> &mut Self {
        self.plugins.insert(specifier.to_string(), factory);
        self
    }
}

impl AbstractLoader for StaticLoader {
    fn has_module(&self, location: &ModuleLocation) -> Result<bool> {
        Ok(self.objects.contains_key(location))
    }

    fn load_module(&mut self, location: &ModuleLocation) -> Result<Option<LyricObject>> {
        Ok(self.objects.get(location).cloned())
    }

    fn load_plugin(
        &mut self,
        _location: &ModuleLocation,
        specifier: &str,
    ) -> Result<Option<Box<dyn AbstractPlugin>>> {
        Ok(self.plugins.get(specifier).map(|factory| factory()))
    }
}

/// Tries each loader in order; the first that has the module wins.
#[derive(Default)]
pub struct ChainLoader {
    loaders: Vec<Box<dyn AbstractLoader>>,
}

impl ChainLoader {
    pub fn new(loaders: Vec<Box<dyn AbstractLoader>>) -> Self {
        Self { loaders }
    }

    pub fn push(&mut self, loader: Box<dyn AbstractLoader>) {
        self.loaders.push(loader);
    }
}

impl AbstractLoader for ChainLoader {
    fn has_module(&self, location: &ModuleLocation) -> Result<bool> {
        for loader in &self.loaders {
            if loader.has_module(location)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn load_module(&mut self, location: &ModuleLocation) -> Result<Option<LyricObject>> {
        for loader in self.loaders.iter_mut() {
            if loader.has_module(location)? {
                return loader.load_module(location);
            }
        }
        Ok(None)
    }

    fn load_plugin(
        &mut self,
        location: &ModuleLocation,
        specifier: &str,
    ) -> Result<Option<Box<dyn AbstractPlugin>>> {
        for loader in self.loaders.iter_mut() {
            if loader.has_module(location)? {
                return loader.load_plugin(location, specifier);
            }
        }
        Ok(None)
    }
}

/// Reads encoded objects from a directory tree. The location `/a/b` maps to
/// `<root>/a/b.lyo`. Plugins come from an in-process registry.
pub struct DirectoryLoader {
    root: PathBuf,
    plugins: HashMap<String, PluginFactory>,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), plugins: HashMap::new() }
    }

    pub fn register_plugin(&mut self, specifier: &str, factory: PluginFactory) -> &mut Self {
        self.plugins.insert(specifier.to_string(), factory);
        self
    }

    /// Path of the object file for a location, if the location is local.
    pub fn object_path(&self, location: &ModuleLocation) -> Option<PathBuf> {
        if !location.is_absolute() {
            return None;
        }
        let mut path = self.root.clone();
        let mut parts = location.parts().peekable();
        parts.peek()?;
        for part in parts {
            if part == ".." || part == "." {
                return None;
            }
            path.push(part);
        }
        path.set_extension(OBJECT_FILE_EXTENSION);
        Some(path)
    }
}

impl AbstractLoader for DirectoryLoader {
    fn has_module(&self, location: &ModuleLocation) -> Result<bool> {
        Ok(self.object_path(location).is_some_and(|p| p.is_file()))
    }

    fn load_module(&mut self, location: &ModuleLocation) -> Result<Option<LyricObject>> {
        let Some(path) = self.object_path(location) else {
            return Ok(None);
        };
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(InterpreterError::new(
                    InterpreterCondition::MissingAssembly,
                    format!("failed to read {}: {}", path.display(), err),
                ))
            }
        };
        log::debug!("read {} bytes for {} from {}", bytes.len(), location, path.display());
        Ok(Some(lyric_object::codec::decode(&bytes)?))
    }

    fn load_plugin(
        &mut self,
        _location: &ModuleLocation,
        specifier: &str,
    ) -> Result<Option<Box<dyn AbstractPlugin>>> {
        Ok(self.plugins.get(specifier).map(|factory| factory()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object() -> LyricObject {
        let mut builder = lyric_object::ObjectBuilder::new();
        builder.add_namespace("ns").unwrap();
        builder.build()
    }

    #[test]
    fn test_static_loader() {
        let location = ModuleLocation::parse("/a").unwrap();
        let mut loader = StaticLoader::new();
        loader.insert_module(location.clone(), object());
        assert!(loader.has_module(&location).unwrap());
        assert!(loader.load_module(&location).unwrap().is_some());
        let missing = ModuleLocation::parse("/b").unwrap();
        assert!(!loader.has_module(&missing).unwrap());
        assert!(loader.load_module(&missing).unwrap().is_none());
    }

    #[test]
    fn test_chain_loader_prefers_first() {
        let a = ModuleLocation::parse("/a").unwrap();
        let b = ModuleLocation::parse("/b").unwrap();
        let mut first = StaticLoader::new();
        first.insert_module(a.clone(), object());
        let mut second = StaticLoader::new();
        second.insert_module(b.clone(), object());
        let mut chain = ChainLoader::new(vec![Box::new(first), Box::new(second)]);
        assert!(chain.load_module(&a).unwrap().is_some());
        assert!(chain.load_module(&b).unwrap().is_some());
        assert!(chain.load_module(&ModuleLocation::parse("/c").unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_directory_loader_reads_objects() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        let encoded = lyric_object::codec::encode(&object());
        std::fs::write(dir.path().join("pkg").join("mod.lyo"), encoded).unwrap();

        let mut loader = DirectoryLoader::new(dir.path());
        let location = ModuleLocation::parse("/pkg/mod").unwrap();
        assert!(loader.has_module(&location).unwrap());
        let loaded = loader.load_module(&location).unwrap().unwrap();
        assert_eq!(loaded.namespaces.len(), 1);
        assert!(loader.load_module(&ModuleLocation::parse("/pkg/other").unwrap()).unwrap().is_none());
        assert!(loader.object_path(&ModuleLocation::parse("/../escape").unwrap()).is_none());
    }

    #[test]
    fn test_directory_loader_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.lyo"), b"not an object").unwrap();
        let mut loader = DirectoryLoader::new(dir.path());
        let err = loader.load_module(&ModuleLocation::parse("/bad").unwrap()).unwrap_err();
        assert_eq!(err.condition, InterpreterCondition::RuntimeInvariant);
    }
}
