//! Binary object codec.
//!
//! Layout: `MAGIC | u32 VERSION | sections...`. Every integer is big-endian,
//! strings and blobs are `u32 length | bytes`, and every table is
//! `u32 count | entries`.

use std::sync::Arc;

use lyric_common::{ModuleLocation, SymbolPath, SymbolUrl};

use crate::descriptors::*;
use crate::error::{ObjectError, Result};
use crate::object::{LyricObject, MAGIC, VERSION};

const NO_INTRINSIC: u8 = 0xFF;

const LITERAL_NIL: u8 = 0;
const LITERAL_UNDEF: u8 = 1;
const LITERAL_BOOL: u8 = 2;
const LITERAL_I64: u8 = 3;
const LITERAL_DBL: u8 = 4;
const LITERAL_CHR: u8 = 5;
const LITERAL_UTF8: u8 = 6;
const LITERAL_BYTES: u8 = 7;

pub fn encode(object: &LyricObject) -> Vec<u8> {
    let mut w = Writer::default();
    w.buf.extend_from_slice(&MAGIC);
    w.u32(VERSION);

    match &object.plugin {
        Some(plugin) => {
            w.u8(1);
            w.string(plugin);
        }
        None => w.u8(0),
    }

    w.table(&object.types, |w, t| {
        w.u8(t.section.into());
        w.u32(t.address);
        w.u32(t.super_type);
    });
    w.table(&object.literals, |w, l| match l {
        LiteralDescriptor::Nil => w.u8(LITERAL_NIL),
        LiteralDescriptor::Undef => w.u8(LITERAL_UNDEF),
        LiteralDescriptor::Bool(b) => {
            w.u8(LITERAL_BOOL);
            w.u8(*b as u8);
        }
        LiteralDescriptor::I64(i) => {
            w.u8(LITERAL_I64);
            w.u64(*i as u64);
        }
        LiteralDescriptor::Dbl(d) => {
            w.u8(LITERAL_DBL);
            w.u64(d.to_bits());
        }
        LiteralDescriptor::Chr(c) => {
            w.u8(LITERAL_CHR);
            w.u32(*c);
        }
        LiteralDescriptor::Utf8(s) => {
            w.u8(LITERAL_UTF8);
            w.string(s);
        }
        LiteralDescriptor::Bytes(b) => {
            w.u8(LITERAL_BYTES);
            w.blob(b);
        }
    });
    w.table(&object.calls, |w, c| {
        w.path(&c.path);
        w.u8(c.mode.into());
        w.u32(c.proc_offset);
        w.u32(c.receiver);
        w.u8(c.returns_value as u8);
    });
    w.table(&object.fields, |w, f| {
        w.path(&f.path);
        w.u32(f.field_type);
    });
    w.table(&object.statics, |w, s| {
        w.path(&s.path);
        w.u32(s.static_type);
        w.u32(s.initializer);
    });
    w.table(&object.actions, |w, a| {
        w.path(&a.path);
        w.u32(a.receiver);
    });
    for shapes in [&object.classes, &object.structs, &object.instances, &object.enums] {
        w.table(shapes, |w, s| {
            w.path(&s.path);
            w.u32(s.shape_type);
            w.u32(s.super_shape);
            w.addresses(&s.members);
            w.addresses(&s.methods);
            w.addresses(&s.impls);
            w.u32(s.ctor);
            w.u32(s.allocator_trap);
            w.u8(s.sealed as u8);
        });
    }
    w.table(&object.concepts, |w, c| {
        w.path(&c.path);
        w.u32(c.concept_type);
        w.u32(c.super_concept);
        w.addresses(&c.actions);
        w.addresses(&c.impls);
    });
    w.table(&object.existentials, |w, e| {
        w.path(&e.path);
        w.u32(e.existential_type);
        w.u32(e.super_existential);
        w.u8(e.intrinsic.map(u8::from).unwrap_or(NO_INTRINSIC));
        w.addresses(&e.methods);
        w.addresses(&e.impls);
    });
    w.table(&object.impls, |w, i| {
        w.u32(i.concept);
        w.table(&i.extensions, |w, x| {
            w.u32(x.action);
            w.u32(x.call);
        });
    });
    w.table(&object.namespaces, |w, n| w.path(&n.path));
    w.table(&object.links, |w, l| {
        w.u8(l.linkage.into());
        w.string(&l.url.to_string());
    });
    w.table(&object.imports, |w, i| {
        w.string(&i.location.to_string());
        w.u8(i.flags);
    });
    w.table(&object.symbols, |w, s| {
        w.path(&s.path);
        w.u8(s.section.into());
        w.u32(s.index);
    });
    w.blob(&object.bytecode);
    w.buf
}

pub fn decode(bytes: &[u8]) -> Result<LyricObject> {
    let mut r = Reader { bytes, pos: 0 };
    if r.take(4)? != MAGIC {
        return Err(ObjectError::BadMagic);
    }
    let version = r.u32()?;
    if version != VERSION {
        return Err(ObjectError::UnsupportedVersion(version));
    }

    let mut object = LyricObject::new();
    object.plugin = match r.u8()? {
        0 => None,
        _ => Some(r.string()?),
    };
    object.types = r.table(|r| {
        Ok(TypeDescriptor { section: r.section()?, address: r.u32()?, super_type: r.u32()? })
    })?;
    object.literals = r.table(|r| {
        let offset = r.pos;
        Ok(match r.u8()? {
            LITERAL_NIL => LiteralDescriptor::Nil,
            LITERAL_UNDEF => LiteralDescriptor::Undef,
            LITERAL_BOOL => LiteralDescriptor::Bool(r.u8()? != 0),
            LITERAL_I64 => LiteralDescriptor::I64(r.u64()? as i64),
            LITERAL_DBL => LiteralDescriptor::Dbl(f64::from_bits(r.u64()?)),
            LITERAL_CHR => LiteralDescriptor::Chr(r.u32()?),
            LITERAL_UTF8 => LiteralDescriptor::Utf8(r.string()?),
            LITERAL_BYTES => LiteralDescriptor::Bytes(r.blob()?.to_vec()),
            tag => return Err(ObjectError::InvalidTag { what: "literal", tag, offset }),
        })
    })?;
    object.calls = r.table(|r| {
        let path = r.path()?;
        let offset = r.pos;
        let tag = r.u8()?;
        let mode = CallMode::try_from(tag).map_err(|_| ObjectError::InvalidTag { what: "call mode", tag, offset })?;
        Ok(CallDescriptor {
            path,
            mode,
            proc_offset: r.u32()?,
            receiver: r.u32()?,
            returns_value: r.u8()? != 0,
        })
    })?;
    object.fields = r.table(|r| Ok(FieldDescriptor { path: r.path()?, field_type: r.u32()? }))?;
    object.statics = r.table(|r| {
        Ok(StaticDescriptor { path: r.path()?, static_type: r.u32()?, initializer: r.u32()? })
    })?;
    object.actions = r.table(|r| Ok(ActionDescriptor { path: r.path()?, receiver: r.u32()? }))?;
    object.classes = r.table(Reader::shape)?;
    object.structs = r.table(Reader::shape)?;
    object.instances = r.table(Reader::shape)?;
    object.enums = r.table(Reader::shape)?;
    object.concepts = r.table(|r| {
        Ok(ConceptDescriptor {
            path: r.path()?,
            concept_type: r.u32()?,
            super_concept: r.u32()?,
            actions: r.addresses()?,
            impls: r.addresses()?,
        })
    })?;
    object.existentials = r.table(|r| {
        let path = r.path()?;
        let existential_type = r.u32()?;
        let super_existential = r.u32()?;
        let offset = r.pos;
        let intrinsic = match r.u8()? {
            NO_INTRINSIC => None,
            tag => Some(
                IntrinsicType::try_from(tag)
                    .map_err(|_| ObjectError::InvalidTag { what: "intrinsic", tag, offset })?,
            ),
        };
        Ok(ExistentialDescriptor {
            path,
            existential_type,
            super_existential,
            intrinsic,
            methods: r.addresses()?,
            impls: r.addresses()?,
        })
    })?;
    object.impls = r.table(|r| {
        Ok(ImplDescriptor {
            concept: r.u32()?,
            extensions: r.table(|r| Ok(ExtensionDescriptor { action: r.u32()?, call: r.u32()? }))?,
        })
    })?;
    object.namespaces = r.table(|r| Ok(NamespaceDescriptor { path: r.path()? }))?;
    object.links = r.table(|r| {
        let linkage = r.section()?;
        let url = SymbolUrl::parse(&r.string()?)?;
        Ok(LinkDescriptor { linkage, url })
    })?;
    object.imports = r.table(|r| {
        let location = ModuleLocation::parse(&r.string()?)?;
        Ok(ImportDescriptor { location, flags: r.u8()? })
    })?;
    object.symbols = r.table(|r| {
        Ok(SymbolDescriptor { path: r.path()?, section: r.section()?, index: r.u32()? })
    })?;
    object.bytecode = Arc::from(r.blob()?.to_vec());

    let trailing = bytes.len() - r.pos;
    if trailing != 0 {
        return Err(ObjectError::TrailingBytes(trailing));
    }
    Ok(object)
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn blob(&mut self, b: &[u8]) {
        self.u32(b.len() as u32);
        self.buf.extend_from_slice(b);
    }

    fn string(&mut self, s: &str) {
        self.blob(s.as_bytes());
    }

    fn path(&mut self, p: &SymbolPath) {
        self.string(&p.to_string());
    }

    fn addresses(&mut self, addrs: &[u32]) {
        self.u32(addrs.len() as u32);
        for a in addrs {
            self.u32(*a);
        }
    }

    fn table<T>(&mut self, items: &[T], mut f: impl FnMut(&mut Self, &T)) {
        self.u32(items.len() as u32);
        for item in items {
            f(self, item);
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(ObjectError::Truncated(self.pos))?;
        let slice = self.bytes.get(self.pos..end).ok_or(ObjectError::Truncated(self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    fn blob(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn string(&mut self) -> Result<String> {
        let offset = self.pos;
        let b = self.blob()?;
        String::from_utf8(b.to_vec()).map_err(|_| ObjectError::InvalidUtf8(offset))
    }

    fn path(&mut self) -> Result<SymbolPath> {
        Ok(SymbolPath::parse(&self.string()?)?)
    }

    fn section(&mut self) -> Result<LinkageSection> {
        let offset = self.pos;
        let tag = self.u8()?;
        LinkageSection::try_from(tag).map_err(|_| ObjectError::InvalidTag { what: "linkage section", tag, offset })
    }

    fn addresses(&mut self) -> Result<Vec<u32>> {
        self.table(|r| r.u32())
    }

    fn shape(&mut self) -> Result<ShapeDescriptor> {
        Ok(ShapeDescriptor {
            path: self.path()?,
            shape_type: self.u32()?,
            super_shape: self.u32()?,
            members: self.addresses()?,
            methods: self.addresses()?,
            impls: self.addresses()?,
            ctor: self.u32()?,
            allocator_trap: self.u32()?,
            sealed: self.u8()? != 0,
        })
    }

    fn table<T>(&mut self, mut f: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let count = self.u32()? as usize;
        // each entry occupies at least one byte
        if count > self.bytes.len() - self.pos {
            return Err(ObjectError::Truncated(self.pos));
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(f(self)?);
        }
        Ok(items)
    }
}
