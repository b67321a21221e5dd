//! Encoding and decoding of complete objects.

use lyric_common::SymbolPath;
use lyric_object::codec::{decode, encode};
use lyric_object::*;
use pretty_assertions::assert_eq;

fn point_object() -> LyricObject {
    let mut builder = ObjectBuilder::new();
    builder.set_plugin("geo-plugin");
    let x = builder.add_field("Point.x").unwrap();
    let y = builder.add_field("Point.y").unwrap();

    let mut ctor = ProcBuilder::new(2, 0);
    ctor.code
        .emit_type(Opcode::Synthetic, SYNTHETIC_THIS)
        .emit_flags_address(Opcode::Load, LOAD_ARGUMENT, 0)
        .emit_flags_address(Opcode::Store, STORE_FIELD, x)
        .emit_type(Opcode::Synthetic, SYNTHETIC_THIS)
        .emit_flags_address(Opcode::Load, LOAD_ARGUMENT, 1)
        .emit_flags_address(Opcode::Store, STORE_FIELD, y)
        .emit(Opcode::Return);
    let ctor = builder.add_call("Point.$ctor", CallMode::Constructor, &ctor, false).unwrap();

    let mut shape = ShapeDescriptor::new(SymbolPath::parse("Point").unwrap());
    shape.members = vec![x, y];
    shape.ctor = ctor;
    shape.allocator_trap = 0;
    builder.add_shape(LinkageSection::Class, shape);
    builder.add_literal(LiteralDescriptor::Dbl(1.5));
    builder.add_literal(LiteralDescriptor::Utf8("origin".to_string()));
    builder.add_link(LinkageSection::Existential, "/prelude#Int").unwrap();
    builder.add_import("/prelude", 0x01).unwrap();
    builder.build()
}

#[test]
fn test_point_object_survives_encoding() {
    let object = point_object();
    let decoded = decode(&encode(&object)).unwrap();
    assert_eq!(decoded, object);
    assert_eq!(decoded.plugin.as_deref(), Some("geo-plugin"));
    let symbol = decoded.find_symbol(&SymbolPath::parse("Point").unwrap()).unwrap();
    assert_eq!(symbol.section, LinkageSection::Class);
}

#[test]
fn test_decoded_ctor_proc_walks_to_return() {
    let object = decode(&encode(&point_object())).unwrap();
    let ctor = object.get_call(object.classes[0].ctor).unwrap();
    let header = ProcHeader::read(&object.bytecode, ctor.proc_offset).unwrap();
    let mut it = BytecodeIterator::at(object.bytecode.clone(), header.code_offset).unwrap();
    let mut ops = Vec::new();
    while let Some(op) = it.next_op() {
        ops.push(op.opcode);
    }
    assert_eq!(ops.len(), 7);
    assert_eq!(ops.last(), Some(&Opcode::Return));
}

#[test]
fn test_trailing_bytes_rejected() {
    let mut bytes = encode(&point_object());
    bytes.push(0);
    assert_eq!(decode(&bytes), Err(ObjectError::TrailingBytes(1)));
}
