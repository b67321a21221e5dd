//! Constructing `Point` through a native allocator and its constructor.

mod common;

use common::*;
use lyric_common::SymbolPath;
use lyric_object::*;
use lyric_runtime::{
    AbstractRef, BaseRef, BytecodeInterpreter, DataCell, InterpreterCondition, InterpreterStateOptions, StatusCode,
};
use pretty_assertions::assert_eq;

fn point_main(emit: impl FnOnce(&mut BytecodeBuilder, PointSymbols)) -> lyric_object::LyricObject {
    let mut builder = ObjectBuilder::new();
    let point = add_point(&mut builder);
    let mut entry = ProcBuilder::new(0, 1);
    emit(&mut entry.code, point);
    add_entry(&mut builder, &entry);
    builder.build()
}

#[test]
fn test_new_point_stores_constructor_arguments() {
    let object = point_main(|code, point| {
        emit_new_point(code, point.class, 3, 4);
        code.emit(Opcode::Return);
    });
    let mut state = load_state(loader(vec![("/point", object)]), "/point", InterpreterStateOptions::default());
    let mut interp = BytecodeInterpreter::new();
    let exit = interp.run(&mut state).unwrap();

    assert_eq!(exit.status_code, StatusCode::Ok);
    assert!(!state.is_active());
    let DataCell::Ref(handle) = exit.main_return else {
        panic!("expected a ref, found {}", exit.main_return);
    };
    let point = state.heap().get_as::<BaseRef>(handle).unwrap();
    let vtable = point.virtual_table().unwrap();
    assert_eq!(vtable.symbol_url().path(), &SymbolPath::parse("Point").unwrap());
    assert_eq!(vtable.symbol_url().location(), Some(&location("/point")));
    assert_eq!(point.field_at(0), Some(DataCell::I64(3)));
    assert_eq!(point.field_at(1), Some(DataCell::I64(4)));
}

#[test]
fn test_virtual_call_reads_fields() {
    let object = point_main(|code, point| {
        emit_new_point(code, point.class, 3, 4);
        code.emit_call(Opcode::CallVirtual, 0, point.sum, 0).emit(Opcode::Return);
    });
    let mut state = load_state(loader(vec![("/point", object)]), "/point", InterpreterStateOptions::default());
    let exit = BytecodeInterpreter::new().run(&mut state).unwrap();
    assert_eq!(exit.main_return, DataCell::I64(7));
    assert!(exit.instruction_count > 0);
}

#[test]
fn test_field_roundtrip_through_local() {
    let object = point_main(|code, point| {
        emit_new_point(code, point.class, 1, 2);
        code.emit_flags_address(Opcode::Store, STORE_LOCAL, 0)
            .emit_flags_address(Opcode::Load, LOAD_LOCAL, 0)
            .emit_i64(40)
            .emit_flags_address(Opcode::Store, STORE_FIELD, point.x)
            .emit_flags_address(Opcode::Load, LOAD_LOCAL, 0)
            .emit_call(Opcode::CallVirtual, 0, point.sum, 0)
            .emit(Opcode::Return);
    });
    let mut state = load_state(loader(vec![("/point", object)]), "/point", InterpreterStateOptions::default());
    let exit = BytecodeInterpreter::new().run(&mut state).unwrap();
    assert_eq!(exit.main_return, DataCell::I64(42));
}

#[test]
fn test_constructor_argument_count_is_checked() {
    let object = point_main(|code, point| {
        code.emit_i64(1)
            .emit_call(Opcode::New, new_flags(NEW_CLASS, 0), point.class, 1)
            .emit(Opcode::Return);
    });
    let mut state = load_state(loader(vec![("/point", object)]), "/point", InterpreterStateOptions::default());
    let err = BytecodeInterpreter::new().run(&mut state).unwrap_err();
    assert_eq!(err.condition, InterpreterCondition::RuntimeInvariant);
    assert!(err.message.contains("not enough arguments"));
    assert_eq!(state.status_code(), StatusCode::Internal);
}

#[test]
fn test_virtual_call_requires_ref_receiver() {
    let object = point_main(|code, point| {
        code.emit_i64(5).emit_call(Opcode::CallVirtual, 0, point.sum, 0).emit(Opcode::Return);
    });
    let mut state = load_state(loader(vec![("/point", object)]), "/point", InterpreterStateOptions::default());
    let err = BytecodeInterpreter::new().run(&mut state).unwrap_err();
    assert_eq!(err.condition, InterpreterCondition::InvalidReceiver);
    assert_eq!(state.status_code(), StatusCode::Aborted);
}

#[test]
fn test_missing_allocator_fails_new() {
    let mut builder = ObjectBuilder::new();
    let shape = ShapeDescriptor::new(SymbolPath::parse("Opaque").unwrap());
    let class = builder.add_shape(LinkageSection::Class, shape);
    let mut entry = ProcBuilder::new(0, 0);
    entry
        .code
        .emit_call(Opcode::New, new_flags(NEW_CLASS, 0), class, 0)
        .emit(Opcode::Return);
    add_entry(&mut builder, &entry);

    let mut state = load_state(loader(vec![("/opaque", builder.build())]), "/opaque", InterpreterStateOptions::default());
    let err = BytecodeInterpreter::new().run(&mut state).unwrap_err();
    assert!(err.message.contains("missing allocator"));
}

#[test]
fn test_instance_is_constructed_once() {
    let mut builder = ObjectBuilder::new();
    builder.set_plugin(TEST_PLUGIN);

    // `count` starts at 0 through its initializer; the instance ctor bumps it
    let mut init = ProcBuilder::new(0, 0);
    init.code.emit_i64(0).emit(Opcode::Return);
    let init = builder.add_call("count.$init", CallMode::Normal, &init, true).unwrap();
    let count = builder.add_static("count", init).unwrap();

    let mut ctor = ProcBuilder::new(0, 0);
    ctor.code
        .emit_flags_address(Opcode::Load, LOAD_STATIC, count)
        .emit_i64(1)
        .emit(Opcode::I64Add)
        .emit_flags_address(Opcode::Store, STORE_STATIC, count)
        .emit(Opcode::Return);
    let ctor = builder.add_call("Origin.$ctor", CallMode::Constructor, &ctor, false).unwrap();
    let mut shape = ShapeDescriptor::new(SymbolPath::parse("Origin").unwrap());
    shape.ctor = ctor;
    shape.allocator_trap = TRAP_ALLOCATE;
    let origin = builder.add_shape(LinkageSection::Instance, shape);

    let mut entry = ProcBuilder::new(0, 0);
    entry
        .code
        .emit_flags_address(Opcode::Load, LOAD_INSTANCE, origin)
        .emit(Opcode::Pop)
        .emit_flags_address(Opcode::Load, LOAD_INSTANCE, origin)
        .emit(Opcode::Pop)
        .emit_flags_address(Opcode::Load, LOAD_STATIC, count)
        .emit(Opcode::Return);
    add_entry(&mut builder, &entry);

    let mut state = load_state(loader(vec![("/origin", builder.build())]), "/origin", InterpreterStateOptions::default());
    let mut interp = BytecodeInterpreter::new();
    let exit = interp.run(&mut state).unwrap();
    assert_eq!(exit.main_return, DataCell::I64(1));
    assert_eq!(interp.recursion_depth(), 0);

    let segment = state.segment_manager().segment(0).unwrap();
    let stored = segment.get_instance(origin).unwrap();
    assert!(matches!(stored, DataCell::Ref(_)));
    assert_eq!(segment.get_static(count), Some(DataCell::I64(1)));
}

#[test]
fn test_exact_constructor_arguments_leave_no_rest() {
    let mut builder = ObjectBuilder::new();
    let point = add_point(&mut builder);
    let mut entry = ProcBuilder::new(0, 0);
    entry.code.emit(Opcode::Nil).emit(Opcode::Return);
    add_entry(&mut builder, &entry);
    let mut state = load_state(loader(vec![("/point", builder.build())]), "/point", InterpreterStateOptions::default());
    let mut interp = BytecodeInterpreter::new();

    let allocator = state.prepare_new(NEW_CLASS, point.class).unwrap();
    allocator(&mut interp, &mut state).unwrap();
    assert!(state.return_to_caller().unwrap());
    let created = state.current_coro().unwrap().peek_data().unwrap();
    assert!(matches!(created, DataCell::Ref(_)));

    state.construct_new(vec![DataCell::I64(3), DataCell::I64(4)]).unwrap();
    let frame = state.current_coro().unwrap().peek_call().unwrap();
    assert_eq!(frame.num_arguments(), 2);
    assert_eq!(frame.num_rest(), 0);
    assert_eq!(frame.receiver, created);
}
