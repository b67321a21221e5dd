//! Objects, traps and loaders shared by the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use lyric_common::{ModuleLocation, SymbolPath};
use lyric_object::*;
use lyric_runtime::{
    base_allocator, receive_promise, AbstractPlugin, BytecodeInterpreter, DataCell, InterpreterError,
    InterpreterState, InterpreterStateOptions, Promise, Result, StaticLoader, TrapTable,
};

pub const TEST_PLUGIN: &str = "lyric-test-plugin";
pub const OUT_PORT: &str = "test://out";
pub const IN_PORT: &str = "test://in";

pub const TRAP_ALLOCATE: u32 = 0;
pub const TRAP_SPAWN: u32 = 1;
pub const TRAP_SPAWN_AND_AWAIT: u32 = 2;
pub const TRAP_SLEEP: u32 = 3;
pub const TRAP_SEND: u32 = 4;
pub const TRAP_RECEIVE: u32 = 5;
pub const TRAP_COLLECT: u32 = 6;

pub fn location(path: &str) -> ModuleLocation {
    ModuleLocation::parse(path).unwrap()
}

fn pop_call(state: &mut InterpreterState) -> Result<DataCell> {
    match state.current_coro_mut()?.pop_data()? {
        call @ DataCell::Call(_) => Ok(call),
        other => Err(InterpreterError::invariant(format!("expected a call, found {}", other))),
    }
}

/// Pops a call descriptor and starts it as a worker.
fn spawn(_interp: &mut BytecodeInterpreter, state: &mut InterpreterState) -> Result<()> {
    let call = pop_call(state)?;
    let worker = state.create_worker(&call, Vec::new())?;
    state.scheduler_mut().start_task(worker)
}

/// Pops a call descriptor, starts it as a worker and suspends until the
/// worker's result is pushed.
fn spawn_and_await(_interp: &mut BytecodeInterpreter, state: &mut InterpreterState) -> Result<()> {
    let call = pop_call(state)?;
    let worker = state.create_worker(&call, Vec::new())?;
    let promise = Promise::new().into_ref();
    let scheduler = state.scheduler_mut();
    scheduler.start_task(worker)?;
    scheduler.register_worker(worker, promise.clone())?;
    scheduler.await_promise(&promise)
}

/// Pops a duration in milliseconds and suspends for it.
fn sleep(_interp: &mut BytecodeInterpreter, state: &mut InterpreterState) -> Result<()> {
    let millis = state.current_coro_mut()?.pop_data()?.as_i64().unwrap_or(0);
    let promise = Promise::without_adapt().into_ref();
    let scheduler = state.scheduler_mut();
    scheduler.register_timer(Duration::from_millis(millis.max(0) as u64), promise.clone())?;
    scheduler.await_promise(&promise)
}

/// Pops a cell and sends its display form to the out port.
fn send(_interp: &mut BytecodeInterpreter, state: &mut InterpreterState) -> Result<()> {
    let value = state.current_coro_mut()?.pop_data()?;
    let port = state
        .port_multiplexer()
        .get_port(OUT_PORT)
        .ok_or_else(|| InterpreterError::invariant("missing out port"))?;
    port.send(value.to_string().into_bytes());
    Ok(())
}

/// Suspends until the in port has a message, then pushes it.
fn receive(_interp: &mut BytecodeInterpreter, state: &mut InterpreterState) -> Result<()> {
    let port = state
        .port_multiplexer()
        .get_port(IN_PORT)
        .ok_or_else(|| InterpreterError::invariant("missing in port"))?;
    let promise = receive_promise(port.clone()).into_ref();
    port.readable(state.scheduler_mut(), promise.clone())?;
    state.scheduler_mut().await_promise(&promise)
}

/// Collects garbage and pushes the number of deleted refs.
fn collect(_interp: &mut BytecodeInterpreter, state: &mut InterpreterState) -> Result<()> {
    let stats = state.collect_garbage();
    state.current_coro_mut()?.push_data(DataCell::I64(stats.deleted as i64));
    Ok(())
}

pub fn test_plugin() -> Box<dyn AbstractPlugin> {
    Box::new(TrapTable::new(vec![base_allocator, spawn, spawn_and_await, sleep, send, receive, collect]))
}

/// Loader serving `modules` with the test plugin registered.
pub fn loader(modules: Vec<(&str, LyricObject)>) -> StaticLoader {
    let mut loader = StaticLoader::new();
    for (path, object) in modules {
        loader.insert_module(location(path), object);
    }
    loader.insert_plugin(TEST_PLUGIN, Box::new(test_plugin));
    loader
}

pub fn load_state(loader: StaticLoader, main: &str, options: InterpreterStateOptions) -> InterpreterState {
    let mut state = InterpreterState::create(Box::new(loader), options);
    state.load(&location(main)).unwrap();
    state
}

/// Addresses of the `Point` symbols added by [`add_point`].
#[derive(Debug, Clone, Copy)]
pub struct PointSymbols {
    pub class: u32,
    pub x: u32,
    pub y: u32,
    pub sum: u32,
}

/// `Point(x, y)` with a `sum()` method, allocated by the test plugin.
pub fn add_point(builder: &mut ObjectBuilder) -> PointSymbols {
    builder.set_plugin(TEST_PLUGIN);
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

    let mut sum = ProcBuilder::new(0, 0);
    sum.code
        .emit_type(Opcode::Synthetic, SYNTHETIC_THIS)
        .emit_flags_address(Opcode::Load, LOAD_FIELD, x)
        .emit_type(Opcode::Synthetic, SYNTHETIC_THIS)
        .emit_flags_address(Opcode::Load, LOAD_FIELD, y)
        .emit(Opcode::I64Add)
        .emit(Opcode::Return);
    let sum = builder.add_call("Point.sum", CallMode::Normal, &sum, true).unwrap();

    let mut shape = ShapeDescriptor::new(SymbolPath::parse("Point").unwrap());
    shape.members = vec![x, y];
    shape.methods = vec![sum];
    shape.ctor = ctor;
    shape.allocator_trap = TRAP_ALLOCATE;
    let class = builder.add_shape(LinkageSection::Class, shape);
    PointSymbols { class, x, y, sum }
}

/// Push `new Point(x, y)`.
pub fn emit_new_point(code: &mut BytecodeBuilder, class: u32, x: i64, y: i64) {
    code.emit_i64(x)
        .emit_i64(y)
        .emit_call(Opcode::New, new_flags(NEW_CLASS, 0), class, 2);
}

/// Adds `$entry` with the given proc.
pub fn add_entry(builder: &mut ObjectBuilder, proc: &ProcBuilder) -> u32 {
    builder.add_call("$entry", CallMode::Normal, proc, true).unwrap()
}

/// A module whose `$entry` runs `proc`.
pub fn entry_object(proc: &ProcBuilder) -> LyricObject {
    let mut builder = ObjectBuilder::new();
    builder.set_plugin(TEST_PLUGIN);
    add_entry(&mut builder, proc);
    builder.build()
}
