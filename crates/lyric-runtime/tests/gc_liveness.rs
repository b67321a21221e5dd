//! Collection keeps what running code can reach and finalizes the rest.

mod common;

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::*;
use lyric_object::*;
use lyric_runtime::data_cell::Descriptor;
use lyric_runtime::{AbstractRef, BytecodeInterpreter, DataCell, InterpreterStateOptions, Promise, TaskState};
use pretty_assertions::assert_eq;

static FINALIZED: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct Tracked {
    reachable: bool,
}

impl AbstractRef for Tracked {
    fn describe(&self) -> String {
        "Tracked".to_string()
    }

    fn is_reachable(&self) -> bool {
        self.reachable
    }

    fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }

    fn finalize(&mut self) {
        FINALIZED.fetch_add(1, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn idle_entry() -> LyricObject {
    let mut proc = ProcBuilder::new(0, 0);
    proc.code.emit(Opcode::Nil).emit(Opcode::Return);
    entry_object(&proc)
}

#[test]
fn test_unreachable_native_refs_are_finalized() {
    let mut state = load_state(loader(vec![("/gc", idle_entry())]), "/gc", InterpreterStateOptions::default());
    let kept = state.allocate_ref(Box::new(Tracked::default()));
    let dropped = state.allocate_ref(Box::new(Tracked::default()));
    state.allocate_ref(Box::new(Tracked::default()));
    state.current_coro_mut().unwrap().push_data(kept);

    let before = FINALIZED.load(Ordering::SeqCst);
    let stats = state.collect_garbage();
    assert_eq!(stats.deleted, 2);
    assert_eq!(stats.live, 1);
    assert_eq!(FINALIZED.load(Ordering::SeqCst) - before, 2);

    // a freed slot is reused under a new generation
    let stale = dropped.handle().unwrap();
    assert!(state.heap().get(stale).is_err());
    let fresh = state.allocate_ref(Box::new(Tracked::default())).handle().unwrap();
    assert_ne!(fresh, stale);
    assert!(state.heap().get_as::<Tracked>(fresh).is_ok());
}

#[test]
fn test_collection_mid_run_keeps_stack_values() {
    let mut builder = ObjectBuilder::new();
    let point = add_point(&mut builder);
    let mut entry = ProcBuilder::new(0, 1);
    emit_new_point(&mut entry.code, point.class, 3, 4);
    emit_new_point(&mut entry.code, point.class, 5, 5);
    entry
        .code
        .emit(Opcode::Pop)
        .emit_flags_address(Opcode::Trap, 0, TRAP_COLLECT)
        .emit_flags_address(Opcode::Store, STORE_LOCAL, 0)
        .emit_call(Opcode::CallVirtual, 0, point.sum, 0)
        .emit_i64(100)
        .emit_flags_address(Opcode::Load, LOAD_LOCAL, 0)
        .emit(Opcode::I64Mul)
        .emit(Opcode::I64Add)
        .emit(Opcode::Return);
    add_entry(&mut builder, &entry);

    let mut state = load_state(loader(vec![("/gc", builder.build())]), "/gc", InterpreterStateOptions::default());
    let exit = BytecodeInterpreter::new().run(&mut state).unwrap();
    // one point collected, the other still answers sum()
    assert_eq!(exit.main_return, DataCell::I64(107));
}

#[test]
fn test_stored_statics_survive_collection() {
    let mut builder = ObjectBuilder::new();
    let point = add_point(&mut builder);
    let mut init = ProcBuilder::new(0, 0);
    emit_new_point(&mut init.code, point.class, 2, 2);
    init.code.emit(Opcode::Return);
    let init = builder.add_call("origin.$init", CallMode::Normal, &init, true).unwrap();
    let origin = builder.add_static("origin", init).unwrap();

    let mut entry = ProcBuilder::new(0, 0);
    entry
        .code
        .emit_flags_address(Opcode::Load, LOAD_STATIC, origin)
        .emit(Opcode::Pop)
        .emit_flags_address(Opcode::Trap, 0, TRAP_COLLECT)
        .emit(Opcode::Pop)
        .emit_flags_address(Opcode::Load, LOAD_STATIC, origin)
        .emit_call(Opcode::CallVirtual, 0, point.sum, 0)
        .emit(Opcode::Return);
    add_entry(&mut builder, &entry);

    let mut state = load_state(loader(vec![("/gc", builder.build())]), "/gc", InterpreterStateOptions::default());
    let exit = BytecodeInterpreter::new().run(&mut state).unwrap();
    assert_eq!(exit.main_return, DataCell::I64(4));
}

#[test]
fn test_waiting_and_ready_task_stacks_are_roots() {
    let mut builder = ObjectBuilder::new();
    let mut worker = ProcBuilder::new(0, 0);
    worker.code.emit(Opcode::Nil).emit(Opcode::Return);
    let worker = builder.add_call("worker", CallMode::Normal, &worker, true).unwrap();
    let mut entry = ProcBuilder::new(0, 0);
    entry.code.emit(Opcode::Nil).emit(Opcode::Return);
    add_entry(&mut builder, &entry);
    let mut state = load_state(loader(vec![("/gc", builder.build())]), "/gc", InterpreterStateOptions::default());

    // main holds a string and waits on a timer that will not fire
    let held_by_main = state.allocate_string("main");
    state.current_coro_mut().unwrap().push_data(held_by_main);
    let main = state.scheduler().main_task();
    let timer = Promise::without_adapt().into_ref();
    state.scheduler_mut().register_timer(Duration::from_secs(60), timer.clone()).unwrap();
    state.scheduler_mut().await_promise(&timer).unwrap();

    // the worker is started but never selected
    let worker = state.create_worker(&DataCell::Call(Descriptor::new(0, worker)), Vec::new()).unwrap();
    state.scheduler_mut().start_task(worker).unwrap();
    let held_by_worker = state.allocate_string("worker");
    state.scheduler_mut().task_mut(worker).unwrap().coro_mut().push_data(held_by_worker);
    let garbage = state.allocate_string("garbage");

    assert!(state.scheduler().current_task().is_none());
    assert_eq!(state.scheduler().task(main).unwrap().state(), TaskState::Waiting);
    assert_eq!(state.scheduler().task(worker).unwrap().state(), TaskState::Ready);

    let stats = state.collect_garbage();
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.live, 2);
    assert!(state.heap().contains(held_by_main.handle().unwrap()));
    assert!(state.heap().contains(held_by_worker.handle().unwrap()));
    assert!(!state.heap().contains(garbage.handle().unwrap()));
}
