//! Control flow, failures and inspector hooks of the interpreter loop.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::*;
use lyric_object::*;
use lyric_runtime::{
    AbstractInspector, BytecodeInterpreter, DataCell, InterpreterCondition, InterpreterError, InterpreterState,
    InterpreterStateOptions, Result, StatusCode,
};
use pretty_assertions::assert_eq;

fn run_entry(proc: &ProcBuilder) -> (InterpreterState, Result<lyric_runtime::InterpreterExit>) {
    let mut state = load_state(loader(vec![("/ops", entry_object(proc))]), "/ops", InterpreterStateOptions::default());
    let result = BytecodeInterpreter::new().run(&mut state);
    (state, result)
}

#[test]
fn test_counting_loop() {
    // i = 1; acc = 0; while i <= 10 { acc += i; i += 1 }
    let mut proc = ProcBuilder::new(0, 2);
    let code = &mut proc.code;
    code.emit_i64(1)
        .emit_flags_address(Opcode::Store, STORE_LOCAL, 0)
        .emit_i64(0)
        .emit_flags_address(Opcode::Store, STORE_LOCAL, 1);
    let top = code.make_label();
    code.emit_flags_address(Opcode::Load, LOAD_LOCAL, 0)
        .emit_i64(10)
        .emit(Opcode::I64Cmp);
    let exit = code.emit_jump(Opcode::IfGt);
    code.emit_flags_address(Opcode::Load, LOAD_LOCAL, 1)
        .emit_flags_address(Opcode::Load, LOAD_LOCAL, 0)
        .emit(Opcode::I64Add)
        .emit_flags_address(Opcode::Store, STORE_LOCAL, 1)
        .emit_flags_address(Opcode::Load, LOAD_LOCAL, 0)
        .emit_i64(1)
        .emit(Opcode::I64Add)
        .emit_flags_address(Opcode::Store, STORE_LOCAL, 0)
        .emit_jump_to(Opcode::Jump, top)
        .unwrap();
    let done = code.make_label();
    code.patch(exit, done).unwrap();
    code.emit_flags_address(Opcode::Load, LOAD_LOCAL, 1).emit(Opcode::Return);

    let (_, result) = run_entry(&proc);
    let exit = result.unwrap();
    assert_eq!(exit.main_return, DataCell::I64(55));
    assert_eq!(exit.status_code, StatusCode::Ok);
}

#[test]
fn test_halt_returns_top_of_stack() {
    let mut proc = ProcBuilder::new(0, 0);
    proc.code.emit_i64(8).emit_i64(9).emit(Opcode::Halt).emit(Opcode::Abort);
    let (state, result) = run_entry(&proc);
    assert_eq!(result.unwrap().main_return, DataCell::I64(9));
    assert!(!state.is_active());
}

#[test]
fn test_halt_on_empty_stack_returns_nil() {
    let mut proc = ProcBuilder::new(0, 0);
    proc.code.emit(Opcode::Halt);
    let (_, result) = run_entry(&proc);
    let exit = result.unwrap();
    assert_eq!(exit.main_return, DataCell::Nil);
    assert_eq!(exit.status_code, StatusCode::Ok);
}

#[test]
fn test_running_off_the_end_halts() {
    let mut proc = ProcBuilder::new(0, 0);
    proc.code.emit_i64(3);
    let (_, result) = run_entry(&proc);
    let exit = result.unwrap();
    assert_eq!(exit.main_return, DataCell::I64(3));
    assert_eq!(exit.status_code, StatusCode::Ok);
}

#[test]
fn test_callee_leftovers_are_discarded() {
    let mut builder = ObjectBuilder::new();
    let mut callee = ProcBuilder::new(0, 0);
    callee.code.emit_i64(1).emit_i64(2).emit_i64(3).emit(Opcode::Return);
    let callee = builder.add_call("three", CallMode::Normal, &callee, true).unwrap();
    let mut entry = ProcBuilder::new(0, 0);
    entry
        .code
        .emit_i64(100)
        .emit_call(Opcode::CallStatic, 0, callee, 0)
        .emit(Opcode::I64Add)
        .emit(Opcode::Return);
    add_entry(&mut builder, &entry);

    let mut state = load_state(loader(vec![("/ops", builder.build())]), "/ops", InterpreterStateOptions::default());
    let exit = BytecodeInterpreter::new().run(&mut state).unwrap();
    assert_eq!(exit.main_return, DataCell::I64(103));
}

#[test]
fn test_division_by_zero_aborts() {
    let mut proc = ProcBuilder::new(0, 0);
    proc.code.emit_i64(1).emit_i64(0).emit(Opcode::I64Div).emit(Opcode::Return);
    let (state, result) = run_entry(&proc);
    let err = result.unwrap_err();
    assert_eq!(err.condition, InterpreterCondition::InvalidDataStackV2);
    assert_eq!(state.status_code(), StatusCode::Aborted);
    assert!(!state.is_active());
}

#[test]
fn test_abort_import_and_interrupt_conditions() {
    let cases: Vec<(fn(&mut BytecodeBuilder), InterpreterCondition, StatusCode)> = vec![
        (|c| {
            c.emit(Opcode::Abort);
        }, InterpreterCondition::Aborted, StatusCode::Aborted),
        (|c| {
            c.emit_address(Opcode::Import, 0);
        }, InterpreterCondition::RuntimeInvariant, StatusCode::Internal),
        (|c| {
            c.emit(Opcode::Nil).emit(Opcode::Interrupt);
        }, InterpreterCondition::Interrupted, StatusCode::Cancelled),
    ];
    for (emit, condition, status) in cases {
        let mut proc = ProcBuilder::new(0, 0);
        emit(&mut proc.code);
        let (state, result) = run_entry(&proc);
        assert_eq!(result.unwrap_err().condition, condition);
        assert_eq!(state.status_code(), status);
    }
}

#[test]
fn test_self_referencing_initializer_exceeds_recursion() {
    let mut builder = ObjectBuilder::new();
    // the initializer reads the static it initializes
    let mut init = ProcBuilder::new(0, 0);
    init.code.emit_flags_address(Opcode::Load, LOAD_STATIC, 0).emit(Opcode::Return);
    let init = builder.add_call("loop.$init", CallMode::Normal, &init, true).unwrap();
    let looped = builder.add_static("loop", init).unwrap();
    assert_eq!(looped, 0);
    let mut entry = ProcBuilder::new(0, 0);
    entry
        .code
        .emit_flags_address(Opcode::Load, LOAD_STATIC, looped)
        .emit(Opcode::Return);
    add_entry(&mut builder, &entry);

    let options = InterpreterStateOptions { max_recursion_depth: 8, ..Default::default() };
    let mut state = load_state(loader(vec![("/ops", builder.build())]), "/ops", options);
    let mut interp = BytecodeInterpreter::new();
    let err = interp.run(&mut state).unwrap_err();
    assert_eq!(err.condition, InterpreterCondition::ExceededMaximumRecursion);
    assert_eq!(interp.recursion_depth(), 0);
}

#[derive(Default)]
struct Counters {
    before: Cell<u64>,
    after: Cell<u64>,
    interrupted: Cell<Option<DataCell>>,
}

struct CountingInspector {
    counters: Rc<Counters>,
    recover_with: Option<DataCell>,
}

impl AbstractInspector for CountingInspector {
    fn before_op(&mut self, _op: &OpCell, _state: &mut InterpreterState) -> Result<()> {
        self.counters.before.set(self.counters.before.get() + 1);
        Ok(())
    }

    fn after_op(&mut self, _op: &OpCell, _state: &mut InterpreterState) -> Result<()> {
        self.counters.after.set(self.counters.after.get() + 1);
        Ok(())
    }

    fn on_error(&mut self, _op: &OpCell, err: InterpreterError, _state: &mut InterpreterState) -> Result<DataCell> {
        self.recover_with.ok_or(err)
    }

    fn on_halt(&mut self, _op: Option<&OpCell>, main_return: DataCell, _state: &mut InterpreterState) -> Result<DataCell> {
        match main_return {
            DataCell::I64(v) => Ok(DataCell::I64(-v)),
            other => Ok(other),
        }
    }

    fn on_interrupt(&mut self, value: DataCell, _state: &mut InterpreterState) -> Result<()> {
        self.counters.interrupted.set(Some(value));
        Ok(())
    }
}

fn inspected(proc: &ProcBuilder, recover_with: Option<DataCell>) -> (Rc<Counters>, Result<lyric_runtime::InterpreterExit>) {
    let counters = Rc::new(Counters::default());
    let inspector = CountingInspector { counters: counters.clone(), recover_with };
    let mut state = load_state(loader(vec![("/ops", entry_object(proc))]), "/ops", InterpreterStateOptions::default());
    let result = BytecodeInterpreter::with_inspector(Box::new(inspector)).run(&mut state);
    (counters, result)
}

#[test]
fn test_inspector_sees_every_op_and_rewrites_halt() {
    let mut proc = ProcBuilder::new(0, 0);
    proc.code.emit_i64(2).emit_i64(3).emit(Opcode::I64Add).emit(Opcode::Return);
    let (counters, result) = inspected(&proc, None);
    let exit = result.unwrap();
    assert_eq!(exit.main_return, DataCell::I64(-5));
    assert_eq!(exit.instruction_count, 4);
    assert_eq!(counters.before.get(), 4);
    assert_eq!(counters.after.get(), 4);
}

#[test]
fn test_inspector_recovers_from_error() {
    let mut proc = ProcBuilder::new(0, 0);
    proc.code.emit_i64(1).emit_i64(0).emit(Opcode::I64Div).emit(Opcode::Return);
    let (_, result) = inspected(&proc, Some(DataCell::Nil));
    assert_eq!(result.unwrap().main_return, DataCell::Nil);
}

#[test]
fn test_inspector_receives_interrupt_value() {
    let mut proc = ProcBuilder::new(0, 0);
    proc.code.emit_i64(77).emit(Opcode::Interrupt);
    let (counters, result) = inspected(&proc, None);
    assert_eq!(result.unwrap_err().condition, InterpreterCondition::Interrupted);
    assert_eq!(counters.interrupted.get(), Some(DataCell::I64(77)));
}
