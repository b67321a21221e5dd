//! Far addresses resolve through links the first time they are used.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::*;
use lyric_common::ModuleLocation;
use lyric_object::*;
use lyric_runtime::{
    AbstractLoader, AbstractPlugin, BytecodeInterpreter, DataCell, InterpreterCondition, InterpreterStateOptions,
    InterpreterState, Result, StaticLoader, StatusCode,
};
use pretty_assertions::assert_eq;

/// Records every module request before delegating.
struct CountingLoader {
    inner: StaticLoader,
    requests: Rc<RefCell<Vec<String>>>,
}

impl AbstractLoader for CountingLoader {
    fn has_module(&self, location: &ModuleLocation) -> Result<bool> {
        self.inner.has_module(location)
    }

    fn load_module(&mut self, location: &ModuleLocation) -> Result<Option<LyricObject>> {
        self.requests.borrow_mut().push(location.to_string());
        self.inner.load_module(location)
    }

    fn load_plugin(&mut self, location: &ModuleLocation, specifier: &str) -> Result<Option<Box<dyn AbstractPlugin>>> {
        self.inner.load_plugin(location, specifier)
    }
}

fn library() -> LyricObject {
    let mut builder = ObjectBuilder::new();
    add_point(&mut builder);
    builder.build()
}

/// Main module whose entry only reaches `Point` through `links`.
fn linked_main(class_url: &str, emit: impl FnOnce(&mut BytecodeBuilder, u32, u32)) -> LyricObject {
    let mut builder = ObjectBuilder::new();
    let class = builder.add_link(LinkageSection::Class, class_url).unwrap();
    let sum = builder.add_link(LinkageSection::Call, "/lib#Point.sum").unwrap();
    let mut entry = ProcBuilder::new(0, 0);
    emit(&mut entry.code, class, sum);
    add_entry(&mut builder, &entry);
    builder.build()
}

fn counting_state(main: LyricObject) -> (InterpreterState, Rc<RefCell<Vec<String>>>) {
    let requests = Rc::new(RefCell::new(Vec::new()));
    let inner = loader(vec![("/main", main), ("/lib", library())]);
    let loader = CountingLoader { inner, requests: requests.clone() };
    let mut state = InterpreterState::create(Box::new(loader), InterpreterStateOptions::default());
    state.load(&location("/main")).unwrap();
    (state, requests)
}

#[test]
fn test_library_loads_on_first_use() {
    let main = linked_main("/lib#Point", |code, class, sum| {
        emit_new_point(code, class, 3, 4);
        code.emit(Opcode::Pop);
        emit_new_point(code, class, 3, 4);
        code.emit_call(Opcode::CallVirtual, 0, sum, 0).emit(Opcode::Return);
    });
    let (mut state, requests) = counting_state(main);
    assert_eq!(*requests.borrow(), vec!["/main"]);
    assert_eq!(state.segment_manager().find_segment(&location("/lib")), None);

    let exit = BytecodeInterpreter::new().run(&mut state).unwrap();
    assert_eq!(exit.main_return, DataCell::I64(7));
    assert_eq!(*requests.borrow(), vec!["/main", "/lib"]);
    assert_eq!(state.segment_manager().find_segment(&location("/lib")), Some(1));
}

#[test]
fn test_unused_links_never_load() {
    let main = linked_main("/lib#Point", |code, _, _| {
        code.emit(Opcode::Nil).emit(Opcode::Return);
    });
    let (mut state, requests) = counting_state(main);
    BytecodeInterpreter::new().run(&mut state).unwrap();
    assert_eq!(*requests.borrow(), vec!["/main"]);
}

#[test]
fn test_missing_module_fails_precondition() {
    let main = linked_main("/absent#Point", |code, class, _| {
        emit_new_point(code, class, 1, 2);
        code.emit(Opcode::Return);
    });
    let (mut state, _) = counting_state(main);
    let err = BytecodeInterpreter::new().run(&mut state).unwrap_err();
    assert_eq!(err.condition, InterpreterCondition::MissingAssembly);
    assert_eq!(state.status_code(), StatusCode::FailedPrecondition);
}

#[test]
fn test_missing_symbol_fails_precondition() {
    let main = linked_main("/lib#Polygon", |code, class, _| {
        emit_new_point(code, class, 1, 2);
        code.emit(Opcode::Return);
    });
    let (mut state, _) = counting_state(main);
    let err = BytecodeInterpreter::new().run(&mut state).unwrap_err();
    assert_eq!(err.condition, InterpreterCondition::MissingSymbol);
    assert!(err.message.contains("Polygon"));
}

#[test]
fn test_linkage_section_mismatch() {
    // the link names a call but NEW expects a class
    let main = linked_main("/lib#Point.sum", |code, class, _| {
        emit_new_point(code, class, 1, 2);
        code.emit(Opcode::Return);
    });
    let (mut state, _) = counting_state(main);
    let err = BytecodeInterpreter::new().run(&mut state).unwrap_err();
    assert_eq!(err.condition, InterpreterCondition::RuntimeInvariant);
    assert!(err.message.contains("invalid linkage"));
    assert_eq!(state.status_code(), StatusCode::Internal);
}

#[test]
fn test_relative_link_targets_own_module() {
    let mut builder = ObjectBuilder::new();
    let point = add_point(&mut builder);
    let class = builder.add_link(LinkageSection::Class, "#Point").unwrap();
    let mut entry = ProcBuilder::new(0, 0);
    emit_new_point(&mut entry.code, class, 20, 22);
    entry.code.emit_call(Opcode::CallVirtual, 0, point.sum, 0).emit(Opcode::Return);
    add_entry(&mut builder, &entry);

    let (mut state, requests) = counting_state(builder.build());
    let exit = BytecodeInterpreter::new().run(&mut state).unwrap();
    assert_eq!(exit.main_return, DataCell::I64(42));
    assert_eq!(*requests.borrow(), vec!["/main"]);
}
