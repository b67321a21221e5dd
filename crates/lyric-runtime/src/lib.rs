//! Lyric runtime.
//!
//! Loads assembled objects into segments, links them lazily, and runs their
//! bytecode on cooperatively scheduled stackful coroutines.
//!
//! - `segment_manager`: segment cache, link resolution, virtual table cache
//! - `heap`: generational handle arena and the refs it owns
//! - `coroutine`: call, data and guard stacks of one task
//! - `scheduler`: tasks, promises, waiters and the event loop
//! - `interpreter`: the fetch/decode/execute loop and native traps
//! - `port`: duplex message ports shared with the host

pub mod call_cell;
pub mod coroutine;
pub mod data_cell;
pub mod error;
pub mod heap;
pub mod heap_manager;
pub mod inspector;
pub mod interpreter;
pub mod loader;
pub mod plugin;
pub mod port;
pub mod scheduler;
pub mod segment;
pub mod segment_manager;
pub mod state;
pub mod subroutine;
pub mod table_builder;
pub mod type_manager;
pub mod virtual_table;

pub use call_cell::CallCell;
pub use coroutine::StackfulCoroutine;
pub use data_cell::{DataCell, DataCellType};
pub use error::{InterpreterCondition, InterpreterError, Result, StatusCode};
pub use heap::{AbstractHeap, AbstractRef, BaseRef, RefHandle};
pub use heap_manager::{GcStats, MarkPolicy};
pub use inspector::AbstractInspector;
pub use interpreter::{BytecodeInterpreter, InterpreterExit};
pub use loader::{AbstractLoader, ChainLoader, DirectoryLoader, StaticLoader};
pub use plugin::{base_allocator, AbstractPlugin, NativeFunc, TrapTable};
pub use port::{receive_promise, DuplexPort, PortMessage, PortMultiplexer, PortWriter};
pub use scheduler::{AsyncHandle, Promise, PromiseState, SystemScheduler, Task, TaskId, TaskState, TaskType};
pub use segment::BytecodeSegment;
pub use segment_manager::SegmentManager;
pub use state::{InterpreterState, InterpreterStateOptions};
pub use type_manager::{TypeComparison, TypeManager};
pub use virtual_table::{ImplTable, TableKind, VirtualMember, VirtualMethod, VirtualTable};
