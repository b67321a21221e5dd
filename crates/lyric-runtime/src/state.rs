//! Interpreter state: every component a running program needs.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use lyric_common::{ModuleLocation, SymbolPath};
use lyric_object::{BytecodeIterator, LinkageSection, ProcHeader};

use crate::call_cell::CallCell;
use crate::coroutine::StackfulCoroutine;
use crate::data_cell::DataCell;
use crate::error::{InterpreterCondition, InterpreterError, Result, StatusCode};
use crate::heap::AbstractHeap;
use crate::heap_manager::MarkPolicy;
use crate::loader::AbstractLoader;
use crate::port::PortMultiplexer;
use crate::scheduler::SystemScheduler;
use crate::segment_manager::{SegmentManager, DEFAULT_MAX_TABLE_DEPTH};
use crate::type_manager::TypeManager;
use crate::virtual_table::VirtualTable;

/// Instructions executed before the scheduler may switch tasks.
pub const DEFAULT_TIME_SLICE: u32 = 64;
/// Non-blocking polls at each slice boundary.
pub const DEFAULT_FAST_POLL_ITERATIONS: u32 = 4;
/// Nesting limit for sub-interpreters.
pub const DEFAULT_MAX_RECURSION_DEPTH: u32 = 128;

/// Symbol every main module exports as its entry point.
pub const ENTRY_SYMBOL: &str = "$entry";

/// Prelude classes bound to status codes.
const STATUS_CLASSES: &[(&str, StatusCode)] = &[
    ("Cancelled", StatusCode::Cancelled),
    ("Aborted", StatusCode::Aborted),
    ("Internal", StatusCode::Internal),
    ("FailedPrecondition", StatusCode::FailedPrecondition),
    ("Unknown", StatusCode::Unknown),
];

#[derive(Debug, Clone)]
pub struct InterpreterStateOptions {
    pub prelude_location: Option<ModuleLocation>,
    pub main_arguments: Vec<String>,
    pub time_slice: u32,
    pub fast_poll_iterations: u32,
    pub max_recursion_depth: u32,
    pub max_table_depth: usize,
    pub mark_policy: MarkPolicy,
}

impl Default for InterpreterStateOptions {
    fn default() -> Self {
        Self {
            prelude_location: None,
            main_arguments: Vec::new(),
            time_slice: DEFAULT_TIME_SLICE,
            fast_poll_iterations: DEFAULT_FAST_POLL_ITERATIONS,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            max_table_depth: DEFAULT_MAX_TABLE_DEPTH,
            mark_policy: MarkPolicy::default(),
        }
    }
}

pub(crate) fn no_current_coro() -> InterpreterError {
    InterpreterError::invariant("no current coroutine")
}

/// Owns the segments, heap, scheduler and ports of one program. Components
/// are separate fields so the interpreter can borrow them independently.
pub struct InterpreterState {
    options: InterpreterStateOptions,
    pub(crate) segment_manager: SegmentManager,
    pub(crate) heap: AbstractHeap,
    pub(crate) scheduler: SystemScheduler,
    pub(crate) type_manager: TypeManager,
    pub(crate) ports: PortMultiplexer,
    pub(crate) status_tables: HashMap<StatusCode, Arc<VirtualTable>>,
    pub(crate) main_arguments: Vec<DataCell>,
    prelude_segment: Option<u32>,
    main_location: Option<ModuleLocation>,
    load_epoch_millis: u64,
    status_code: StatusCode,
    active: bool,
}

impl InterpreterState {
    pub fn create(loader: Box<dyn AbstractLoader>, options: InterpreterStateOptions) -> Self {
        let segment_manager = SegmentManager::with_max_table_depth(loader, options.max_table_depth);
        Self {
            options,
            segment_manager,
            heap: AbstractHeap::new(),
            scheduler: SystemScheduler::new(),
            type_manager: TypeManager::new(),
            ports: PortMultiplexer::new(),
            status_tables: HashMap::new(),
            main_arguments: Vec::new(),
            prelude_segment: None,
            main_location: None,
            load_epoch_millis: 0,
            status_code: StatusCode::Unknown,
            active: false,
        }
    }

    /// Load the prelude and the main module and point the main task at the
    /// main module's entry proc.
    pub fn load(&mut self, main_location: &ModuleLocation) -> Result<()> {
        if !main_location.is_absolute() {
            return Err(InterpreterError::invariant(format!("main location {} must be absolute", main_location)));
        }

        if let Some(prelude_location) = self.options.prelude_location.clone() {
            let prelude = self.segment_manager.get_or_load_segment(&prelude_location)?;
            self.type_manager = TypeManager::from_prelude(&mut self.segment_manager, prelude)?;
            self.status_tables = self.resolve_status_tables(prelude)?;
            self.prelude_segment = Some(prelude);
        }

        let main = self.segment_manager.get_or_load_segment(main_location)?;
        let segment = self.segment_manager.segment(main)?;
        let entry = SymbolPath::new([ENTRY_SYMBOL]);
        let symbol = segment
            .object()
            .find_symbol(&entry)
            .ok_or_else(|| InterpreterError::new(InterpreterCondition::MissingSymbol, format!("{}#{}", main_location, entry)))?;
        if symbol.section != LinkageSection::Call {
            return Err(InterpreterError::invariant("entry symbol must be a CALL"));
        }
        let call_index = symbol.index;
        let call = segment
            .object()
            .get_call(call_index)
            .ok_or_else(|| InterpreterError::invariant("missing entry call"))?;
        let bytecode = segment.bytecode().clone();
        let header = ProcHeader::read(&bytecode, call.proc_offset)?;
        if header.num_arguments > 0 || header.num_lexicals() > 0 {
            return Err(InterpreterError::invariant("invalid proc header for entry call"));
        }
        let ip = BytecodeIterator::at(bytecode, header.code_offset)
            .ok_or_else(|| InterpreterError::invariant("invalid entry code offset"))?;
        let frame = CallCell::new(call_index, main, call.proc_offset, true).with_locals(header.num_locals);

        let main_task = self.scheduler.main_task();
        let coro = self
            .scheduler
            .main_coro_mut()
            .ok_or_else(|| InterpreterError::invariant("missing main task"))?;
        coro.reset();
        coro.push_call(frame, ip, main);
        self.scheduler.resume_task(main_task)?;
        self.scheduler.select_next_ready();

        let arguments = self.options.main_arguments.clone();
        let cells: Vec<DataCell> = arguments.into_iter().map(|a| self.allocate_string(a)).collect();
        self.main_arguments = cells;

        self.main_location = Some(main_location.clone());
        self.load_epoch_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.status_code = StatusCode::Unknown;
        self.active = true;
        log::debug!("loaded {} as segment {}", main_location, main);
        Ok(())
    }

    fn resolve_status_tables(&mut self, prelude: u32) -> Result<HashMap<StatusCode, Arc<VirtualTable>>> {
        let mut tables = HashMap::new();
        for (name, code) in STATUS_CLASSES {
            let symbol = self
                .segment_manager
                .segment(prelude)?
                .object()
                .find_symbol(&SymbolPath::new([*name]))
                .filter(|s| s.section == LinkageSection::Class)
                .map(|s| s.index);
            let Some(index) = symbol else {
                log::trace!("prelude has no status class {}", name);
                continue;
            };
            let descriptor = DataCell::for_descriptor(LinkageSection::Class, prelude, index)
                .ok_or_else(|| InterpreterError::invariant("invalid status class"))?;
            let table = self.segment_manager.resolve_class_virtual_table(&descriptor)?;
            tables.insert(*code, table);
        }
        Ok(tables)
    }

    /// Stop the program with `status_code`.
    pub fn halt(&mut self, status_code: StatusCode) -> Result<()> {
        if !self.active {
            return Err(InterpreterError::invariant("cannot halt inactive interpreter"));
        }
        log::debug!("interpreter halted with {:?}", status_code);
        self.status_code = status_code;
        self.active = false;
        Ok(())
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[inline]
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    #[inline]
    pub fn load_epoch_millis(&self) -> u64 {
        self.load_epoch_millis
    }

    #[inline]
    pub fn options(&self) -> &InterpreterStateOptions {
        &self.options
    }

    pub fn main_location(&self) -> Option<&ModuleLocation> {
        self.main_location.as_ref()
    }

    #[inline]
    pub fn prelude_segment(&self) -> Option<u32> {
        self.prelude_segment
    }

    /// Main arguments as string cells.
    pub fn main_arguments(&self) -> &[DataCell] {
        &self.main_arguments
    }

    pub fn segment_manager(&self) -> &SegmentManager {
        &self.segment_manager
    }

    pub fn segment_manager_mut(&mut self) -> &mut SegmentManager {
        &mut self.segment_manager
    }

    pub fn heap(&self) -> &AbstractHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut AbstractHeap {
        &mut self.heap
    }

    pub fn scheduler(&self) -> &SystemScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut SystemScheduler {
        &mut self.scheduler
    }

    pub fn type_manager(&self) -> &TypeManager {
        &self.type_manager
    }

    pub fn port_multiplexer(&self) -> &PortMultiplexer {
        &self.ports
    }

    pub fn port_multiplexer_mut(&mut self) -> &mut PortMultiplexer {
        &mut self.ports
    }

    pub fn current_coro(&self) -> Result<&StackfulCoroutine> {
        self.scheduler.current_coro().ok_or_else(no_current_coro)
    }

    pub fn current_coro_mut(&mut self) -> Result<&mut StackfulCoroutine> {
        self.scheduler.current_coro_mut().ok_or_else(no_current_coro)
    }
}
