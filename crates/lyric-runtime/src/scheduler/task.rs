//! Tasks.

use std::collections::VecDeque;
use std::fmt;

use crate::coroutine::StackfulCoroutine;
use crate::data_cell::DataCell;
use crate::scheduler::event_loop::WaiterId;
use crate::scheduler::promise::PromiseRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u32);

impl TaskId {
    #[inline]
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Main,
    Worker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Initial,
    Ready,
    Running,
    Waiting,
    Done,
}

pub struct Task {
    id: TaskId,
    task_type: TaskType,
    pub(crate) state: TaskState,
    coro: StackfulCoroutine,
    pub(crate) promises: VecDeque<PromiseRef>,
    pub(crate) monitor: Option<WaiterId>,
    pub(crate) result: DataCell,
}

impl Task {
    pub(crate) fn new(id: TaskId, task_type: TaskType, state: TaskState) -> Self {
        Self {
            id,
            task_type,
            state,
            coro: StackfulCoroutine::new(),
            promises: VecDeque::new(),
            monitor: None,
            result: DataCell::Invalid,
        }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[inline]
    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        self.state
    }

    #[inline]
    pub fn coro(&self) -> &StackfulCoroutine {
        &self.coro
    }

    #[inline]
    pub fn coro_mut(&mut self) -> &mut StackfulCoroutine {
        &mut self.coro
    }

    /// Value left on the data stack when the task terminated.
    #[inline]
    pub fn result(&self) -> DataCell {
        self.result
    }

    /// Promises waiting to be adapted before the task resumes.
    pub fn pending_promises(&self) -> impl Iterator<Item = &PromiseRef> {
        self.promises.iter()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("task_type", &self.task_type)
            .field("state", &self.state)
            .field("pending_promises", &self.promises.len())
            .finish()
    }
}
