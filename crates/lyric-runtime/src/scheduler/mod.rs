//! Cooperative task scheduling.
//!
//! Every task sits in at most one of the ready, wait and done queues. The
//! running task is always the head of the ready queue; switching rotates it
//! to the tail so ready tasks run in FIFO order.

pub mod event_loop;
pub mod promise;
pub mod task;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use indexmap::IndexMap;

pub use event_loop::{AsyncHandle, WaiterId};
pub use promise::{AcceptFunc, AdaptFunc, Promise, PromiseRef, PromiseState, ReleaseFunc};
pub use task::{Task, TaskId, TaskState, TaskType};

use crate::coroutine::StackfulCoroutine;
use crate::data_cell::DataCell;
use crate::error::{InterpreterError, Result};
use event_loop::EventLoop;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaiterKind {
    Worker,
    Timer,
    Async,
}

struct Waiter {
    kind: WaiterKind,
    task: Option<TaskId>,
    promise: PromiseRef,
}

fn detach(queue: &mut VecDeque<TaskId>, id: TaskId) {
    if let Some(pos) = queue.iter().position(|t| *t == id) {
        queue.remove(pos);
    }
}

pub struct SystemScheduler {
    tasks: HashMap<TaskId, Task>,
    next_task_id: u32,
    main_task: TaskId,
    current: Option<TaskId>,
    ready: VecDeque<TaskId>,
    wait: VecDeque<TaskId>,
    done: VecDeque<TaskId>,
    waiters: IndexMap<WaiterId, Waiter>,
    event_loop: EventLoop,
}

impl Default for SystemScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemScheduler {
    /// The main task starts out waiting.
    pub fn new() -> Self {
        let main_task = TaskId::new(0);
        let mut tasks = HashMap::new();
        tasks.insert(main_task, Task::new(main_task, TaskType::Main, TaskState::Waiting));
        Self {
            tasks,
            next_task_id: 1,
            main_task,
            current: None,
            ready: VecDeque::new(),
            wait: VecDeque::from([main_task]),
            done: VecDeque::new(),
            waiters: IndexMap::new(),
            event_loop: EventLoop::new(),
        }
    }

    #[inline]
    pub fn main_task(&self) -> TaskId {
        self.main_task
    }

    #[inline]
    pub fn current_task(&self) -> Option<TaskId> {
        self.current
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    fn task_or_err(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks
            .get_mut(&id)
            .ok_or_else(|| InterpreterError::invariant(format!("unknown {}", id)))
    }

    pub fn main_coro(&self) -> Option<&StackfulCoroutine> {
        self.tasks.get(&self.main_task).map(Task::coro)
    }

    pub fn main_coro_mut(&mut self) -> Option<&mut StackfulCoroutine> {
        self.tasks.get_mut(&self.main_task).map(Task::coro_mut)
    }

    pub fn current_coro(&self) -> Option<&StackfulCoroutine> {
        self.current.and_then(|id| self.tasks.get(&id)).map(Task::coro)
    }

    pub fn current_coro_mut(&mut self) -> Option<&mut StackfulCoroutine> {
        let id = self.current?;
        self.tasks.get_mut(&id).map(Task::coro_mut)
    }

    pub fn first_ready_task(&self) -> Option<TaskId> {
        self.ready.front().copied()
    }

    pub fn first_waiting_task(&self) -> Option<TaskId> {
        self.wait.front().copied()
    }

    pub fn ready_tasks(&self) -> impl Iterator<Item = &Task> {
        self.ready.iter().filter_map(|id| self.tasks.get(id))
    }

    pub fn waiting_tasks(&self) -> impl Iterator<Item = &Task> {
        self.wait.iter().filter_map(|id| self.tasks.get(id))
    }

    pub fn done_tasks(&self) -> impl Iterator<Item = &Task> {
        self.done.iter().filter_map(|id| self.tasks.get(id))
    }

    #[inline]
    pub fn num_waiters(&self) -> usize {
        self.waiters.len()
    }

    /// Promises attached to pending waiters, in registration order.
    pub fn waiter_promises(&self) -> impl Iterator<Item = &PromiseRef> {
        self.waiters.values().map(|w| &w.promise)
    }

    /// Pick the task to run next; see the module docs for the ordering.
    pub fn select_next_ready(&mut self) -> Option<TaskId> {
        let Some(current) = self.current else {
            let next = self.ready.front().copied();
            if let Some(task) = next.and_then(|id| self.tasks.get_mut(&id)) {
                task.state = TaskState::Running;
            }
            self.current = next;
            return next;
        };
        if self.ready.len() <= 1 {
            return Some(current);
        }
        detach(&mut self.ready, current);
        if let Some(task) = self.tasks.get_mut(&current) {
            task.state = TaskState::Ready;
        }
        self.ready.push_back(current);
        let next = self.ready.front().copied();
        if let Some(task) = next.and_then(|id| self.tasks.get_mut(&id)) {
            task.state = TaskState::Running;
            log::trace!("switching from {} to {}", current, task.id());
        }
        self.current = next;
        next
    }

    /// New worker task in the `Initial` state. Set up its coroutine, then
    /// call [`start_task`](Self::start_task).
    pub fn create_task(&mut self) -> TaskId {
        let id = TaskId::new(self.next_task_id);
        self.next_task_id += 1;
        self.tasks.insert(id, Task::new(id, TaskType::Worker, TaskState::Initial));
        id
    }

    pub fn start_task(&mut self, id: TaskId) -> Result<()> {
        let task = self.task_or_err(id)?;
        if task.state != TaskState::Initial {
            return Err(InterpreterError::invariant(format!("{} cannot be started from {:?}", id, task.state)));
        }
        task.state = TaskState::Ready;
        self.ready.push_back(id);
        Ok(())
    }

    pub fn suspend_task(&mut self, id: TaskId) -> Result<()> {
        let task = self.task_or_err(id)?;
        match task.state {
            TaskState::Waiting => return Ok(()),
            TaskState::Ready | TaskState::Running => {}
            state => return Err(InterpreterError::invariant(format!("{} cannot be suspended from {:?}", id, state))),
        }
        task.state = TaskState::Waiting;
        detach(&mut self.ready, id);
        if self.current == Some(id) {
            self.current = None;
        }
        self.wait.push_back(id);
        Ok(())
    }

    pub fn resume_task(&mut self, id: TaskId) -> Result<()> {
        let task = self.task_or_err(id)?;
        match task.state {
            TaskState::Ready | TaskState::Running => return Ok(()),
            TaskState::Waiting => {}
            state => return Err(InterpreterError::invariant(format!("{} cannot be resumed from {:?}", id, state))),
        }
        task.state = TaskState::Ready;
        detach(&mut self.wait, id);
        self.ready.push_back(id);
        Ok(())
    }

    /// Move a task to the done queue, recording its result and signalling
    /// its monitor.
    pub fn terminate_task(&mut self, id: TaskId) -> Result<()> {
        let task = self.task_or_err(id)?;
        let previous = task.state;
        match previous {
            TaskState::Initial => return Ok(()),
            TaskState::Done => return Err(InterpreterError::invariant(format!("{} is already done", id))),
            _ => {}
        }
        task.state = TaskState::Done;
        let result = task.coro().data().next().copied().unwrap_or(DataCell::Nil);
        task.result = result;
        let monitor = task.monitor.take();
        match previous {
            TaskState::Ready | TaskState::Running => detach(&mut self.ready, id),
            _ => detach(&mut self.wait, id),
        }
        if self.current == Some(id) {
            self.current = None;
        }
        self.done.push_back(id);
        log::debug!("{} terminated with {}", id, result);

        if let Some(monitor) = monitor {
            if let Some(waiter) = self.waiters.get(&monitor) {
                waiter.promise.borrow_mut().set_result(result);
            }
            self.event_loop.signal(monitor);
        }
        Ok(())
    }

    pub fn destroy_task(&mut self, id: TaskId) -> Result<()> {
        let task = self.task_or_err(id)?;
        if task.state != TaskState::Done {
            return Err(InterpreterError::invariant(format!("{} is not done", id)));
        }
        detach(&mut self.done, id);
        self.tasks.remove(&id);
        Ok(())
    }

    fn attach_waiter(&mut self, kind: WaiterKind, promise: PromiseRef) -> Result<WaiterId> {
        let id = self.event_loop.next_waiter_id();
        if !promise.borrow_mut().attach(id) {
            return Err(InterpreterError::invariant("promise is already attached"));
        }
        self.waiters.insert(id, Waiter { kind, task: None, promise });
        Ok(id)
    }

    /// Complete `promise` with the worker's result when the worker terminates.
    pub fn register_worker(&mut self, worker: TaskId, promise: PromiseRef) -> Result<()> {
        self.task_or_err(worker)?;
        let id = self.attach_waiter(WaiterKind::Worker, promise)?;
        if let Some(task) = self.tasks.get_mut(&worker) {
            task.monitor = Some(id);
        }
        Ok(())
    }

    pub fn register_timer(&mut self, timeout: Duration, promise: PromiseRef) -> Result<()> {
        let id = self.attach_waiter(WaiterKind::Timer, promise)?;
        self.event_loop.add_timer(Instant::now() + timeout, id);
        Ok(())
    }

    /// The returned handle may be sent to another thread to complete the promise.
    pub fn register_async(&mut self, promise: PromiseRef) -> Result<AsyncHandle> {
        let id = self.attach_waiter(WaiterKind::Async, promise)?;
        Ok(self.event_loop.async_handle(id))
    }

    /// Suspend the current task until `promise` settles. If it already has,
    /// the promise is queued for adaptation and the task keeps running.
    pub fn await_promise(&mut self, promise: &PromiseRef) -> Result<()> {
        let current = self
            .current
            .ok_or_else(|| InterpreterError::invariant("no current task to await"))?;
        let (settled, waiter) = {
            let p = promise.borrow();
            (p.is_settled(), p.waiter())
        };
        if settled {
            if promise.borrow().needs_adapt() {
                self.task_or_err(current)?.promises.push_back(promise.clone());
            }
            return Ok(());
        }
        let waiter = waiter
            .and_then(|id| self.waiters.get_mut(&id))
            .ok_or_else(|| InterpreterError::invariant("promise has no waiter"))?;
        waiter.task = Some(current);
        self.suspend_task(current)
    }

    /// Take the promises queued on a task for adaptation.
    pub fn take_pending_promises(&mut self, id: TaskId) -> Vec<PromiseRef> {
        self.tasks
            .get_mut(&id)
            .map(|t| t.promises.drain(..).collect())
            .unwrap_or_default()
    }

    fn fire_waiter(&mut self, id: WaiterId) -> Result<()> {
        let Some(waiter) = self.waiters.shift_remove(&id) else {
            return Ok(());
        };
        log::trace!("firing {:?} {}", waiter.kind, id);
        if let Some(task) = waiter.task {
            self.resume_task(task)?;
        }
        let needs_adapt = {
            let mut promise = waiter.promise.borrow_mut();
            promise.accept();
            promise.detach();
            promise.needs_adapt()
        };
        if needs_adapt {
            if let Some(task) = waiter.task.and_then(|t| self.tasks.get_mut(&t)) {
                task.promises.push_back(waiter.promise.clone());
            }
        }
        Ok(())
    }

    /// Handle every event that is ready without blocking. Returns true when
    /// no waiters remain pending.
    pub fn poll(&mut self) -> Result<bool> {
        for id in self.event_loop.collect_ready(Instant::now()) {
            self.fire_waiter(id)?;
        }
        Ok(self.waiters.is_empty())
    }

    /// Block for the next event if no task is ready. Returns false without
    /// blocking when the ready queue is non-empty.
    pub fn blocking_poll(&mut self) -> Result<bool> {
        if !self.ready.is_empty() {
            return Ok(false);
        }
        if self.wait.is_empty() {
            return Err(InterpreterError::invariant("aborting blocking poll: no tasks are waiting"));
        }
        let ready = self.event_loop.collect_ready(Instant::now());
        let ready = if ready.is_empty() {
            let has_async = self.waiters.values().any(|w| w.kind == WaiterKind::Async);
            if !has_async && !self.event_loop.has_timers() {
                return Err(InterpreterError::invariant(
                    "deadlock: tasks are waiting but no waiter can wake them",
                ));
            }
            self.event_loop.wait(has_async)
        } else {
            ready
        };
        for id in ready {
            self.fire_waiter(id)?;
        }
        Ok(true)
    }
}
