//! Promises resolved by the event loop.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::data_cell::DataCell;
use crate::error::Result;
use crate::scheduler::event_loop::WaiterId;
use crate::state::InterpreterState;

pub type PromiseRef = Rc<RefCell<Promise>>;

/// Runs when the waiter fires, before the promise settles.
pub type AcceptFunc = Box<dyn FnOnce(&mut Promise)>;

/// Runs on the awaiting task right before it resumes.
pub type AdaptFunc = Box<dyn FnOnce(&Promise, &mut InterpreterState) -> Result<()>>;

/// Releases native data attached to the promise.
pub type ReleaseFunc = Box<dyn FnOnce(Box<dyn Any>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseState {
    Initial,
    Pending,
    Completed,
    Rejected,
}

pub struct Promise {
    state: PromiseState,
    result: DataCell,
    waiter: Option<WaiterId>,
    accept: Option<AcceptFunc>,
    adapt: Option<AdaptFunc>,
    data: Option<Box<dyn Any>>,
    release: Option<ReleaseFunc>,
}

fn push_result(promise: &Promise, state: &mut InterpreterState) -> Result<()> {
    state.current_coro_mut()?.push_data(promise.result());
    Ok(())
}

impl Promise {
    /// A promise whose result is pushed onto the awaiting task's data stack.
    pub fn new() -> Self {
        Self::with_adapt(Box::new(push_result))
    }

    pub fn with_adapt(adapt: AdaptFunc) -> Self {
        Self {
            state: PromiseState::Initial,
            result: DataCell::Invalid,
            waiter: None,
            accept: None,
            adapt: Some(adapt),
            data: None,
            release: None,
        }
    }

    /// A promise that leaves the awaiting task's stack untouched.
    pub fn without_adapt() -> Self {
        let mut promise = Self::with_adapt(Box::new(|_, _| Ok(())));
        promise.adapt = None;
        promise
    }

    pub fn into_ref(self) -> PromiseRef {
        Rc::new(RefCell::new(self))
    }

    pub fn set_accept(&mut self, accept: AcceptFunc) {
        self.accept = Some(accept);
    }

    /// Attach native data, released when the promise is dropped.
    pub fn set_data(&mut self, data: Box<dyn Any>, release: Option<ReleaseFunc>) {
        self.data = Some(data);
        self.release = release;
    }

    pub fn data(&self) -> Option<&dyn Any> {
        self.data.as_deref()
    }

    pub fn data_mut(&mut self) -> Option<&mut dyn Any> {
        self.data.as_deref_mut()
    }

    #[inline]
    pub fn state(&self) -> PromiseState {
        self.state
    }

    #[inline]
    pub fn result(&self) -> DataCell {
        self.result
    }

    pub fn set_result(&mut self, result: DataCell) {
        self.result = result;
    }

    #[inline]
    pub fn waiter(&self) -> Option<WaiterId> {
        self.waiter
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.state, PromiseState::Completed | PromiseState::Rejected)
    }

    /// Bind to a waiter; `Initial -> Pending`.
    pub(crate) fn attach(&mut self, waiter: WaiterId) -> bool {
        if self.state != PromiseState::Initial {
            return false;
        }
        self.waiter = Some(waiter);
        self.state = PromiseState::Pending;
        true
    }

    pub(crate) fn detach(&mut self) {
        self.waiter = None;
    }

    /// Run the accept callback, then complete the promise unless the callback
    /// settled it.
    pub(crate) fn accept(&mut self) {
        if let Some(accept) = self.accept.take() {
            accept(self);
        }
        if self.state == PromiseState::Pending {
            self.state = PromiseState::Completed;
        }
    }

    pub fn complete(&mut self, result: DataCell) -> bool {
        self.settle(PromiseState::Completed, result)
    }

    pub fn reject(&mut self, result: DataCell) -> bool {
        self.settle(PromiseState::Rejected, result)
    }

    fn settle(&mut self, state: PromiseState, result: DataCell) -> bool {
        if self.is_settled() {
            return false;
        }
        self.state = state;
        self.result = result;
        true
    }

    #[inline]
    pub fn needs_adapt(&self) -> bool {
        self.adapt.is_some()
    }

    pub(crate) fn take_adapt(&mut self) -> Option<AdaptFunc> {
        self.adapt.take()
    }
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Promise {
    fn drop(&mut self) {
        if let (Some(data), Some(release)) = (self.data.take(), self.release.take()) {
            release(data);
        }
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state)
            .field("result", &self.result)
            .field("waiter", &self.waiter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_state_moves_forward_only() {
        let mut promise = Promise::new();
        assert!(promise.attach(WaiterId::new(1)));
        assert!(!promise.attach(WaiterId::new(2)));
        assert_eq!(promise.state(), PromiseState::Pending);
        promise.accept();
        assert_eq!(promise.state(), PromiseState::Completed);
        assert!(!promise.reject(DataCell::Nil));
        assert_eq!(promise.state(), PromiseState::Completed);
    }

    #[test]
    fn test_accept_may_reject() {
        let mut promise = Promise::without_adapt();
        promise.attach(WaiterId::new(1));
        promise.set_accept(Box::new(|p| {
            p.reject(DataCell::I64(-1));
        }));
        promise.accept();
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert_eq!(promise.result(), DataCell::I64(-1));
        assert!(!promise.needs_adapt());
    }

    #[test]
    fn test_release_runs_on_drop() {
        let released = Rc::new(Cell::new(false));
        let flag = released.clone();
        let mut promise = Promise::new();
        promise.set_data(Box::new(5u32), Some(Box::new(move |data| {
            assert_eq!(data.downcast_ref::<u32>(), Some(&5));
            flag.set(true);
        })));
        assert_eq!(promise.data().and_then(|d| d.downcast_ref::<u32>()), Some(&5));
        drop(promise);
        assert!(released.get());
    }
}
