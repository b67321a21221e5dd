//! Timers and cross-thread wakeups.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaiterId(u64);

impl WaiterId {
    #[inline]
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for WaiterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "waiter#{}", self.0)
    }
}

/// Wakes one async waiter from any thread. Sending after the waiter fired is
/// harmless.
#[derive(Debug, Clone)]
pub struct AsyncHandle {
    waiter: WaiterId,
    sender: Sender<WaiterId>,
}

impl AsyncHandle {
    #[inline]
    pub fn waiter(&self) -> WaiterId {
        self.waiter
    }

    /// Returns false if the event loop is gone.
    pub fn send(&self) -> bool {
        self.sender.send(self.waiter).is_ok()
    }
}

pub(crate) struct EventLoop {
    next_id: u64,
    timers: BinaryHeap<Reverse<(Instant, u64, WaiterId)>>,
    signalled: VecDeque<WaiterId>,
    sender: Sender<WaiterId>,
    receiver: Receiver<WaiterId>,
}

impl EventLoop {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { next_id: 0, timers: BinaryHeap::new(), signalled: VecDeque::new(), sender, receiver }
    }

    pub fn next_waiter_id(&mut self) -> WaiterId {
        self.next_id += 1;
        WaiterId(self.next_id)
    }

    pub fn add_timer(&mut self, deadline: Instant, waiter: WaiterId) {
        self.timers.push(Reverse((deadline, waiter.0, waiter)));
    }

    pub fn async_handle(&self, waiter: WaiterId) -> AsyncHandle {
        AsyncHandle { waiter, sender: self.sender.clone() }
    }

    /// Signal a waiter from the interpreter thread.
    pub fn signal(&mut self, waiter: WaiterId) {
        self.signalled.push_back(waiter);
    }

    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.peek().map(|Reverse((deadline, _, _))| *deadline)
    }

    /// Every waiter that is ready at `now`, in signal order then deadline order.
    pub fn collect_ready(&mut self, now: Instant) -> Vec<WaiterId> {
        let mut ready: Vec<WaiterId> = self.signalled.drain(..).collect();
        while let Ok(waiter) = self.receiver.try_recv() {
            ready.push(waiter);
        }
        while let Some(Reverse((deadline, _, waiter))) = self.timers.peek().copied() {
            if deadline > now {
                break;
            }
            self.timers.pop();
            ready.push(waiter);
        }
        ready
    }

    /// Block until an async signal arrives or the next timer expires.
    /// `block_on_async` allows waiting without a deadline.
    pub fn wait(&mut self, block_on_async: bool) -> Vec<WaiterId> {
        if !self.signalled.is_empty() {
            return self.collect_ready(Instant::now());
        }
        let received = match self.next_deadline() {
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(Instant::now());
                if block_on_async {
                    self.recv_timeout(timeout)
                } else {
                    std::thread::sleep(timeout);
                    None
                }
            }
            None if block_on_async => self.receiver.recv().ok(),
            None => None,
        };
        let mut ready: Vec<WaiterId> = received.into_iter().collect();
        ready.extend(self.collect_ready(Instant::now()));
        ready
    }

    fn recv_timeout(&self, timeout: Duration) -> Option<WaiterId> {
        match self.receiver.recv_timeout(timeout) {
            Ok(waiter) => Some(waiter),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
