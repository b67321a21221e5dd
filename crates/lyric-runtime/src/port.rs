//! Duplex message ports shared between the interpreter and its host.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::data_cell::DataCell;
use crate::error::{InterpreterError, Result};
use crate::scheduler::{AsyncHandle, Promise, PromiseRef, SystemScheduler};
use crate::state::InterpreterState;

pub type PortMessage = Vec<u8>;

/// Host side sink for messages sent by the interpreter.
pub trait PortWriter: Send {
    fn write(&mut self, message: PortMessage);
}

impl<F> PortWriter for F
where
    F: FnMut(PortMessage) + Send,
{
    fn write(&mut self, message: PortMessage) {
        self(message)
    }
}

#[derive(Default)]
struct PortQueues {
    writer: Option<Box<dyn PortWriter>>,
    outgoing: VecDeque<PortMessage>,
    incoming: VecDeque<PortMessage>,
    readers: Vec<AsyncHandle>,
}

/// A named bidirectional port. Messages sent while no writer is attached
/// are queued and flushed in order on attach. Messages delivered by the host
/// wait in the incoming queue until the interpreter receives them.
pub struct DuplexPort {
    url: String,
    queues: Mutex<PortQueues>,
}

impl DuplexPort {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), queues: Mutex::new(PortQueues::default()) }
    }

    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Attach a writer and flush queued messages to it. Fails if a writer is
    /// already attached.
    pub fn attach(&self, mut writer: Box<dyn PortWriter>) -> Result<()> {
        let mut queues = self.queues.lock();
        if queues.writer.is_some() {
            return Err(InterpreterError::invariant(format!("port {} already has a writer", self.url)));
        }
        let flushed = queues.outgoing.len();
        while let Some(message) = queues.outgoing.pop_front() {
            writer.write(message);
        }
        queues.writer = Some(writer);
        log::debug!("attached writer to port {}, flushed {} messages", self.url, flushed);
        Ok(())
    }

    pub fn detach(&self) -> Option<Box<dyn PortWriter>> {
        let writer = self.queues.lock().writer.take();
        if writer.is_some() {
            log::debug!("detached writer from port {}", self.url);
        }
        writer
    }

    pub fn has_writer(&self) -> bool {
        self.queues.lock().writer.is_some()
    }

    /// Send a message to the host, queueing it while no writer is attached.
    pub fn send(&self, message: PortMessage) {
        let mut queues = self.queues.lock();
        match queues.writer.as_mut() {
            Some(writer) => writer.write(message),
            None => queues.outgoing.push_back(message),
        }
    }

    /// Messages sent while detached, not yet flushed.
    pub fn queued_count(&self) -> usize {
        self.queues.lock().outgoing.len()
    }

    /// Hand a message from the host to the interpreter and wake every
    /// pending reader. Safe to call from any thread.
    pub fn deliver(&self, message: PortMessage) {
        let readers = {
            let mut queues = self.queues.lock();
            queues.incoming.push_back(message);
            std::mem::take(&mut queues.readers)
        };
        for reader in readers {
            reader.send();
        }
    }

    pub fn receive(&self) -> Option<PortMessage> {
        self.queues.lock().incoming.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.queues.lock().incoming.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.queues.lock().incoming.len()
    }

    /// Register `promise` to complete once a message is waiting. Completes on
    /// the next poll when one already is.
    pub fn readable(&self, scheduler: &mut SystemScheduler, promise: PromiseRef) -> Result<()> {
        let handle = scheduler.register_async(promise)?;
        let mut queues = self.queues.lock();
        if queues.incoming.is_empty() {
            queues.readers.push(handle);
        } else {
            drop(queues);
            handle.send();
        }
        Ok(())
    }
}

impl fmt::Debug for DuplexPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queues = self.queues.lock();
        f.debug_struct("DuplexPort")
            .field("url", &self.url)
            .field("has_writer", &queues.writer.is_some())
            .field("outgoing", &queues.outgoing.len())
            .field("incoming", &queues.incoming.len())
            .finish()
    }
}

/// A promise that, once `port` is readable, pushes the next message onto
/// the awaiting task's stack as a `Bytes` cell, or `Nil` if another reader
/// took it first.
pub fn receive_promise(port: Arc<DuplexPort>) -> Promise {
    Promise::with_adapt(Box::new(move |_: &Promise, state: &mut InterpreterState| match port.receive() {
        Some(message) => state.load_bytes_onto_stack(message),
        None => {
            state.current_coro_mut()?.push_data(DataCell::Nil);
            Ok(())
        }
    }))
}

/// Ports keyed by url, in registration order.
#[derive(Debug, Default)]
pub struct PortMultiplexer {
    ports: IndexMap<String, Arc<DuplexPort>>,
}

impl PortMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_port(&mut self, url: &str) -> Result<Arc<DuplexPort>> {
        if self.ports.contains_key(url) {
            return Err(InterpreterError::invariant(format!("port {} is already registered", url)));
        }
        let port = Arc::new(DuplexPort::new(url));
        self.ports.insert(url.to_string(), port.clone());
        Ok(port)
    }

    pub fn get_port(&self, url: &str) -> Option<Arc<DuplexPort>> {
        self.ports.get(url).cloned()
    }

    pub fn has_port(&self, url: &str) -> bool {
        self.ports.contains_key(url)
    }

    pub fn unregister_port(&mut self, url: &str) -> Option<Arc<DuplexPort>> {
        self.ports.shift_remove(url)
    }

    pub fn ports(&self) -> impl Iterator<Item = &Arc<DuplexPort>> {
        self.ports.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
