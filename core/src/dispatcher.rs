//! Cross-context delivery of finished results.
//!
//! # Design
//! An `ExecutionContext` is a FIFO task queue owned by one thread, typically
//! a UI or event-loop thread. Other threads hold a `ContextHandle` and post
//! tasks to it; the owning thread runs them when it next drains its queue.
//! `ResultDispatcher` uses this to guarantee that a callback runs on the
//! context the caller chose, never on the transport's worker.
//!
//! While an `ExecutionContext` is alive its thread is marked as forbidding
//! blocking network I/O, the way a UI thread would be. The transport checks
//! that mark before blocking.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::result::ResultInfo;

type Task = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    static CONTEXT_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Whether the current thread owns a live `ExecutionContext`.
pub fn on_execution_context() -> bool {
    CONTEXT_DEPTH.with(|depth| depth.get() > 0)
}

/// The target context no longer exists.
#[derive(Debug, Error)]
#[error("execution context is closed")]
pub struct ContextClosed;

/// Thread-bound task queue. Not `Send`: it stays on the thread that made it.
pub struct ExecutionContext {
    receiver: Receiver<Task>,
    handle: ContextHandle,
    _thread_bound: PhantomData<*const ()>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        CONTEXT_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            receiver,
            handle: ContextHandle { sender },
            _thread_bound: PhantomData,
        }
    }

    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    /// Runs every task already queued and returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Waits up to `timeout` for one task and runs it.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Runs tasks until `count` have run or `timeout` elapses.
    pub fn run_until(&self, count: usize, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut ran = 0;
        while ran < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.run_next(remaining) {
                break;
            }
            ran += 1;
        }
        ran
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        CONTEXT_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Sendable reference to an `ExecutionContext`.
#[derive(Debug, Clone)]
pub struct ContextHandle {
    sender: Sender<Task>,
}

impl ContextHandle {
    /// Queues `task` to run on the owning thread.
    pub fn post<F>(&self, task: F) -> Result<(), ContextClosed>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(Box::new(task)).map_err(|_| ContextClosed)
    }
}

pub struct ResultDispatcher;

impl ResultDispatcher {
    /// Hands `result` to `callback` on `target`.
    ///
    /// Results reach one context in the order they were delivered.
    pub fn deliver<F>(result: ResultInfo, callback: F, target: &ContextHandle)
    where
        F: FnOnce(ResultInfo) + Send + 'static,
    {
        let url = result.url().to_string();
        let kind = result.kind();
        if target.post(move || callback(result)).is_err() {
            tracing::warn!(target: "callway::performer", %url, ?kind, "result dropped: execution context closed");
        }
    }
}
