//! Units of asynchronous work with wait or callback completion.
//!
//! A [`Task`] is owned by exactly one component at a time: the submitter
//! builds it, the pool queue holds it, and a worker consumes it through
//! [`Task::execute`]. Completion is signalled once, either to a
//! [`TaskHandle`] waiter or to a registered callback. A task dropped without
//! running (discarded by the pool at shutdown) still completes, with
//! [`TaskOutcome::Discarded`], so no waiter is left blocked.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::error::ErrorCode;

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The work ran and returned this result code
    Completed(i32),
    /// The task was dropped before a worker ran it
    Discarded,
}

/// Callback invoked once when a task completes in asynchronous mode.
pub type TaskCallback = Box<dyn FnOnce(TaskOutcome) + Send + 'static>;

type Work = Box<dyn FnOnce() -> i32 + Send + 'static>;

/// One-shot completion flag with a condition variable.
struct Signal {
    outcome: Mutex<Option<TaskOutcome>>,
    cond: Condvar,
}

impl Signal {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    /// Record the outcome and wake waiters. Later calls are ignored.
    fn notify(&self, outcome: TaskOutcome) -> bool {
        let mut guard = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return false;
        }
        *guard = Some(outcome);
        drop(guard);
        self.cond.notify_all();
        true
    }

    fn wait(&self) -> TaskOutcome {
        let mut guard = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = *guard {
                return outcome;
            }
            guard = self
                .cond
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn peek(&self) -> Option<TaskOutcome> {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Completion {
    Signal(Arc<Signal>),
    Callback(TaskCallback),
}

/// Waits for a synchronous-mode task to finish.
#[derive(Clone)]
pub struct TaskHandle {
    signal: Arc<Signal>,
}

impl TaskHandle {
    /// Block until the task has finished and return its outcome.
    pub fn wait(&self) -> TaskOutcome {
        self.signal.wait()
    }

    pub fn is_finished(&self) -> bool {
        self.signal.peek().is_some()
    }

    /// The outcome, if the task has already finished.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.signal.peek()
    }
}

/// A unit of work submitted to a [`WorkerPool`](super::WorkerPool).
pub struct Task {
    work: Option<Work>,
    completion: Option<Completion>,
}

impl Task {
    /// Create a synchronous-mode task; use [`Task::handle`] to wait on it.
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        Self {
            work: Some(Box::new(work)),
            completion: Some(Completion::Signal(Arc::new(Signal::new()))),
        }
    }

    /// Create an asynchronous-mode task whose completion runs `callback`.
    ///
    /// The callback runs on the thread that finishes the task (a worker, or
    /// whoever drops a discarded task) and must not panic.
    pub fn with_callback<F, C>(work: F, callback: C) -> Self
    where
        F: FnOnce() -> i32 + Send + 'static,
        C: FnOnce(TaskOutcome) + Send + 'static,
    {
        Self {
            work: Some(Box::new(work)),
            completion: Some(Completion::Callback(Box::new(callback))),
        }
    }

    /// Handle for waiting on this task. `None` for callback-mode tasks.
    pub fn handle(&self) -> Option<TaskHandle> {
        match &self.completion {
            Some(Completion::Signal(signal)) => Some(TaskHandle {
                signal: Arc::clone(signal),
            }),
            _ => None,
        }
    }

    /// Run the work and signal completion.
    ///
    /// A panic inside the work is contained here and reported as a
    /// [`ErrorCode::ProcessingException`] result so the calling worker
    /// thread survives.
    pub fn execute(mut self) -> TaskOutcome {
        let code = match self.work.take() {
            Some(work) => match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(code) => code,
                Err(payload) => {
                    tracing::error!("Task panicked: {}", panic_message(payload.as_ref()));
                    ErrorCode::ProcessingException.as_i32()
                }
            },
            None => ErrorCode::Ok.as_i32(),
        };
        let outcome = TaskOutcome::Completed(code);
        self.finish(outcome);
        outcome
    }

    fn finish(&mut self, outcome: TaskOutcome) {
        match self.completion.take() {
            Some(Completion::Signal(signal)) => {
                signal.notify(outcome);
            }
            Some(Completion::Callback(callback)) => callback(outcome),
            None => {}
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if self.completion.is_some() {
            self.finish(TaskOutcome::Discarded);
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.completion {
            Some(Completion::Signal(_)) => "wait",
            Some(Completion::Callback(_)) => "callback",
            None => "finished",
        };
        f.debug_struct("Task").field("mode", &mode).finish()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
