//! "Submit work, collect results" abstraction over local and remote pools.
//!
//! A [`TaskHandle`] is the future returned by [`TaskExecutor::submit`]. Callers
//! wait on a set of handles with [`TaskExecutor::as_completed`], which yields
//! `(handle, result)` pairs in completion order. Because completion order is
//! unspecified, callers must map results back by handle, never by position.
//! Completions for handles outside the awaited set are parked and handed out
//! when their own handles are awaited.

use super::evaluator::{EvalError, EvalTask, Evaluator, TaskResult};
use crate::error::{EvolveError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskHandle(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub handle: TaskHandle,
    pub result: TaskResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Wait for every in-flight task.
    Drain,
    /// Stop as soon as possible; remote workers are terminated.
    Abort,
}

/// Completions that arrived while nobody was waiting for them.
#[derive(Debug, Default)]
pub struct ParkedResults {
    results: HashMap<TaskHandle, TaskResult>,
}

impl ParkedResults {
    pub fn park(&mut self, completion: Completion) {
        self.results.insert(completion.handle, completion.result);
    }

    pub fn take(&mut self, handle: TaskHandle) -> Option<TaskResult> {
        self.results.remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

pub trait TaskExecutor {
    /// Queues a task without waiting for it.
    fn submit(&mut self, task: EvalTask) -> Result<TaskHandle>;

    /// Blocks until any in-flight task completes.
    fn recv(&mut self) -> Result<Completion>;

    /// Number of tasks submitted but not yet received.
    fn in_flight(&self) -> usize;

    fn parked(&mut self) -> &mut ParkedResults;

    fn shutdown(&mut self, mode: ShutdownMode);

    fn workers(&self) -> usize;

    /// Whether a cancelled run should still wait for in-flight work.
    fn awaits_on_cancel(&self) -> bool {
        true
    }

    fn as_completed(&mut self, handles: &[TaskHandle]) -> AsCompleted<'_, Self>
    where
        Self: Sized,
    {
        AsCompleted {
            executor: self,
            pending: handles.iter().copied().collect(),
        }
    }
}

impl<T: TaskExecutor + ?Sized> TaskExecutor for &mut T {
    fn submit(&mut self, task: EvalTask) -> Result<TaskHandle> {
        (**self).submit(task)
    }

    fn recv(&mut self) -> Result<Completion> {
        (**self).recv()
    }

    fn in_flight(&self) -> usize {
        (**self).in_flight()
    }

    fn parked(&mut self) -> &mut ParkedResults {
        (**self).parked()
    }

    fn shutdown(&mut self, mode: ShutdownMode) {
        (**self).shutdown(mode)
    }

    fn workers(&self) -> usize {
        (**self).workers()
    }

    fn awaits_on_cancel(&self) -> bool {
        (**self).awaits_on_cancel()
    }
}

impl<T: TaskExecutor + ?Sized> TaskExecutor for Box<T> {
    fn submit(&mut self, task: EvalTask) -> Result<TaskHandle> {
        (**self).submit(task)
    }

    fn recv(&mut self) -> Result<Completion> {
        (**self).recv()
    }

    fn in_flight(&self) -> usize {
        (**self).in_flight()
    }

    fn parked(&mut self) -> &mut ParkedResults {
        (**self).parked()
    }

    fn shutdown(&mut self, mode: ShutdownMode) {
        (**self).shutdown(mode)
    }

    fn workers(&self) -> usize {
        (**self).workers()
    }

    fn awaits_on_cancel(&self) -> bool {
        (**self).awaits_on_cancel()
    }
}

/// Iterator over the completions of a fixed set of handles.
pub struct AsCompleted<'a, E: TaskExecutor> {
    executor: &'a mut E,
    pending: HashSet<TaskHandle>,
}

impl<E: TaskExecutor> Iterator for AsCompleted<'_, E> {
    type Item = Result<(TaskHandle, TaskResult)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pending.is_empty() {
            return None;
        }

        let parked_hit = self
            .pending
            .iter()
            .copied()
            .find_map(|h| self.executor.parked().take(h).map(|r| (h, r)));
        if let Some((handle, result)) = parked_hit {
            self.pending.remove(&handle);
            return Some(Ok((handle, result)));
        }

        loop {
            let completion = match self.executor.recv() {
                Ok(c) => c,
                Err(e) => {
                    self.pending.clear();
                    return Some(Err(e));
                }
            };
            if self.pending.remove(&completion.handle) {
                return Some(Ok((completion.handle, completion.result)));
            }
            self.executor.parked().park(completion);
        }
    }
}

/// Runs a task, turning a panic into an evaluation error.
pub(crate) fn run_guarded(evaluator: &dyn Evaluator, task: &EvalTask) -> TaskResult {
    match panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(task))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "evaluation panicked".to_string());
            Err(EvalError(format!("evaluation panicked: {}", message)))
        }
    }
}

/// In-process pool backed by a rayon thread pool.
pub struct LocalPool {
    pool: rayon::ThreadPool,
    evaluator: Arc<dyn Evaluator>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    next_id: u64,
    in_flight: usize,
    parked: ParkedResults,
}

impl LocalPool {
    /// `threads = 0` uses rayon's default (one per logical CPU).
    pub fn new(threads: usize, evaluator: Arc<dyn Evaluator>) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("eval-{}", i))
            .build()
            .map_err(|e| EvolveError::Executor(format!("failed to build thread pool: {}", e)))?;
        let (tx, rx) = channel();
        log::debug!("Local pool started with {} threads", pool.current_num_threads());
        Ok(Self {
            pool,
            evaluator,
            tx,
            rx,
            next_id: 0,
            in_flight: 0,
            parked: ParkedResults::default(),
        })
    }
}

impl TaskExecutor for LocalPool {
    fn submit(&mut self, task: EvalTask) -> Result<TaskHandle> {
        let handle = TaskHandle(self.next_id);
        self.next_id += 1;

        let evaluator = Arc::clone(&self.evaluator);
        let tx = self.tx.clone();
        self.pool.spawn(move || {
            let result = run_guarded(evaluator.as_ref(), &task);
            // Receiver gone means the pool was dropped; nothing to report to.
            let _ = tx.send(Completion { handle, result });
        });
        self.in_flight += 1;
        Ok(handle)
    }

    fn recv(&mut self) -> Result<Completion> {
        if self.in_flight == 0 {
            return Err(EvolveError::Executor(
                "waiting on a task that was never submitted".to_string(),
            ));
        }
        let completion = self
            .rx
            .recv()
            .map_err(|e| EvolveError::Executor(format!("result channel closed: {}", e)))?;
        self.in_flight -= 1;
        Ok(completion)
    }

    fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn parked(&mut self) -> &mut ParkedResults {
        &mut self.parked
    }

    fn shutdown(&mut self, mode: ShutdownMode) {
        // Local tasks cannot be interrupted; Abort just stops listening.
        if mode == ShutdownMode::Drain {
            while self.in_flight > 0 {
                match self.recv() {
                    Ok(completion) => self.parked.park(completion),
                    Err(_) => break,
                }
            }
        }
    }

    fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}
