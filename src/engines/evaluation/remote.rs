//! Worker-process pool.
//!
//! Each worker is a child process reading one JSON [`WorkerRequest`] per line
//! on stdin and answering with one JSON [`WorkerResponse`] per line on stdout.
//! A dispatcher thread per worker pulls jobs from a shared queue, so a slow
//! worker never holds up the others. A worker that exits or writes garbage
//! fails the task it was running and takes no further work.

use super::evaluator::{EvalError, EvalTask, Evaluator, TaskResult};
use super::executor::{
    run_guarded, Completion, ParkedResults, ShutdownMode, TaskExecutor, TaskHandle,
};
use crate::error::{EvolveError, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub handle: TaskHandle,
    pub task: EvalTask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub handle: TaskHandle,
    pub result: TaskResult,
}

/// How to start one worker process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The running executable with the `worker` subcommand.
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe()?;
        Ok(Self::new(program, vec!["worker".to_string()]))
    }

    fn spawn(&self) -> Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                EvolveError::Executor(format!(
                    "failed to start worker {}: {}",
                    self.program.display(),
                    e
                ))
            })
    }
}

/// Worker side of the protocol. Returns the number of tasks answered once
/// the input is closed.
pub fn serve<R, W>(reader: R, writer: W, evaluator: &dyn Evaluator) -> Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut writer = BufWriter::new(writer);
    let mut served = 0;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: WorkerRequest = serde_json::from_str(&line)?;
        let response = WorkerResponse {
            handle: request.handle,
            result: run_guarded(evaluator, &request.task),
        };
        serde_json::to_writer(&mut writer, &response)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        served += 1;
    }

    Ok(served)
}

type JobQueue = Arc<Mutex<Receiver<WorkerRequest>>>;

pub struct ProcessPool {
    job_tx: Option<Sender<WorkerRequest>>,
    result_rx: Receiver<Completion>,
    children: Vec<Child>,
    dispatchers: Vec<JoinHandle<()>>,
    next_id: u64,
    in_flight: usize,
    parked: ParkedResults,
    workers: usize,
}

impl ProcessPool {
    pub fn spawn(workers: usize, command: &WorkerCommand) -> Result<Self> {
        if workers == 0 {
            return Err(EvolveError::Executor(
                "process pool needs at least one worker".to_string(),
            ));
        }

        let (job_tx, job_rx) = channel::<WorkerRequest>();
        let queue: JobQueue = Arc::new(Mutex::new(job_rx));
        let (result_tx, result_rx) = channel();
        let alive = Arc::new(AtomicUsize::new(workers));

        let mut pool = Self {
            job_tx: Some(job_tx),
            result_rx,
            children: Vec::with_capacity(workers),
            dispatchers: Vec::with_capacity(workers),
            next_id: 0,
            in_flight: 0,
            parked: ParkedResults::default(),
            workers,
        };

        for id in 0..workers {
            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    pool.shutdown(ShutdownMode::Abort);
                    return Err(e);
                }
            };
            let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
                (Some(stdin), Some(stdout)) => (stdin, stdout),
                _ => {
                    let _ = child.kill();
                    pool.shutdown(ShutdownMode::Abort);
                    return Err(EvolveError::Executor(format!(
                        "worker {} started without piped stdio",
                        id
                    )));
                }
            };
            pool.children.push(child);

            let dispatcher = Dispatcher {
                id,
                stdin: BufWriter::new(stdin),
                stdout: BufReader::new(stdout),
                queue: Arc::clone(&queue),
                results: result_tx.clone(),
                alive: Arc::clone(&alive),
            };
            let thread = std::thread::Builder::new()
                .name(format!("worker-dispatch-{}", id))
                .spawn(move || dispatcher.run())
                .map_err(|e| EvolveError::Executor(format!("failed to start dispatcher: {}", e)))?;
            pool.dispatchers.push(thread);
        }

        log::info!("Started {} worker processes ({})", workers, command.program.display());
        Ok(pool)
    }

    fn join_all(&mut self) {
        for thread in self.dispatchers.drain(..) {
            if thread.join().is_err() {
                log::warn!("Worker dispatcher thread panicked");
            }
        }
        for mut child in self.children.drain(..) {
            if let Err(e) = child.wait() {
                log::warn!("Failed to reap worker process: {}", e);
            }
        }
    }
}

impl TaskExecutor for ProcessPool {
    fn submit(&mut self, task: EvalTask) -> Result<TaskHandle> {
        let handle = TaskHandle(self.next_id);
        let tx = self
            .job_tx
            .as_ref()
            .ok_or_else(|| EvolveError::Executor("process pool is shut down".to_string()))?;
        tx.send(WorkerRequest { handle, task })
            .map_err(|_| EvolveError::Executor("all workers have exited".to_string()))?;
        self.next_id += 1;
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
            .result_rx
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
        match mode {
            ShutdownMode::Drain => {
                while self.in_flight > 0 {
                    match self.recv() {
                        Ok(completion) => self.parked.park(completion),
                        Err(_) => break,
                    }
                }
                // Closing the queue lets dispatchers close worker stdin.
                self.job_tx = None;
            }
            ShutdownMode::Abort => {
                self.job_tx = None;
                for child in &mut self.children {
                    let _ = child.kill();
                }
            }
        }
        self.join_all();
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn awaits_on_cancel(&self) -> bool {
        false
    }
}

impl Drop for ProcessPool {
    fn drop(&mut self) {
        if !self.children.is_empty() || !self.dispatchers.is_empty() {
            self.shutdown(ShutdownMode::Abort);
        }
    }
}

struct Dispatcher {
    id: usize,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    queue: JobQueue,
    results: Sender<Completion>,
    alive: Arc<AtomicUsize>,
}

impl Dispatcher {
    fn next_job(&self) -> Option<WorkerRequest> {
        let queue = self.queue.lock().ok()?;
        queue.recv().ok()
    }

    fn run(mut self) {
        while let Some(request) = self.next_job() {
            let handle = request.handle;
            match self.exchange(&request) {
                Ok(result) => {
                    if self.results.send(Completion { handle, result }).is_err() {
                        return;
                    }
                }
                Err(reason) => {
                    log::error!("Worker {} lost: {}", self.id, reason);
                    let _ = self.results.send(Completion {
                        handle,
                        result: Err(EvalError(format!("worker {} failed: {}", self.id, reason))),
                    });
                    self.retire();
                    return;
                }
            }
        }
    }

    fn exchange(&mut self, request: &WorkerRequest) -> std::result::Result<TaskResult, String> {
        serde_json::to_writer(&mut self.stdin, request).map_err(|e| e.to_string())?;
        self.stdin.write_all(b"\n").map_err(|e| e.to_string())?;
        self.stdin.flush().map_err(|e| e.to_string())?;

        let mut line = String::new();
        let read = self.stdout.read_line(&mut line).map_err(|e| e.to_string())?;
        if read == 0 {
            return Err("worker closed its output".to_string());
        }
        let response: WorkerResponse =
            serde_json::from_str(&line).map_err(|e| format!("malformed response: {}", e))?;
        if response.handle != request.handle {
            return Err(format!(
                "answered task {} while running task {}",
                response.handle.0, request.handle.0
            ));
        }
        Ok(response.result)
    }

    /// The last worker standing fails whatever is still queued, so nobody
    /// waits forever.
    fn retire(self) {
        if self.alive.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }
        log::error!("All workers have exited; failing queued tasks");
        while let Some(request) = self.next_job() {
            let _ = self.results.send(Completion {
                handle: request.handle,
                result: Err(EvalError("no workers left".to_string())),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::evaluation::evaluator::{EvalContext, TrailEvaluator};
    use crate::environment::{ControllerBlueprint, TrailBlueprint};
    use std::io::Cursor;

    fn request(handle: u64, genes: Vec<f64>, ctx: &Arc<EvalContext>) -> String {
        serde_json::to_string(&WorkerRequest {
            handle: TaskHandle(handle),
            task: EvalTask::fitness(genes, ctx.clone()),
        })
        .unwrap()
    }

    #[test]
    fn test_serve_answers_each_line() {
        let ctx = Arc::new(EvalContext::new(
            ControllerBlueprint::from_id(1).unwrap(),
            TrailBlueprint::parse("t", "3 1 0 0", 90).unwrap(),
            6,
        ));
        let n = ctx.param_count();
        let input = format!(
            "{}\n\n{}\n",
            request(7, vec![0.0; n], &ctx),
            request(8, vec![0.0; 2], &ctx)
        );

        let mut output = Vec::new();
        let served = serve(Cursor::new(input), &mut output, &TrailEvaluator).unwrap();
        assert_eq!(served, 2);

        let responses: Vec<WorkerResponse> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses[0].handle, TaskHandle(7));
        assert_eq!(responses[0].result.as_ref().unwrap().fitness.moves, 6);
        assert_eq!(responses[1].handle, TaskHandle(8));
        assert!(responses[1].result.is_err());
    }

    #[test]
    fn test_request_genes_cross_the_wire_unchanged() {
        let ctx = Arc::new(EvalContext::new(
            ControllerBlueprint::from_id(1).unwrap(),
            TrailBlueprint::parse("t", "3 1 0 0", 90).unwrap(),
            6,
        ));
        let genes: Vec<f64> = (1..5000).map(|i| (i as f64).sqrt() * 0.731 - 13.0).collect();
        let line = request(1, genes.clone(), &ctx);
        let decoded: WorkerRequest = serde_json::from_str(&line).unwrap();
        assert!(genes
            .iter()
            .zip(&decoded.task.genes)
            .all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn test_serve_rejects_garbage() {
        let mut output = Vec::new();
        let result = serve(Cursor::new("not json\n"), &mut output, &TrailEvaluator);
        assert!(result.is_err());
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let command = WorkerCommand::new("/nonexistent/trail-evolve-worker", vec![]);
        assert!(ProcessPool::spawn(2, &command).is_err());
    }
}
