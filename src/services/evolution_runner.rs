use crate::config::evolution::RunConfig;
use crate::config::manager::AppConfig;
use crate::config::runtime::{ExecutorConfig, RuntimeConfig};
use crate::data::{JsonRunStore, RunId, RunMeta, RunRecorder};
use crate::engines::evaluation::{
    EvalContext, LocalPool, ProcessPool, ShutdownMode, TaskExecutor, TrailEvaluator, WorkerCommand,
};
use crate::engines::generation::{
    CheckpointPolicy, EvolutionEngine, IpcProgressCallback, ProgressCallback, ProgressMessage,
    RunOutcome, StopReason,
};
use crate::environment::{ControllerBlueprint, TrailBlueprint};
use crate::error::{EvolveError, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Outcome of one repeat of a configuration.
#[derive(Debug, Clone)]
pub struct RepeatReport {
    pub repeat: usize,
    pub outcome: RunOutcome,
    pub run_id: Option<RunId>,
    /// Set when the run finished but its durable record could not be written.
    pub persistence_warning: Option<String>,
}

pub type EvolutionResult = Result<Vec<RepeatReport>>;

/// Loads `<trail_dir>/<trail_id>.toml` and the controller blueprint.
pub fn resolve_context(run: &RunConfig, runtime: &RuntimeConfig) -> Result<EvalContext> {
    let trail_path = runtime.trail_dir.join(format!("{}.toml", run.trail_id));
    let trail = TrailBlueprint::load(&trail_path)?;
    let controller = ControllerBlueprint::from_id(run.controller_id)?;
    log::info!(
        "Trail '{}' ({} food), controller '{}' ({} parameters)",
        trail.name(),
        trail.food_total(),
        controller.name(),
        controller.param_count()
    );
    Ok(EvalContext::new(controller, trail, run.moves_limit))
}

pub fn build_executor(runtime: &RuntimeConfig) -> Result<Box<dyn TaskExecutor + Send>> {
    match &runtime.executor {
        ExecutorConfig::Local { threads } => {
            Ok(Box::new(LocalPool::new(*threads, Arc::new(TrailEvaluator))?))
        }
        ExecutorConfig::Remote {
            workers,
            program,
            args,
        } => {
            let command = match program {
                Some(program) => WorkerCommand::new(program.clone(), args.clone()),
                None => WorkerCommand::current_exe()?,
            };
            Ok(Box::new(ProcessPool::spawn(*workers, &command)?))
        }
    }
}

/// Repeat `r` of a multi-repeat run checkpoints to `<path>.<r>`.
pub fn checkpoint_path_for(base: &Path, repeat: usize) -> PathBuf {
    if repeat == 0 {
        return base.to_path_buf();
    }
    let mut name = base.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}", repeat));
    base.with_file_name(name)
}

/// Runs every repeat of `app.run` in sequence on one executor.
///
/// Stops early on cancellation. An evaluation or configuration error aborts
/// the remaining repeats; a failed run record only adds a warning.
pub fn run_repeats<E, C>(
    app: &AppConfig,
    context: Arc<EvalContext>,
    executor: &mut E,
    mut recorder: Option<&mut dyn RunRecorder>,
    cancel: Arc<AtomicBool>,
    callback: &mut C,
) -> EvolutionResult
where
    E: TaskExecutor,
    C: ProgressCallback + ?Sized,
{
    app.validate()?;
    let mut reports = Vec::with_capacity(app.run.repeat);

    for repeat in 0..app.run.repeat {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        log::info!("Starting repeat {}/{}", repeat + 1, app.run.repeat);

        let mut config = app.run.clone();
        config.seed = config.seed.map(|seed| seed.wrapping_add(repeat as u64));

        let mut engine = EvolutionEngine::new(config.clone(), Arc::clone(&context), &mut *executor)?
            .with_cancel_flag(Arc::clone(&cancel));
        if let Some(path) = &app.runtime.checkpoint.path {
            engine = engine.with_checkpoint(CheckpointPolicy {
                path: checkpoint_path_for(path, repeat),
                interval: app.runtime.checkpoint.interval,
                required: app.runtime.checkpoint.required,
            });
        }

        let run_date = Utc::now();
        let started = Instant::now();
        let outcome = engine.run(callback)?;
        let runtime_ms = started.elapsed().as_millis() as u64;

        let mut report = RepeatReport {
            repeat,
            outcome,
            run_id: None,
            persistence_warning: None,
        };

        if let Some(recorder) = recorder.as_deref_mut() {
            let meta = RunMeta::new(&config, &report.outcome, repeat, run_date, runtime_ms);
            match recorder.record_run(&config, &report.outcome.records, &meta) {
                Ok(id) => report.run_id = Some(id),
                Err(e) => {
                    log::error!("Run finished but could not be recorded: {}", e);
                    report.persistence_warning = Some(e.to_string());
                }
            }
        }

        let cancelled = report.outcome.stop_reason == StopReason::Cancelled;
        reports.push(report);
        if cancelled {
            break;
        }
    }

    Ok(reports)
}

/// Runs a full configuration on a background thread.
pub struct EvolutionRunner {
    handle: Option<JoinHandle<EvolutionResult>>,
    progress_rx: Receiver<ProgressMessage>,
    cancel_flag: Arc<AtomicBool>,
}

impl EvolutionRunner {
    /// Resolves the trail, controller and executor up front so configuration
    /// problems surface here rather than on the worker thread.
    pub fn start(app: AppConfig) -> Result<Self> {
        app.validate()?;
        let context = Arc::new(resolve_context(&app.run, &app.runtime)?);
        let executor = build_executor(&app.runtime)?;
        Self::start_with(app, context, executor)
    }

    pub fn start_with(
        app: AppConfig,
        context: Arc<EvalContext>,
        mut executor: Box<dyn TaskExecutor + Send>,
    ) -> Result<Self> {
        let (progress_tx, progress_rx) = channel();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let cancel = Arc::clone(&cancel_flag);

        let handle = thread::Builder::new()
            .name("evolution".to_string())
            .spawn(move || {
                let mut callback = IpcProgressCallback::new(progress_tx);
                let mut store = JsonRunStore::new(&app.runtime.persistence.run_dir);
                let recorder: Option<&mut dyn RunRecorder> = if app.runtime.persistence.enabled {
                    Some(&mut store)
                } else {
                    None
                };
                let result =
                    run_repeats(&app, context, &mut executor, recorder, cancel, &mut callback);
                let mode = if result.is_ok() {
                    ShutdownMode::Drain
                } else {
                    ShutdownMode::Abort
                };
                executor.shutdown(mode);
                result
            })
            .map_err(|e| {
                EvolveError::Executor(format!("failed to spawn evolution thread: {}", e))
            })?;

        Ok(Self {
            handle: Some(handle),
            progress_rx,
            cancel_flag,
        })
    }

    /// Blocks until the next progress message; `None` once the run is over.
    pub fn next_progress(&mut self) -> Option<ProgressMessage> {
        self.progress_rx.recv().ok()
    }

    pub fn wait(mut self) -> EvolutionResult {
        match self.handle.take() {
            Some(handle) => Self::join(handle),
            None => Err(EvolveError::Executor("results already taken".to_string())),
        }
    }

    fn join(handle: JoinHandle<EvolutionResult>) -> EvolutionResult {
        handle
            .join()
            .unwrap_or_else(|_| Err(EvolveError::Executor("evolution thread panicked".to_string())))
    }

    /// Cancel the running evolution
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }
}

impl Drop for EvolutionRunner {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel();
        }
    }
}
