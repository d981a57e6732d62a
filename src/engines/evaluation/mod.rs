pub mod evaluator;
pub mod executor;
pub mod remote;

pub use evaluator::{
    moves_of, simulate, EvalContext, EvalError, EvalTask, Evaluator, Outcome, TaskResult,
    TrailEvaluator,
};
pub use executor::{AsCompleted, Completion, LocalPool, ShutdownMode, TaskExecutor, TaskHandle};
pub use remote::{serve, ProcessPool, WorkerCommand, WorkerRequest, WorkerResponse};
