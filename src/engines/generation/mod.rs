pub mod checkpoint;
pub mod evolution_engine;
pub mod hall_of_fame;
pub mod operators;
pub mod pareto;
pub mod progress;
pub mod selection;
pub mod statistics;
pub mod termination;
pub mod variation;

pub use checkpoint::{Checkpoint, CheckpointPolicy, CHECKPOINT_VERSION};
pub use evolution_engine::{EnginePhase, EvolutionEngine, ProgressCallback, RunOutcome};
pub use hall_of_fame::HallOfFame;
pub use pareto::OptimizationDirection;
pub use progress::{IpcProgressCallback, ProgressEvent, ProgressMessage, SilentProgressCallback};
pub use selection::Selector;
pub use statistics::{GenerationRecord, GenerationStats, ObjectiveStats};
pub use termination::{StopReason, TerminationDetector};
