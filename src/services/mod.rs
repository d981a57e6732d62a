pub mod evolution_runner;

pub use evolution_runner::{
    build_executor, checkpoint_path_for, resolve_context, run_repeats, EvolutionRunner,
    RepeatReport,
};
