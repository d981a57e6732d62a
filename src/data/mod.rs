pub mod run_store;

pub use run_store::{JsonRunStore, RunId, RunMeta, RunRecord, RunRecorder, ALGORITHM_VERSION};
