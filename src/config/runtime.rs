use super::traits::ConfigSection;
use crate::error::EvolveError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where and how a run executes. Not part of the run's identity, so changing
/// any of it never invalidates a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub executor: ExecutorConfig,
    pub trail_dir: PathBuf,
    pub checkpoint: CheckpointConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutorConfig {
    /// In-process thread pool. `threads = 0` lets rayon pick.
    Local { threads: usize },
    /// Worker processes speaking the JSON-lines protocol. Without a program
    /// the current executable is started with the `worker` subcommand.
    Remote {
        workers: usize,
        #[serde(default)]
        program: Option<PathBuf>,
        #[serde(default)]
        args: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub path: Option<PathBuf>,
    /// Write a checkpoint every `interval` generations.
    pub interval: usize,
    /// Fail instead of starting fresh when the checkpoint is missing or unusable.
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub run_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::Local { threads: 0 },
            trail_dir: PathBuf::from("trails"),
            checkpoint: CheckpointConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: None,
            interval: 1,
            required: false,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_dir: PathBuf::from("runs"),
        }
    }
}

impl ConfigSection for RuntimeConfig {
    fn section_name() -> &'static str {
        "runtime"
    }

    fn validate(&self) -> Result<(), EvolveError> {
        if let ExecutorConfig::Remote { workers, .. } = self.executor {
            if workers == 0 {
                return Err(EvolveError::Configuration(
                    "remote executor needs at least one worker".to_string(),
                ));
            }
        }
        if self.checkpoint.interval == 0 {
            return Err(EvolveError::Configuration(
                "checkpoint interval must be at least 1".to_string(),
            ));
        }
        if self.checkpoint.required && self.checkpoint.path.is_none() {
            return Err(EvolveError::Configuration(
                "checkpoint marked required but no checkpoint path given".to_string(),
            ));
        }
        Ok(())
    }
}
