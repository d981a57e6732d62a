//! Durable record of finished runs, one JSON document per run.

use crate::config::evolution::RunConfig;
use crate::engines::generation::{GenerationRecord, RunOutcome, StopReason};
use crate::error::{EvolveError, Result};
use crate::types::Individual;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Bumped whenever the generational protocol changes meaningfully.
pub const ALGORITHM_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{:06}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_date: DateTime<Utc>,
    pub runtime_ms: u64,
    pub algorithm_version: u32,
    pub stop_reason: StopReason,
    pub generations_run: usize,
    /// Zero-based repeat this run belongs to.
    pub repeat_index: usize,
    /// λ as it took effect; zero for μ-only variation kinds.
    pub lambda: usize,
    pub best: Option<Individual>,
}

impl RunMeta {
    /// `run_date` is when the run started, before its first generation.
    pub fn new(
        config: &RunConfig,
        outcome: &RunOutcome,
        repeat_index: usize,
        run_date: DateTime<Utc>,
        runtime_ms: u64,
    ) -> Self {
        Self {
            run_date,
            runtime_ms,
            algorithm_version: ALGORITHM_VERSION,
            stop_reason: outcome.stop_reason,
            generations_run: outcome.generations_run,
            repeat_index,
            lambda: config.recorded_lambda(),
            best: outcome.best.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub meta: RunMeta,
    pub config: RunConfig,
    pub generations: Vec<GenerationRecord>,
}

pub trait RunRecorder {
    fn record_run(
        &mut self,
        config: &RunConfig,
        records: &[GenerationRecord],
        meta: &RunMeta,
    ) -> Result<RunId>;
}

/// Writes `run-NNNNNN.json` files into a directory.
pub struct JsonRunStore {
    dir: PathBuf,
}

impl JsonRunStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_of(&self, id: RunId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Ids of all stored runs, ascending.
    pub fn list(&self) -> Result<Vec<RunId>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let parsed = name
                .strip_prefix("run-")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|digits| digits.parse::<u64>().ok());
            if let Some(id) = parsed {
                ids.push(RunId(id));
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn load(&self, id: RunId) -> Result<RunRecord> {
        let path = self.path_of(id);
        let file = File::open(&path)
            .map_err(|e| EvolveError::Persistence(format!("{}: {}", path.display(), e)))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

impl RunRecorder for JsonRunStore {
    fn record_run(
        &mut self,
        config: &RunConfig,
        records: &[GenerationRecord],
        meta: &RunMeta,
    ) -> Result<RunId> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            EvolveError::Persistence(format!("cannot create {}: {}", self.dir.display(), e))
        })?;

        let id = RunId(self.list()?.last().map_or(1, |last| last.0 + 1));
        let record = RunRecord {
            id,
            meta: meta.clone(),
            config: config.clone(),
            generations: records.to_vec(),
        };

        let path = self.path_of(id);
        let tmp = path.with_extension("json.tmp");
        let write = || -> Result<()> {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &record)?;
            writer.flush()?;
            fs::rename(&tmp, &path)?;
            Ok(())
        };
        write().map_err(|e| EvolveError::Persistence(format!("{}: {}", path.display(), e)))?;

        log::info!("Recorded {} ({} generations)", id, records.len());
        Ok(id)
    }
}
