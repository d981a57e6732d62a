//! On-disk snapshot of a run between generations.

use super::hall_of_fame::HallOfFame;
use super::statistics::GenerationRecord;
use super::termination::TerminationDetector;
use crate::config::evolution::RunConfig;
use crate::error::{EvolveError, Result};
use crate::types::Individual;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CHECKPOINT_VERSION: u32 = 1;

/// Where and how often the engine snapshots itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPolicy {
    pub path: PathBuf,
    pub interval: usize,
    /// Refuse to start fresh when no usable checkpoint exists.
    pub required: bool,
}

impl CheckpointPolicy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval: 1,
            required: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub fingerprint: String,
    pub next_generation: usize,
    pub population: Vec<Individual>,
    pub hall_of_fame: HallOfFame,
    pub rng: ChaCha8Rng,
    pub log: Vec<GenerationRecord>,
    pub termination: TerminationDetector,
}

/// SHA-256 over the run's identity: every RunConfig field except the
/// generation budget and repeat count, so a run can be extended.
pub fn fingerprint(config: &RunConfig) -> Result<String> {
    let identity = RunConfig {
        generations: 0,
        repeat: 0,
        ..config.clone()
    };
    let bytes = serde_json::to_vec(&identity)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl Checkpoint {
    /// Writes to a sibling temp file and renames it into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(path);
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Reads a checkpoint. `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(path)?);
        let checkpoint = serde_json::from_reader(reader)
            .map_err(|e| EvolveError::Checkpoint(format!("{}: {}", path.display(), e)))?;
        Ok(Some(checkpoint))
    }

    /// Rejects snapshots taken under another format version or run identity.
    pub fn validate(&self, config: &RunConfig, param_count: usize) -> Result<()> {
        if self.version != CHECKPOINT_VERSION {
            return Err(EvolveError::IncompatibleCheckpoint(format!(
                "format version {} (expected {})",
                self.version, CHECKPOINT_VERSION
            )));
        }
        if self.fingerprint != fingerprint(config)? {
            return Err(EvolveError::IncompatibleCheckpoint(
                "written for a different run configuration".to_string(),
            ));
        }
        if self.population.len() != config.population_size {
            return Err(EvolveError::IncompatibleCheckpoint(format!(
                "population of {} (expected {})",
                self.population.len(),
                config.population_size
            )));
        }
        let bad_length = self
            .population
            .iter()
            .chain(self.hall_of_fame.best())
            .any(|ind| ind.genes.len() != param_count);
        if bad_length {
            return Err(EvolveError::IncompatibleCheckpoint(format!(
                "gene vectors do not match the controller's {} parameters",
                param_count
            )));
        }
        if self.population.iter().any(|ind| !ind.is_valid()) {
            return Err(EvolveError::IncompatibleCheckpoint(
                "population contains unevaluated individuals".to_string(),
            ));
        }
        if self.log.len() != self.next_generation {
            return Err(EvolveError::IncompatibleCheckpoint(format!(
                "log holds {} generations but resumes at {}",
                self.log.len(),
                self.next_generation
            )));
        }
        Ok(())
    }
}

pub fn remove(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("Removed checkpoint {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove checkpoint {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Fitness;
    use rand::SeedableRng;

    fn snapshot(config: &RunConfig) -> Checkpoint {
        let population = (0..config.population_size)
            .map(|i| Individual {
                genes: vec![i as f64; 4],
                fitness: Some(Fitness::new(1, 2)),
            })
            .collect();
        Checkpoint {
            version: CHECKPOINT_VERSION,
            fingerprint: fingerprint(config).unwrap(),
            next_generation: 0,
            population,
            hall_of_fame: HallOfFame::new(),
            rng: ChaCha8Rng::seed_from_u64(9),
            log: Vec::new(),
            termination: TerminationDetector::new(config, 5),
        }
    }

    fn small_config() -> RunConfig {
        RunConfig {
            population_size: 3,
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_fingerprint_ignores_budget_and_repeat() {
        let config = small_config();
        let extended = RunConfig {
            generations: config.generations * 2,
            repeat: 7,
            ..config.clone()
        };
        let mutated = RunConfig {
            prob_mutate: 0.3,
            ..config.clone()
        };
        assert_eq!(fingerprint(&config).unwrap(), fingerprint(&extended).unwrap());
        assert_ne!(fingerprint(&config).unwrap(), fingerprint(&mutated).unwrap());
    }

    #[test]
    fn test_save_load_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run.ckpt");
        let config = small_config();

        assert!(Checkpoint::load(&path).unwrap().is_none());
        snapshot(&config).save(&path).unwrap();
        assert!(!temp_path(&path).exists());

        let loaded = Checkpoint::load(&path).unwrap().unwrap();
        loaded.validate(&config, 4).unwrap();
        assert!(matches!(
            loaded.validate(&config, 5),
            Err(EvolveError::IncompatibleCheckpoint(_))
        ));

        remove(&path);
        assert!(!path.exists());
    }

    #[test]
    fn test_mismatches_rejected() {
        let config = small_config();
        let mut checkpoint = snapshot(&config);
        checkpoint.version = CHECKPOINT_VERSION + 1;
        assert!(checkpoint.validate(&config, 4).is_err());

        let other = RunConfig {
            trail_id: "hook_12".to_string(),
            ..config.clone()
        };
        assert!(snapshot(&config).validate(&other, 4).is_err());
    }

    #[test]
    fn test_genes_survive_save_load_bit_exact() {
        use crate::engines::generation::operators::{random_genes, GeneBounds};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genes.ckpt");
        let config = small_config();
        let mut rng = ChaCha8Rng::seed_from_u64(31);
        let mut checkpoint = snapshot(&config);
        for individual in checkpoint.population.iter_mut() {
            individual.genes = random_genes(20_000, GeneBounds::new(-5.0, 5.0), &mut rng);
        }
        checkpoint.save(&path).unwrap();

        let loaded = Checkpoint::load(&path).unwrap().unwrap();
        for (saved, restored) in checkpoint.population.iter().zip(&loaded.population) {
            let mismatches = saved
                .genes
                .iter()
                .zip(&restored.genes)
                .filter(|(a, b)| a.to_bits() != b.to_bits())
                .count();
            assert_eq!(mismatches, 0);
        }
    }

    #[test]
    fn test_corrupt_file_is_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ckpt");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Checkpoint::load(&path), Err(EvolveError::Checkpoint(_))));
    }
}
