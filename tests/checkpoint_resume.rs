use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use trail_evolve::config::evolution::{RunConfig, VariationKind};
use trail_evolve::engines::evaluation::{EvalContext, LocalPool, TrailEvaluator};
use trail_evolve::engines::generation::{
    CheckpointPolicy, EvolutionEngine, ProgressCallback, ProgressEvent, SilentProgressCallback,
    StopReason,
};
use trail_evolve::environment::{ControllerBlueprint, TrailBlueprint};
use trail_evolve::EvolveError;

fn context() -> Arc<EvalContext> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("trails/hook_12.toml");
    Arc::new(EvalContext::new(
        ControllerBlueprint::from_id(2).unwrap(),
        TrailBlueprint::load(path).unwrap(),
        30,
    ))
}

fn config(generations: usize) -> RunConfig {
    RunConfig {
        trail_id: "hook_12".to_string(),
        controller_id: 2,
        moves_limit: 30,
        population_size: 10,
        lambda: 25,
        generations,
        variation: VariationKind::SelectFromCombined,
        seed: Some(2024),
        ..RunConfig::default()
    }
}

fn engine(config: RunConfig) -> EvolutionEngine<LocalPool> {
    let pool = LocalPool::new(3, Arc::new(TrailEvaluator)).unwrap();
    EvolutionEngine::new(config, context(), pool).unwrap()
}

struct CancelAfter {
    generation: usize,
    flag: Arc<AtomicBool>,
}

impl ProgressCallback for CancelAfter {
    fn on_generation_complete(&mut self, event: &ProgressEvent) {
        if event.generation == self.generation {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

/// Runs until cancelled after generation 1, leaving a checkpoint behind.
fn interrupted_run(path: &Path, config: RunConfig) {
    let mut engine = engine(config).with_checkpoint(CheckpointPolicy::new(path));
    let mut callback = CancelAfter {
        generation: 1,
        flag: engine.cancel_handle(),
    };
    let outcome = engine.run(&mut callback).unwrap();
    assert_eq!(outcome.stop_reason, StopReason::Cancelled);
    assert_eq!(outcome.generations_run, 2);
    assert!(path.is_file());
}

#[test]
fn test_resume_matches_uninterrupted_run() {
    let mut straight = engine(config(4));
    let expected = straight.run(&mut SilentProgressCallback).unwrap();
    assert_eq!(expected.stop_reason, StopReason::GenerationsExhausted);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.ckpt");
    interrupted_run(&path, config(4));

    let mut resumed = engine(config(4)).with_checkpoint(CheckpointPolicy::new(&path));
    let outcome = resumed.run(&mut SilentProgressCallback).unwrap();

    assert_eq!(outcome.stop_reason, StopReason::GenerationsExhausted);
    assert_eq!(resumed.population(), straight.population());
    assert_eq!(outcome.best, expected.best);
    assert_eq!(outcome.records.len(), expected.records.len());
    for (a, b) in outcome.records.iter().zip(&expected.records) {
        assert_eq!(a.index, b.index);
        assert_eq!(a.elite_genes, b.elite_genes);
        assert_eq!(a.food, b.food);
        assert_eq!(a.moves, b.moves);
        // replays of restored generations are redone at the end
        assert_eq!(a.elite_moves, b.elite_moves);
    }
    // finished runs clean up after themselves
    assert!(!path.exists());
}

#[test]
fn test_resume_can_extend_generation_budget() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.ckpt");
    interrupted_run(&path, config(3));

    let mut resumed = engine(config(6)).with_checkpoint(CheckpointPolicy::new(&path));
    let outcome = resumed.run(&mut SilentProgressCallback).unwrap();
    assert_eq!(outcome.records.first().map(|r| r.index), Some(0));
    assert!(outcome.generations_run > 2);
}

#[test]
fn test_mismatched_checkpoint_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.ckpt");
    interrupted_run(&path, config(4));

    let changed = RunConfig {
        prob_mutate: 0.3,
        ..config(4)
    };
    let mut fresh = engine(changed.clone());
    let expected = fresh.run(&mut SilentProgressCallback).unwrap();

    let mut engine = engine(changed).with_checkpoint(CheckpointPolicy::new(&path));
    let outcome = engine.run(&mut SilentProgressCallback).unwrap();
    // nothing from the foreign snapshot was merged in
    assert_eq!(outcome.records.len(), expected.records.len());
    assert_eq!(outcome.records[0].elite_genes, expected.records[0].elite_genes);
    assert_eq!(outcome.best, expected.best);
    assert_eq!(engine.population(), fresh.population());
}

#[test]
fn test_mismatched_required_checkpoint_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.ckpt");
    interrupted_run(&path, config(4));

    let changed = RunConfig {
        prob_mutate: 0.3,
        ..config(4)
    };
    let policy = CheckpointPolicy {
        required: true,
        ..CheckpointPolicy::new(&path)
    };
    let err = engine(changed)
        .with_checkpoint(policy)
        .run(&mut SilentProgressCallback)
        .unwrap_err();
    assert!(matches!(err, EvolveError::IncompatibleCheckpoint(_)));
    // the foreign checkpoint is left untouched
    assert!(path.is_file());
}

#[test]
fn test_missing_checkpoint_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.ckpt");

    let required = CheckpointPolicy {
        path: path.clone(),
        interval: 1,
        required: true,
    };
    let err = engine(config(2))
        .with_checkpoint(required)
        .run(&mut SilentProgressCallback)
        .unwrap_err();
    assert!(matches!(err, EvolveError::Checkpoint(_)));

    // optional: starts fresh
    let outcome = engine(config(2))
        .with_checkpoint(CheckpointPolicy::new(&path))
        .run(&mut SilentProgressCallback)
        .unwrap();
    assert_eq!(outcome.generations_run, 2);
}

#[test]
fn test_corrupt_checkpoint_falls_back_to_fresh_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.ckpt");
    std::fs::write(&path, "garbage").unwrap();

    let outcome = engine(config(2))
        .with_checkpoint(CheckpointPolicy::new(&path))
        .run(&mut SilentProgressCallback)
        .unwrap();
    assert_eq!(outcome.generations_run, 2);
}
