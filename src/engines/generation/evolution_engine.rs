use crate::config::evolution::{RunConfig, VariationKind};
use crate::config::traits::ConfigSection;
use crate::engines::evaluation::{EvalContext, EvalTask, ShutdownMode, TaskExecutor, TaskHandle};
use crate::engines::generation::{
    checkpoint::{self, Checkpoint, CheckpointPolicy, CHECKPOINT_VERSION},
    hall_of_fame::HallOfFame,
    operators::{random_genes, GeneBounds},
    progress::ProgressEvent,
    selection::{best_indices, fitnesses_of, Selector},
    statistics::{GenerationRecord, GenerationStats},
    termination::{StopReason, TerminationDetector},
    variation::{replace, var_and, var_or, VariationParams},
};
use crate::error::{EvolveError, Result};
use crate::types::Individual;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, _generation: usize) {}
    fn on_generation_complete(&mut self, _event: &ProgressEvent) {}
    fn on_individual_evaluated(&mut self, _done: usize, _total: usize) {}
}

impl<C: ProgressCallback + ?Sized> ProgressCallback for &mut C {
    fn on_generation_start(&mut self, generation: usize) {
        (**self).on_generation_start(generation)
    }

    fn on_generation_complete(&mut self, event: &ProgressEvent) {
        (**self).on_generation_complete(event)
    }

    fn on_individual_evaluated(&mut self, done: usize, total: usize) {
        (**self).on_individual_evaluated(done, total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Initializing,
    Evaluating(usize),
    Selecting(usize),
    Varying(usize),
    Terminated(StopReason),
    Aborted,
}

/// Result of a finished (or cancelled) run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Hall-of-fame individual; `None` only if cancelled before generation 0.
    pub best: Option<Individual>,
    pub records: Vec<GenerationRecord>,
    pub stop_reason: StopReason,
    pub generations_run: usize,
}

pub struct EvolutionEngine<E: TaskExecutor> {
    config: RunConfig,
    context: Arc<EvalContext>,
    executor: E,
    selector: Selector,
    params: VariationParams,
    rng: ChaCha8Rng,
    population: Vec<Individual>,
    hall_of_fame: HallOfFame,
    log: Vec<GenerationRecord>,
    termination: TerminationDetector,
    phase: EnginePhase,
    cancel: Arc<AtomicBool>,
    checkpoint: Option<CheckpointPolicy>,
    next_generation: usize,
    // elite replay handle -> generation index
    replays: HashMap<TaskHandle, usize>,
}

impl<E: TaskExecutor> EvolutionEngine<E> {
    pub fn new(config: RunConfig, context: Arc<EvalContext>, executor: E) -> Result<Self> {
        config.validate()?;
        if context.param_count() == 0 {
            return Err(EvolveError::Controller(
                "controller has no parameters to evolve".to_string(),
            ));
        }

        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let termination = TerminationDetector::new(&config, context.trail.food_total());

        Ok(Self {
            selector: Selector::new(config.selection, config.tournament_size),
            params: VariationParams::from_config(&config),
            config,
            context,
            executor,
            rng,
            population: Vec::new(),
            hall_of_fame: HallOfFame::new(),
            log: Vec::new(),
            termination,
            phase: EnginePhase::Initializing,
            cancel: Arc::new(AtomicBool::new(false)),
            checkpoint: None,
            next_generation: 0,
            replays: HashMap::new(),
        })
    }

    pub fn with_checkpoint(mut self, policy: CheckpointPolicy) -> Self {
        self.checkpoint = Some(policy);
        self
    }

    /// Shares an externally owned cancellation flag.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run the evolution process
    pub fn run<C: ProgressCallback + ?Sized>(&mut self, callback: &mut C) -> Result<RunOutcome> {
        let start = match self.restore_or_initialize() {
            Ok(start) => start,
            Err(e) => {
                self.phase = EnginePhase::Aborted;
                return Err(e);
            }
        };

        let mut stop_reason = StopReason::GenerationsExhausted;
        for generation in start..self.config.generations {
            if self.cancel.load(Ordering::SeqCst) {
                log::info!("Cancellation requested before generation {}", generation);
                stop_reason = StopReason::Cancelled;
                break;
            }

            match self.step(generation, callback) {
                Ok(Some(reason)) => {
                    stop_reason = reason;
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("Run aborted in generation {}: {}", generation, e);
                    self.phase = EnginePhase::Aborted;
                    return Err(e);
                }
            }
        }

        if stop_reason == StopReason::Cancelled {
            if self.executor.awaits_on_cancel() {
                self.collect_replays(false)?;
            } else {
                self.executor.shutdown(ShutdownMode::Abort);
                self.replays.clear();
            }
            // The checkpoint is what a later resume starts from.
            if !self.log.is_empty() {
                self.write_checkpoint();
            }
        } else {
            self.collect_replays(true)?;
            if let Some(policy) = &self.checkpoint {
                checkpoint::remove(&policy.path);
            }
        }

        self.phase = EnginePhase::Terminated(stop_reason);
        log::info!(
            "Run finished after {} generations: {}",
            self.log.len(),
            stop_reason
        );

        Ok(RunOutcome {
            best: self.hall_of_fame.best().cloned(),
            records: self.log.clone(),
            stop_reason,
            generations_run: self.log.len(),
        })
    }

    /// One full generation. Returns a stop reason when a predicate fires.
    fn step<C: ProgressCallback + ?Sized>(
        &mut self,
        generation: usize,
        callback: &mut C,
    ) -> Result<Option<StopReason>> {
        callback.on_generation_start(generation);
        let started = Instant::now();

        let mut pool = if generation == 0 {
            std::mem::take(&mut self.population)
        } else {
            self.vary(generation)?
        };

        self.phase = EnginePhase::Evaluating(generation);
        self.evaluate(&mut pool, generation, callback)?;
        self.hall_of_fame.update(pool.iter());

        self.phase = EnginePhase::Selecting(generation);
        self.population = if generation == 0 {
            pool
        } else {
            replace(
                self.config.variation,
                &self.selector,
                &self.population,
                pool,
                self.config.population_size,
                &mut self.rng,
            )?
        };

        let fitnesses = fitnesses_of(&self.population)?;
        let stats = GenerationStats::compute(&fitnesses);
        let elite_index = best_indices(&fitnesses, 1)
            .first()
            .copied()
            .ok_or_else(|| EvolveError::Selection("population is empty".to_string()))?;
        let elite = self.population[elite_index].clone();
        let elite_fitness = fitnesses[elite_index];

        // Detailed replay runs in the background; collected when the run ends.
        let handle = self
            .executor
            .submit(EvalTask::replay(elite.genes.clone(), Arc::clone(&self.context)))?;
        self.replays.insert(handle, generation);

        let record = GenerationRecord {
            index: generation,
            runtime_ms: started.elapsed().as_millis() as u64,
            food: stats.food,
            moves: stats.moves,
            elite_genes: elite.genes.clone(),
            elite_fitness,
            elite_moves: None,
        };
        self.log.push(record);
        self.next_generation = generation + 1;

        log::info!(
            "Generation {}/{}: elite {}, mean food {:.2}, hall of fame {}",
            generation + 1,
            self.config.generations,
            elite_fitness,
            stats.food.avg,
            self.hall_of_fame
                .fitness()
                .map(|f| f.to_string())
                .unwrap_or_default()
        );
        log::debug!(
            "  food  min {} max {} avg {:.3} std {:.3} mode {}",
            stats.food.min,
            stats.food.max,
            stats.food.avg,
            stats.food.std,
            stats.food.mode
        );
        log::debug!(
            "  moves min {} max {} avg {:.3} std {:.3} mode {}",
            stats.moves.min,
            stats.moves.max,
            stats.moves.avg,
            stats.moves.std,
            stats.moves.mode
        );

        callback.on_generation_complete(&ProgressEvent {
            percent_complete: (generation + 1) as f64 * 100.0 / self.config.generations as f64,
            generation,
            elite_genes: elite.genes,
            elite_fitness,
            stats,
        });

        if let Some(policy) = &self.checkpoint {
            if (generation + 1) % policy.interval.max(1) == 0 {
                self.write_checkpoint();
            }
        }

        let reason = self.termination.observe(elite_fitness.food, stats.food.avg);
        if let Some(reason) = reason {
            log::info!("Stopping early after generation {}: {}", generation + 1, reason);
        }
        Ok(reason)
    }

    fn restore_or_initialize(&mut self) -> Result<usize> {
        if let Some(policy) = self.checkpoint.clone() {
            match Checkpoint::load(&policy.path) {
                Ok(Some(saved)) => {
                    match saved.validate(&self.config, self.context.param_count()) {
                        Ok(()) => {
                            log::info!(
                                "Resuming from checkpoint {} at generation {}",
                                policy.path.display(),
                                saved.next_generation
                            );
                            let start = saved.next_generation;
                            self.population = saved.population;
                            self.hall_of_fame = saved.hall_of_fame;
                            self.rng = saved.rng;
                            self.log = saved.log;
                            self.termination = saved.termination;
                            self.next_generation = start;
                            return Ok(start);
                        }
                        Err(e) if policy.required => return Err(e),
                        // Overwritten by the first snapshot of the fresh run.
                        Err(e) => log::warn!(
                            "Ignoring checkpoint {}, starting fresh: {}",
                            policy.path.display(),
                            e
                        ),
                    }
                }
                Ok(None) if policy.required => {
                    return Err(EvolveError::Checkpoint(format!(
                        "required checkpoint {} not found",
                        policy.path.display()
                    )));
                }
                Ok(None) => {
                    log::debug!("No checkpoint at {}, starting fresh", policy.path.display());
                }
                Err(e) if policy.required => return Err(e),
                Err(e) => log::warn!("Ignoring unreadable checkpoint, starting fresh: {}", e),
            }
        }

        let bounds = GeneBounds::new(self.config.weight_min, self.config.weight_max);
        let length = self.context.param_count();
        self.population = (0..self.config.population_size)
            .map(|_| Individual::new(random_genes(length, bounds, &mut self.rng)))
            .collect();
        log::debug!(
            "Initialized {} individuals with {} genes each",
            self.population.len(),
            length
        );
        Ok(0)
    }

    /// Builds the offspring pool for `generation` from the current population.
    fn vary(&mut self, generation: usize) -> Result<Vec<Individual>> {
        self.phase = EnginePhase::Varying(generation - 1);
        match self.config.variation {
            VariationKind::InPlace => {
                let fitnesses = fitnesses_of(&self.population)?;
                let chosen =
                    self.selector
                        .select(&fitnesses, self.config.population_size, &mut self.rng)?;
                let parents: Vec<Individual> =
                    chosen.into_iter().map(|i| self.population[i].clone()).collect();
                Ok(var_and(&parents, &self.params, &mut self.rng))
            }
            _ => Ok(var_or(
                &self.population,
                self.config.lambda,
                &self.params,
                &mut self.rng,
            )),
        }
    }

    /// Fans out every invalid individual and waits for all of them.
    fn evaluate<C: ProgressCallback + ?Sized>(
        &mut self,
        pool: &mut [Individual],
        generation: usize,
        callback: &mut C,
    ) -> Result<()> {
        let mut pending: HashMap<TaskHandle, usize> = HashMap::new();
        for (index, individual) in pool.iter().enumerate() {
            if individual.is_valid() {
                continue;
            }
            let task = EvalTask::fitness(individual.genes.clone(), Arc::clone(&self.context));
            pending.insert(self.executor.submit(task)?, index);
        }

        let handles: Vec<TaskHandle> = pending.keys().copied().collect();
        let total = handles.len();
        log::debug!("Generation {}: evaluating {} individuals", generation, total);

        let mut done = 0;
        for item in self.executor.as_completed(&handles) {
            let (handle, result) = item?;
            let index = pending.get(&handle).copied().ok_or_else(|| {
                EvolveError::Executor(format!("unknown task handle {}", handle.0))
            })?;
            match result {
                Ok(outcome) => pool[index].fitness = Some(outcome.fitness),
                Err(e) => {
                    return Err(EvolveError::Evaluation {
                        generation,
                        index,
                        message: e.0,
                    })
                }
            }
            done += 1;
            callback.on_individual_evaluated(done, total);
        }
        Ok(())
    }

    /// Waits for elite replays and fills in the move breakdowns. With
    /// `replay_restored`, generations restored from a checkpoint are replayed
    /// here too.
    fn collect_replays(&mut self, replay_restored: bool) -> Result<()> {
        if replay_restored {
            let waiting: Vec<usize> = self.replays.values().copied().collect();
            for record in &self.log {
                if record.elite_moves.is_none() && !waiting.contains(&record.index) {
                    let task =
                        EvalTask::replay(record.elite_genes.clone(), Arc::clone(&self.context));
                    let handle = self.executor.submit(task)?;
                    self.replays.insert(handle, record.index);
                }
            }
        }

        let handles: Vec<TaskHandle> = self.replays.keys().copied().collect();
        for item in self.executor.as_completed(&handles) {
            let (handle, result) = item?;
            let Some(generation) = self.replays.remove(&handle) else {
                continue;
            };
            match result {
                Ok(outcome) => {
                    if let Some(record) = self.log.iter_mut().find(|r| r.index == generation) {
                        record.elite_moves = outcome.breakdown;
                    }
                }
                Err(e) => log::warn!("Elite replay for generation {} failed: {}", generation, e),
            }
        }
        Ok(())
    }

    fn write_checkpoint(&self) {
        let Some(policy) = &self.checkpoint else {
            return;
        };
        let fingerprint = match checkpoint::fingerprint(&self.config) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                log::error!("Failed to fingerprint run config: {}", e);
                return;
            }
        };
        let snapshot = Checkpoint {
            version: CHECKPOINT_VERSION,
            fingerprint,
            next_generation: self.next_generation,
            population: self.population.clone(),
            hall_of_fame: self.hall_of_fame.clone(),
            rng: self.rng.clone(),
            log: self.log.clone(),
            termination: self.termination.clone(),
        };
        match snapshot.save(&policy.path) {
            Ok(()) => log::debug!(
                "Checkpoint written at generation {} to {}",
                self.next_generation,
                policy.path.display()
            ),
            Err(e) => log::error!(
                "Failed to write checkpoint {}: {}",
                policy.path.display(),
                e
            ),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall_of_fame
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn log(&self) -> &[GenerationRecord] {
        &self.log
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }
}
