use super::traits::ConfigSection;
use crate::error::EvolveError;
use serde::{Deserialize, Serialize};

/// Immutable parameters of one evolutionary run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub trail_id: String,
    pub controller_id: u32,
    pub generations: usize,
    /// μ
    pub population_size: usize,
    /// λ, only used by variation kinds that grow an offspring pool
    pub lambda: usize,
    pub moves_limit: u32,
    pub mutation: MutationKind,
    pub prob_mutate: f64,
    pub prob_crossover: f64,
    pub weight_min: f64,
    pub weight_max: f64,
    pub selection: SelectionKind,
    pub tournament_size: Option<usize>,
    pub variation: VariationKind,
    pub mean_check_length: usize,
    pub early_termination: bool,
    pub repeat: usize,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    Tournament,
    Roulette,
    Nsga2,
    Spea2,
    Random,
    Best,
    Worst,
}

impl SelectionKind {
    /// Pareto-rank kinds order individuals by dominance instead of total fitness.
    pub fn is_pareto(self) -> bool {
        matches!(self, SelectionKind::Nsga2 | SelectionKind::Spea2)
    }

    /// Deterministic kinds pick without replacement.
    pub fn with_replacement(self) -> bool {
        matches!(
            self,
            SelectionKind::Tournament | SelectionKind::Roulette | SelectionKind::Random
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariationKind {
    /// Select μ, vary them, and let them replace the population.
    InPlace,
    /// λ offspring; the configured selection picks μ of them.
    ReplaceAll,
    /// λ offspring; best μ of the offspring survive.
    SelectFromOffspring,
    /// λ offspring; best μ of offspring and parents survive.
    SelectFromCombined,
    /// As `SelectFromCombined`, with self-adaptive Gaussian step size.
    AdaptiveCombined,
}

impl VariationKind {
    pub fn uses_lambda(self) -> bool {
        !matches!(self, VariationKind::InPlace)
    }

    pub fn offspring_size(self, mu: usize, lambda: usize) -> usize {
        if self.uses_lambda() {
            lambda
        } else {
            mu
        }
    }

    /// Kinds paired with the mean-fitness plateau check.
    pub fn checks_plateau(self) -> bool {
        matches!(
            self,
            VariationKind::SelectFromOffspring
                | VariationKind::SelectFromCombined
                | VariationKind::AdaptiveCombined
        )
    }

    pub fn self_adaptive(self) -> bool {
        matches!(self, VariationKind::AdaptiveCombined)
    }

    pub fn name(self) -> &'static str {
        match self {
            VariationKind::InPlace => "in_place",
            VariationKind::ReplaceAll => "replace_all",
            VariationKind::SelectFromOffspring => "select_from_offspring",
            VariationKind::SelectFromCombined => "select_from_combined",
            VariationKind::AdaptiveCombined => "adaptive_combined",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationIntensity {
    Low,
    Medium,
    High,
}

impl MutationIntensity {
    pub fn per_gene_rate(self) -> f64 {
        match self {
            MutationIntensity::Low => 0.05,
            MutationIntensity::Medium => 0.10,
            MutationIntensity::High => 0.30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationKind {
    /// Replace a gene with a fresh in-range value at a fixed per-gene rate.
    BitFlip,
    /// Resample genes uniformly in range at the given intensity.
    Uniform { intensity: MutationIntensity },
    /// Additive zero-mean noise.
    Gaussian { sigma: f64 },
}

/// Per-gene rate used by bit-style and Gaussian mutation.
pub const PER_GENE_RATE: f64 = 0.05;

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            trail_id: "five_food".to_string(),
            controller_id: 1,
            generations: 200,
            population_size: 300,
            lambda: 600,
            moves_limit: 200,
            mutation: MutationKind::BitFlip,
            prob_mutate: 0.2,
            prob_crossover: 0.5,
            weight_min: -5.0,
            weight_max: 5.0,
            selection: SelectionKind::Tournament,
            tournament_size: Some(3),
            variation: VariationKind::InPlace,
            mean_check_length: 10,
            early_termination: true,
            repeat: 1,
            seed: None,
        }
    }
}

impl RunConfig {
    pub fn offspring_size(&self) -> usize {
        self.variation
            .offspring_size(self.population_size, self.lambda)
    }

    /// λ as it is recorded in run logs: zero for μ-only variation kinds.
    pub fn recorded_lambda(&self) -> usize {
        if self.variation.uses_lambda() {
            self.lambda
        } else {
            0
        }
    }
}

fn probability(name: &str, value: f64) -> Result<(), EvolveError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(EvolveError::Configuration(format!(
            "{} must be between 0 and 1, got {}",
            name, value
        )));
    }
    Ok(())
}

impl ConfigSection for RunConfig {
    fn section_name() -> &'static str {
        "run"
    }

    fn validate(&self) -> Result<(), EvolveError> {
        if self.population_size == 0 {
            return Err(EvolveError::Configuration(
                "population_size (mu) must be at least 1".to_string(),
            ));
        }
        if self.generations == 0 {
            return Err(EvolveError::Configuration(
                "generations must be at least 1".to_string(),
            ));
        }
        if self.repeat == 0 {
            return Err(EvolveError::Configuration(
                "repeat must be at least 1".to_string(),
            ));
        }
        if !self.weight_min.is_finite() || !self.weight_max.is_finite() {
            return Err(EvolveError::Configuration(
                "weight_min and weight_max must be finite".to_string(),
            ));
        }
        if self.weight_min > self.weight_max {
            return Err(EvolveError::Configuration(format!(
                "weight_min ({}) must not exceed weight_max ({})",
                self.weight_min, self.weight_max
            )));
        }
        probability("prob_mutate", self.prob_mutate)?;
        probability("prob_crossover", self.prob_crossover)?;

        if self.variation.uses_lambda() {
            if self.lambda <= self.population_size {
                return Err(EvolveError::Configuration(format!(
                    "lambda ({}) must be greater than population_size/mu ({}) for {} variation",
                    self.lambda,
                    self.population_size,
                    self.variation.name()
                )));
            }
            if self.prob_crossover + self.prob_mutate > 1.0 {
                return Err(EvolveError::Configuration(format!(
                    "prob_crossover + prob_mutate ({}) must not exceed 1 for {} variation",
                    self.prob_crossover + self.prob_mutate,
                    self.variation.name()
                )));
            }
        }

        if self.selection == SelectionKind::Tournament {
            match self.tournament_size {
                None => {
                    return Err(EvolveError::Configuration(
                        "tournament selection requires tournament_size".to_string(),
                    ))
                }
                Some(0) => {
                    return Err(EvolveError::Configuration(
                        "tournament_size must be at least 1".to_string(),
                    ))
                }
                Some(_) => {}
            }
        }

        if self.selection.is_pareto() && self.variation == VariationKind::InPlace {
            return Err(EvolveError::Configuration(format!(
                "{:?} selection is incompatible with in_place variation; \
                 use a lambda-based variation kind",
                self.selection
            )));
        }

        if let MutationKind::Gaussian { sigma } = self.mutation {
            if !sigma.is_finite() || sigma < 0.0 {
                return Err(EvolveError::Configuration(format!(
                    "gaussian mutation sigma must be a non-negative number, got {}",
                    sigma
                )));
            }
        }

        if self.early_termination && self.mean_check_length == 0 {
            return Err(EvolveError::Configuration(
                "mean_check_length must be at least 1 when early termination is enabled"
                    .to_string(),
            ));
        }

        Ok(())
    }
}
