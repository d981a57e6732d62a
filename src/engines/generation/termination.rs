use crate::config::evolution::RunConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Spread of the mean-food window below which a run counts as plateaued.
pub const PLATEAU_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    GenerationsExhausted,
    AllFoodConsumed,
    Plateaued,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::GenerationsExhausted => "generations exhausted",
            StopReason::AllFoodConsumed => "all food consumed",
            StopReason::Plateaued => "fitness plateaued",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Early-termination predicates, checked once per generation.
///
/// Exhaustion is a success condition and always applies. The plateau check
/// only runs when early termination is on and the variation kind keeps
/// parents around long enough for the mean to settle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationDetector {
    total_food: u32,
    window: usize,
    plateau_enabled: bool,
    means: VecDeque<f64>,
}

impl TerminationDetector {
    pub fn new(config: &RunConfig, total_food: u32) -> Self {
        Self {
            total_food,
            window: config.mean_check_length,
            plateau_enabled: config.early_termination && config.variation.checks_plateau(),
            means: VecDeque::with_capacity(config.mean_check_length),
        }
    }

    /// Feeds one generation's best and mean food.
    pub fn observe(&mut self, best_food: u32, mean_food: f64) -> Option<StopReason> {
        if self.plateau_enabled && self.window > 0 {
            if self.means.len() == self.window {
                self.means.pop_front();
            }
            self.means.push_back(mean_food);
        }

        if self.total_food > 0 && best_food >= self.total_food {
            return Some(StopReason::AllFoodConsumed);
        }
        if self.plateau_enabled && self.window > 0 && self.means.len() == self.window {
            let n = self.means.len() as f64;
            let avg = self.means.iter().sum::<f64>() / n;
            let std = (self.means.iter().map(|m| (m - avg).powi(2)).sum::<f64>() / n).sqrt();
            log::debug!("Mean-food window std {:.4} over {} generations", std, self.window);
            if std < PLATEAU_THRESHOLD {
                return Some(StopReason::Plateaued);
            }
        }
        None
    }
}
