use crate::types::{Fitness, Genes, MoveStats};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregate statistics of one objective over a population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Most frequent value; the smallest one wins ties.
    pub mode: f64,
}

impl ObjectiveStats {
    pub fn from_values(values: &[u32]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let avg = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = values.iter().map(|&v| (v as f64 - avg).powi(2)).sum::<f64>() / n;

        let mut counts: HashMap<u32, usize> = HashMap::new();
        for &v in values {
            *counts.entry(v).or_insert(0) += 1;
        }
        let mode = counts
            .into_iter()
            .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then_with(|| vb.cmp(va)))
            .map(|(v, _)| v)
            .unwrap_or_default();

        Self {
            min: values.iter().copied().min().unwrap_or_default() as f64,
            max: values.iter().copied().max().unwrap_or_default() as f64,
            avg,
            std: var.sqrt(),
            mode: mode as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub food: ObjectiveStats,
    pub moves: ObjectiveStats,
}

impl GenerationStats {
    pub fn compute(fitnesses: &[Fitness]) -> Self {
        let food: Vec<u32> = fitnesses.iter().map(|f| f.food).collect();
        let moves: Vec<u32> = fitnesses.iter().map(|f| f.moves).collect();
        Self {
            food: ObjectiveStats::from_values(&food),
            moves: ObjectiveStats::from_values(&moves),
        }
    }
}

/// One line of the run log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub index: usize,
    pub runtime_ms: u64,
    pub food: ObjectiveStats,
    pub moves: ObjectiveStats,
    pub elite_genes: Genes,
    pub elite_fitness: Fitness,
    /// Filled from the elite replay once it has been collected.
    pub elite_moves: Option<MoveStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objective_stats() {
        let stats = ObjectiveStats::from_values(&[2, 4, 4, 4, 5, 5, 7, 9]);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.avg, 5.0);
        assert!((stats.std - 2.0).abs() < 1e-12);
        assert_eq!(stats.mode, 4.0);
    }

    #[test]
    fn test_mode_tie_prefers_smallest() {
        let stats = ObjectiveStats::from_values(&[7, 3, 7, 3, 1]);
        assert_eq!(stats.mode, 3.0);
    }

    #[test]
    fn test_empty_is_zeroed() {
        assert_eq!(ObjectiveStats::from_values(&[]), ObjectiveStats::default());
    }
}
