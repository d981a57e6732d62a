//! Selection kinds. Every function returns indices into its input, so a
//! selection can repeat an individual but never invent one.

use super::pareto::{select_nsga2, select_spea2};
use crate::config::evolution::SelectionKind;
use crate::error::{EvolveError, Result};
use crate::types::{Fitness, Individual};
use rand::Rng;

/// Resolved selection strategy for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selector {
    pub kind: SelectionKind,
    pub tournament_size: usize,
}

impl Selector {
    pub fn new(kind: SelectionKind, tournament_size: Option<usize>) -> Self {
        Self {
            kind,
            tournament_size: tournament_size.unwrap_or(1).max(1),
        }
    }

    /// Picks `k` indices from `fitnesses`.
    pub fn select<R: Rng>(
        &self,
        fitnesses: &[Fitness],
        k: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if fitnesses.is_empty() {
            return Err(EvolveError::Selection(
                "cannot select from an empty population".to_string(),
            ));
        }
        if !self.kind.with_replacement() && k > fitnesses.len() {
            return Err(EvolveError::Selection(format!(
                "{:?} selection picks without replacement: asked for {} of {}",
                self.kind,
                k,
                fitnesses.len()
            )));
        }

        let chosen = match self.kind {
            SelectionKind::Tournament => (0..k)
                .map(|_| tournament_selection(fitnesses, self.tournament_size, rng))
                .collect(),
            SelectionKind::Roulette => (0..k).map(|_| roulette_selection(fitnesses, rng)).collect(),
            SelectionKind::Random => (0..k).map(|_| rng.gen_range(0..fitnesses.len())).collect(),
            SelectionKind::Nsga2 => select_nsga2(fitnesses, k),
            SelectionKind::Spea2 => select_spea2(fitnesses, k),
            SelectionKind::Best => best_indices(fitnesses, k),
            SelectionKind::Worst => worst_indices(fitnesses, k),
        };
        Ok(chosen)
    }

    /// The `k` fittest by this selector's ordering: Pareto rank for the
    /// multi-objective kinds, total fitness order for everything else.
    pub fn best(&self, fitnesses: &[Fitness], k: usize) -> Vec<usize> {
        match self.kind {
            SelectionKind::Nsga2 => select_nsga2(fitnesses, k),
            SelectionKind::Spea2 => select_spea2(fitnesses, k),
            _ => best_indices(fitnesses, k),
        }
    }
}

/// Fitness of every individual, or an error naming the first unevaluated one.
pub fn fitnesses_of(individuals: &[Individual]) -> Result<Vec<Fitness>> {
    individuals
        .iter()
        .enumerate()
        .map(|(i, ind)| {
            ind.fitness.ok_or_else(|| {
                EvolveError::Selection(format!("individual {} reached selection unevaluated", i))
            })
        })
        .collect()
}

/// Tournament selection: best of `size` random contestants, first wins ties
pub fn tournament_selection<R: Rng>(fitnesses: &[Fitness], size: usize, rng: &mut R) -> usize {
    let mut best_idx = rng.gen_range(0..fitnesses.len());

    for _ in 1..size {
        let idx = rng.gen_range(0..fitnesses.len());
        if fitnesses[idx] > fitnesses[best_idx] {
            best_idx = idx;
        }
    }

    best_idx
}

/// Roulette wheel selection: probability proportional to food collected
pub fn roulette_selection<R: Rng>(fitnesses: &[Fitness], rng: &mut R) -> usize {
    let total: u64 = fitnesses.iter().map(|f| f.food as u64).sum();

    if total == 0 {
        // Nobody ate anything, pick uniformly
        return rng.gen_range(0..fitnesses.len());
    }

    let mut spin = rng.gen_range(0..total);
    for (idx, fitness) in fitnesses.iter().enumerate() {
        let slice = fitness.food as u64;
        if spin < slice {
            return idx;
        }
        spin -= slice;
    }

    fitnesses.len() - 1
}

/// Indices sorted fittest first; ties keep their input order.
pub fn best_indices(fitnesses: &[Fitness], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..fitnesses.len()).collect();
    order.sort_by(|&a, &b| fitnesses[b].cmp(&fitnesses[a]));
    order.truncate(k);
    order
}

pub fn worst_indices(fitnesses: &[Fitness], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..fitnesses.len()).collect();
    order.sort_by(|&a, &b| fitnesses[a].cmp(&fitnesses[b]));
    order.truncate(k);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn f(food: u32, moves: u32) -> Fitness {
        Fitness::new(food, moves)
    }

    #[test]
    fn test_tournament_full_size_picks_best() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let fitnesses = vec![f(1, 5), f(4, 9), f(4, 3), f(0, 1)];
        // with enough contestants the best is almost surely drawn
        let picks: Vec<usize> = (0..50)
            .map(|_| tournament_selection(&fitnesses, 40, &mut rng))
            .collect();
        assert!(picks.iter().all(|&i| i == 2));
    }

    #[test]
    fn test_roulette_ignores_starving_individuals() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let fitnesses = vec![f(0, 5), f(3, 5), f(0, 5), f(1, 5)];
        let mut counts = [0usize; 4];
        for _ in 0..2000 {
            counts[roulette_selection(&fitnesses, &mut rng)] += 1;
        }
        assert_eq!(counts[0], 0);
        assert_eq!(counts[2], 0);
        assert!(counts[1] > counts[3] * 2);
    }

    #[test]
    fn test_roulette_uniform_when_nothing_eaten() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let fitnesses = vec![f(0, 5); 3];
        let mut counts = [0usize; 3];
        for _ in 0..300 {
            counts[roulette_selection(&fitnesses, &mut rng)] += 1;
        }
        assert!(counts.iter().all(|&c| c > 0));
    }

    #[test]
    fn test_best_and_worst() {
        let fitnesses = vec![f(2, 10), f(5, 30), f(5, 20), f(0, 0)];
        assert_eq!(best_indices(&fitnesses, 2), vec![2, 1]);
        assert_eq!(worst_indices(&fitnesses, 2), vec![3, 0]);
    }

    #[test]
    fn test_without_replacement_rejects_oversized_request() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let fitnesses = vec![f(1, 1); 4];
        let kinds = [
            SelectionKind::Best,
            SelectionKind::Worst,
            SelectionKind::Nsga2,
            SelectionKind::Spea2,
        ];
        for kind in kinds {
            let selector = Selector::new(kind, None);
            assert!(selector.select(&fitnesses, 5, &mut rng).is_err());
            assert_eq!(selector.select(&fitnesses, 4, &mut rng).unwrap().len(), 4);
        }
        let random = Selector::new(SelectionKind::Random, None);
        assert_eq!(random.select(&fitnesses, 9, &mut rng).unwrap().len(), 9);
    }

    #[test]
    fn test_fitnesses_of_rejects_invalid() {
        let mut valid = Individual::new(vec![0.0]);
        valid.fitness = Some(f(1, 1));
        let invalid = Individual::new(vec![0.0]);
        assert!(fitnesses_of(&[valid.clone()]).is_ok());
        let err = fitnesses_of(&[valid, invalid]).unwrap_err().to_string();
        assert!(err.contains("individual 1"));
    }
}
