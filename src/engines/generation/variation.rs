//! Offspring production (`var_and`, `var_or`) and the replacement rule of
//! each variation kind.

use super::operators::{mutate, two_point_crossover, GeneBounds};
use super::selection::{fitnesses_of, Selector};
use crate::config::evolution::{MutationKind, RunConfig, VariationKind};
use crate::error::Result;
use crate::types::Individual;
use rand::seq::index::sample;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariationParams {
    pub prob_crossover: f64,
    pub prob_mutate: f64,
    pub mutation: MutationKind,
    pub bounds: GeneBounds,
    pub self_adaptive: bool,
}

impl VariationParams {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            prob_crossover: config.prob_crossover,
            prob_mutate: config.prob_mutate,
            mutation: config.mutation,
            bounds: GeneBounds::new(config.weight_min, config.weight_max),
            self_adaptive: config.variation.self_adaptive(),
        }
    }

    fn mutate<R: Rng>(&self, individual: &mut Individual, rng: &mut R) {
        if mutate(&mut individual.genes, self.mutation, self.bounds, self.self_adaptive, rng) {
            individual.invalidate();
        }
    }
}

/// Pairwise crossover of neighbours, then independent mutation of each child.
pub fn var_and<R: Rng>(
    parents: &[Individual],
    params: &VariationParams,
    rng: &mut R,
) -> Vec<Individual> {
    let mut offspring = parents.to_vec();

    for i in (1..offspring.len()).step_by(2) {
        if rng.gen::<f64>() < params.prob_crossover {
            let (left, right) = offspring.split_at_mut(i);
            let a = &mut left[i - 1];
            let b = &mut right[0];
            if two_point_crossover(&mut a.genes, &mut b.genes, rng) {
                a.invalidate();
                b.invalidate();
            }
        }
    }

    for child in offspring.iter_mut() {
        if rng.gen::<f64>() < params.prob_mutate {
            params.mutate(child, rng);
        }
    }

    offspring
}

/// Builds `lambda` children, each by exactly one of crossover, mutation or
/// plain reproduction.
pub fn var_or<R: Rng>(
    population: &[Individual],
    lambda: usize,
    params: &VariationParams,
    rng: &mut R,
) -> Vec<Individual> {
    let mut offspring = Vec::with_capacity(lambda);
    if population.is_empty() {
        return offspring;
    }

    for _ in 0..lambda {
        let op = rng.gen::<f64>();
        if op < params.prob_crossover {
            let (i, j) = if population.len() >= 2 {
                let picked = sample(rng, population.len(), 2);
                (picked.index(0), picked.index(1))
            } else {
                (0, 0)
            };
            let mut child = population[i].clone();
            let mut other = population[j].clone();
            if two_point_crossover(&mut child.genes, &mut other.genes, rng) {
                child.invalidate();
            }
            offspring.push(child);
        } else if op < params.prob_crossover + params.prob_mutate {
            let mut child = population[rng.gen_range(0..population.len())].clone();
            params.mutate(&mut child, rng);
            offspring.push(child);
        } else {
            offspring.push(population[rng.gen_range(0..population.len())].clone());
        }
    }

    offspring
}

/// Forms the next population of size `mu` from an evaluated offspring pool.
pub fn replace<R: Rng>(
    variation: VariationKind,
    selector: &Selector,
    population: &[Individual],
    offspring: Vec<Individual>,
    mu: usize,
    rng: &mut R,
) -> Result<Vec<Individual>> {
    let pick = |pool: &[Individual], chosen: Vec<usize>| -> Vec<Individual> {
        chosen.into_iter().map(|i| pool[i].clone()).collect()
    };

    match variation {
        VariationKind::InPlace => Ok(offspring),
        VariationKind::ReplaceAll => {
            let fitnesses = fitnesses_of(&offspring)?;
            let chosen = selector.select(&fitnesses, mu, rng)?;
            Ok(pick(&offspring, chosen))
        }
        VariationKind::SelectFromOffspring => {
            let fitnesses = fitnesses_of(&offspring)?;
            Ok(pick(&offspring, selector.best(&fitnesses, mu)))
        }
        VariationKind::SelectFromCombined | VariationKind::AdaptiveCombined => {
            let mut combined = population.to_vec();
            combined.extend(offspring);
            let fitnesses = fitnesses_of(&combined)?;
            Ok(pick(&combined, selector.best(&fitnesses, mu)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::evolution::SelectionKind;
    use crate::types::Fitness;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn params(p_cx: f64, p_mut: f64) -> VariationParams {
        VariationParams {
            prob_crossover: p_cx,
            prob_mutate: p_mut,
            mutation: MutationKind::BitFlip,
            bounds: GeneBounds::new(-5.0, 5.0),
            self_adaptive: false,
        }
    }

    fn evaluated(value: f64, food: u32) -> Individual {
        Individual {
            genes: vec![value; 8],
            fitness: Some(Fitness::new(food, 10)),
        }
    }

    #[test]
    fn test_var_and_without_operators_keeps_fitness() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let parents: Vec<Individual> = (0..6).map(|i| evaluated(i as f64, i)).collect();
        let offspring = var_and(&parents, &params(0.0, 0.0), &mut rng);
        assert_eq!(offspring, parents);
    }

    #[test]
    fn test_var_and_crossover_invalidates_changed_pairs() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let parents = vec![evaluated(0.0, 1), evaluated(1.0, 2), evaluated(2.0, 3)];
        let offspring = var_and(&parents, &params(1.0, 0.0), &mut rng);
        assert_eq!(offspring.len(), 3);
        assert!(!offspring[0].is_valid());
        assert!(!offspring[1].is_valid());
        // odd one out has no partner
        assert_eq!(offspring[2], parents[2]);
    }

    #[test]
    fn test_var_or_size_and_validity() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let parents: Vec<Individual> = (0..5).map(|i| evaluated(i as f64, i)).collect();

        let clones = var_or(&parents, 12, &params(0.0, 0.0), &mut rng);
        assert_eq!(clones.len(), 12);
        assert!(clones.iter().all(|c| c.is_valid() && parents.contains(c)));

        let crossed = var_or(&parents, 12, &params(1.0, 0.0), &mut rng);
        assert_eq!(crossed.len(), 12);
        assert!(crossed.iter().all(|c| !c.is_valid() && c.genes.len() == 8));
    }

    #[test]
    fn test_replace_select_from_combined_is_elitist() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let selector = Selector::new(SelectionKind::Tournament, Some(3));
        let population = vec![evaluated(9.0, 9), evaluated(1.0, 1)];
        let offspring = vec![evaluated(2.0, 2), evaluated(3.0, 3), evaluated(0.0, 0)];

        let next = replace(
            VariationKind::SelectFromCombined,
            &selector,
            &population,
            offspring.clone(),
            2,
            &mut rng,
        )
        .unwrap();
        let foods: Vec<u32> = next.iter().map(|i| i.fitness.unwrap().food).collect();
        assert_eq!(foods, vec![9, 3]);

        let next = replace(
            VariationKind::SelectFromOffspring,
            &selector,
            &population,
            offspring,
            2,
            &mut rng,
        )
        .unwrap();
        let foods: Vec<u32> = next.iter().map(|i| i.fitness.unwrap().food).collect();
        assert_eq!(foods, vec![3, 2]);
    }

    #[test]
    fn test_replace_all_uses_configured_selection() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let selector = Selector::new(SelectionKind::Worst, None);
        let offspring = vec![evaluated(2.0, 2), evaluated(3.0, 3), evaluated(0.0, 0)];
        let next =
            replace(VariationKind::ReplaceAll, &selector, &[], offspring, 2, &mut rng).unwrap();
        let foods: Vec<u32> = next.iter().map(|i| i.fitness.unwrap().food).collect();
        assert_eq!(foods, vec![0, 2]);
    }
}
