//! Pareto ranking for the two trail objectives (food up, moves down).
//! Implements NSGA-II fast non-dominated sorting with crowding distance and
//! SPEA2 strength fitness with nearest-neighbour truncation.

use crate::types::Fitness;
use std::cmp::Ordering;

/// Defines whether an objective should be maximized or minimized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationDirection {
    Maximize,
    Minimize,
}

/// Directions of `Fitness::objectives()`, in order.
pub const TRAIL_DIRECTIONS: [OptimizationDirection; 2] =
    [OptimizationDirection::Maximize, OptimizationDirection::Minimize];

/// Check if A dominates B: no worse in every objective, strictly better in one.
pub fn dominates(
    a_objectives: &[f64],
    b_objectives: &[f64],
    directions: &[OptimizationDirection],
) -> bool {
    if a_objectives.len() != b_objectives.len() || a_objectives.len() != directions.len() {
        return false;
    }

    let mut at_least_one_better = false;

    for i in 0..a_objectives.len() {
        let a_val = a_objectives[i];
        let b_val = b_objectives[i];

        let (a_better, b_better) = match directions[i] {
            OptimizationDirection::Maximize => (a_val > b_val, b_val > a_val),
            OptimizationDirection::Minimize => (a_val < b_val, b_val < a_val),
        };

        if b_better {
            return false;
        }

        if a_better {
            at_least_one_better = true;
        }
    }

    at_least_one_better
}

fn fitness_dominates(a: &Fitness, b: &Fitness) -> bool {
    dominates(&a.objectives(), &b.objectives(), &TRAIL_DIRECTIONS)
}

/// Fast non-dominated sorting.
/// Returns indices grouped by Pareto front (0 = best) and each index's rank.
pub fn fast_non_dominated_sort(fitnesses: &[Fitness]) -> (Vec<Vec<usize>>, Vec<usize>) {
    let n = fitnesses.len();
    let mut ranks = vec![0; n];

    // how many individuals dominate i, and whom i dominates
    let mut domination_count = vec![0usize; n];
    let mut dominated_solutions: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut fronts: Vec<Vec<usize>> = Vec::new();

    let mut first_front = Vec::new();
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if fitness_dominates(&fitnesses[i], &fitnesses[j]) {
                dominated_solutions[i].push(j);
            } else if fitness_dominates(&fitnesses[j], &fitnesses[i]) {
                domination_count[i] += 1;
            }
        }
        if domination_count[i] == 0 {
            first_front.push(i);
        }
    }
    if first_front.is_empty() {
        return (fronts, ranks);
    }
    fronts.push(first_front);

    let mut front_index = 0;
    while front_index < fronts.len() {
        let mut next_front = Vec::new();
        for &i in &fronts[front_index] {
            for &j in &dominated_solutions[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    ranks[j] = front_index + 1;
                    next_front.push(j);
                }
            }
        }
        if !next_front.is_empty() {
            fronts.push(next_front);
        }
        front_index += 1;
    }

    (fronts, ranks)
}

/// Crowding distance of each member of `front`, in the same order.
/// Higher values indicate more isolated individuals.
pub fn crowding_distance(fitnesses: &[Fitness], front: &[usize]) -> Vec<f64> {
    let size = front.len();
    if size <= 2 {
        return vec![f64::INFINITY; size];
    }

    let mut distance = vec![0.0; size];
    for obj in 0..TRAIL_DIRECTIONS.len() {
        let value = |pos: usize| fitnesses[front[pos]].objectives()[obj];

        let mut order: Vec<usize> = (0..size).collect();
        order.sort_by(|&a, &b| value(a).partial_cmp(&value(b)).unwrap_or(Ordering::Equal));

        distance[order[0]] = f64::INFINITY;
        distance[order[size - 1]] = f64::INFINITY;

        let range = value(order[size - 1]) - value(order[0]);
        if range.abs() < 1e-10 {
            continue;
        }

        for i in 1..(size - 1) {
            distance[order[i]] += (value(order[i + 1]) - value(order[i - 1])) / range;
        }
    }
    distance
}

/// NSGA-II environmental selection: whole fronts first, then the last front
/// by descending crowding distance. Returns `k` distinct indices.
pub fn select_nsga2(fitnesses: &[Fitness], k: usize) -> Vec<usize> {
    let k = k.min(fitnesses.len());
    let (fronts, _) = fast_non_dominated_sort(fitnesses);

    let mut chosen = Vec::with_capacity(k);
    for front in fronts {
        if chosen.len() + front.len() <= k {
            chosen.extend(front);
            continue;
        }
        let distance = crowding_distance(fitnesses, &front);
        let mut order: Vec<usize> = (0..front.len()).collect();
        order.sort_by(|&a, &b| distance[b].partial_cmp(&distance[a]).unwrap_or(Ordering::Equal));
        let remaining = k - chosen.len();
        chosen.extend(order.into_iter().take(remaining).map(|pos| front[pos]));
        break;
    }
    chosen
}

fn squared_distance(a: &Fitness, b: &Fitness) -> f64 {
    a.objectives()
        .iter()
        .zip(b.objectives().iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum()
}

/// SPEA2 environmental selection. Returns `k` distinct indices.
pub fn select_spea2(fitnesses: &[Fitness], k: usize) -> Vec<usize> {
    let n = fitnesses.len();
    let k = k.min(n);

    // strength = number of individuals each one dominates
    let mut strength = vec![0usize; n];
    let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            if fitness_dominates(&fitnesses[i], &fitnesses[j]) {
                strength[i] += 1;
                dominated_by[j].push(i);
            } else if fitness_dominates(&fitnesses[j], &fitnesses[i]) {
                strength[j] += 1;
                dominated_by[i].push(j);
            }
        }
    }

    let mut raw: Vec<f64> = (0..n)
        .map(|i| dominated_by[i].iter().map(|&j| strength[j] as f64).sum())
        .collect();

    let mut chosen: Vec<usize> = (0..n).filter(|&i| raw[i] < 1.0).collect();

    if chosen.len() < k {
        // density from the distance to the sqrt(n)-th nearest neighbour
        let kth = ((n as f64).sqrt() as usize).min(n.saturating_sub(1));
        for i in 0..n {
            let mut distances: Vec<f64> = (0..n)
                .map(|j| squared_distance(&fitnesses[i], &fitnesses[j]))
                .collect();
            distances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            raw[i] += 1.0 / (distances[kth] + 2.0);
        }

        let mut rest: Vec<usize> = (0..n).filter(|i| !chosen.contains(i)).collect();
        rest.sort_by(|&a, &b| raw[a].partial_cmp(&raw[b]).unwrap_or(Ordering::Equal));
        let missing = k - chosen.len();
        chosen.extend(rest.into_iter().take(missing));
    } else if chosen.len() > k {
        truncate_by_neighbours(fitnesses, &mut chosen, k);
    }

    chosen
}

/// Repeatedly drops the member whose sorted neighbour distances are
/// lexicographically smallest until `k` remain.
fn truncate_by_neighbours(fitnesses: &[Fitness], chosen: &mut Vec<usize>, k: usize) {
    while chosen.len() > k {
        let neighbours: Vec<Vec<f64>> = chosen
            .iter()
            .map(|&i| {
                let mut d: Vec<f64> = chosen
                    .iter()
                    .filter(|&&j| j != i)
                    .map(|&j| squared_distance(&fitnesses[i], &fitnesses[j]))
                    .collect();
                d.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
                d
            })
            .collect();

        let mut victim = 0;
        for pos in 1..chosen.len() {
            let ord = neighbours[pos]
                .iter()
                .zip(neighbours[victim].iter())
                .map(|(a, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal);
            if ord == Ordering::Less {
                victim = pos;
            }
        }
        chosen.remove(victim);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(food: u32, moves: u32) -> Fitness {
        Fitness::new(food, moves)
    }

    #[test]
    fn test_dominance_mixed() {
        // more food and fewer moves
        assert!(dominates(&[10.0, 5.0], &[5.0, 10.0], &TRAIL_DIRECTIONS));
        // more food but more moves - no dominance
        assert!(!dominates(&[10.0, 15.0], &[5.0, 10.0], &TRAIL_DIRECTIONS));
        // equal - no dominance
        assert!(!dominates(&[3.0, 3.0], &[3.0, 3.0], &TRAIL_DIRECTIONS));
    }

    #[test]
    fn test_fast_non_dominated_sort() {
        let fitnesses = vec![
            f(5, 50), // front 0
            f(3, 10), // front 0
            f(1, 2),  // front 0
            f(2, 20), // front 1 (dominated by 3/10)
            f(1, 30), // front 2
        ];

        let (fronts, ranks) = fast_non_dominated_sort(&fitnesses);
        assert_eq!(fronts.len(), 3);
        assert_eq!(fronts[0].len(), 3);
        assert_eq!(ranks, vec![0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_crowding_distance_boundaries() {
        let fitnesses = vec![f(5, 50), f(3, 10), f(1, 2)];
        let distance = crowding_distance(&fitnesses, &[0, 1, 2]);
        assert!(distance[0].is_infinite());
        assert!(distance[2].is_infinite());
        assert!(distance[1].is_finite() && distance[1] > 0.0);
    }

    #[test]
    fn test_nsga2_prefers_first_front() {
        let fitnesses = vec![f(1, 30), f(5, 50), f(2, 20), f(3, 10), f(1, 2)];
        let mut chosen = select_nsga2(&fitnesses, 3);
        chosen.sort();
        assert_eq!(chosen, vec![1, 3, 4]);
    }

    #[test]
    fn test_nsga2_breaks_front_by_crowding() {
        // one front of four; the two extremes are infinitely crowded
        let fitnesses = vec![f(1, 1), f(2, 2), f(3, 3), f(4, 4)];
        let mut chosen = select_nsga2(&fitnesses, 2);
        chosen.sort();
        assert_eq!(chosen, vec![0, 3]);
    }

    #[test]
    fn test_spea2_fills_from_dominated() {
        let fitnesses = vec![f(5, 10), f(4, 12), f(3, 14), f(2, 16)];
        // single non-dominated point, the rest are filled by raw fitness
        let chosen = select_spea2(&fitnesses, 3);
        assert_eq!(chosen, vec![0, 1, 2]);
    }

    #[test]
    fn test_spea2_truncates_crowded_front() {
        let fitnesses = vec![f(1, 1), f(5, 20), f(5, 20), f(9, 40)];
        let chosen = select_spea2(&fitnesses, 3);
        assert_eq!(chosen.len(), 3);
        // one of the duplicates goes first
        assert!(chosen.contains(&0));
        assert!(chosen.contains(&3));
    }

    #[test]
    fn test_selection_without_replacement() {
        let fitnesses: Vec<Fitness> = (0..20).map(|i| f(i % 4, 20 - i)).collect();
        for chosen in [select_nsga2(&fitnesses, 10), select_spea2(&fitnesses, 10)] {
            let mut unique = chosen.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), 10);
        }
    }
}
