use crate::config::evolution::{MutationKind, PER_GENE_RATE};
use crate::types::Genes;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Inclusive gene range `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneBounds {
    pub min: f64,
    pub max: f64,
}

impl GeneBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        if self.min == self.max {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }
}

/// Generate a random gene vector
pub fn random_genes<R: Rng>(length: usize, bounds: GeneBounds, rng: &mut R) -> Genes {
    (0..length).map(|_| bounds.sample(rng)).collect()
}

/// Two-point crossover: swap the segment between two cut points.
///
/// Returns `true` when either vector changed.
pub fn two_point_crossover<R: Rng>(a: &mut [f64], b: &mut [f64], rng: &mut R) -> bool {
    let size = a.len().min(b.len());
    if size < 2 {
        return false;
    }

    let mut first = rng.gen_range(1..=size);
    let mut second = rng.gen_range(1..size);
    if second >= first {
        second += 1;
    } else {
        std::mem::swap(&mut first, &mut second);
    }

    let mut changed = false;
    for i in first..second {
        if a[i] != b[i] {
            changed = true;
        }
        std::mem::swap(&mut a[i], &mut b[i]);
    }
    changed
}

/// Population standard deviation of a gene vector.
pub fn gene_std(genes: &[f64]) -> f64 {
    if genes.is_empty() {
        return 0.0;
    }
    let n = genes.len() as f64;
    let mean = genes.iter().sum::<f64>() / n;
    (genes.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Mutation: randomly modify genes according to `kind`.
///
/// With `self_adaptive`, Gaussian noise uses the vector's own standard
/// deviation instead of the configured sigma. Returns `true` when any gene
/// changed.
pub fn mutate<R: Rng>(
    genes: &mut [f64],
    kind: MutationKind,
    bounds: GeneBounds,
    self_adaptive: bool,
    rng: &mut R,
) -> bool {
    let mut changed = false;
    match kind {
        MutationKind::BitFlip => {
            for gene in genes.iter_mut() {
                if rng.gen::<f64>() < PER_GENE_RATE {
                    let value = bounds.sample(rng);
                    changed |= value != *gene;
                    *gene = value;
                }
            }
        }
        MutationKind::Uniform { intensity } => {
            let rate = intensity.per_gene_rate();
            for gene in genes.iter_mut() {
                if rng.gen::<f64>() < rate {
                    let value = bounds.sample(rng);
                    changed |= value != *gene;
                    *gene = value;
                }
            }
        }
        MutationKind::Gaussian { sigma } => {
            let sigma = if self_adaptive { gene_std(genes) } else { sigma };
            // sigma is validated finite and non-negative; zero means no-op
            let normal = match Normal::new(0.0, sigma) {
                Ok(normal) if sigma > 0.0 => normal,
                _ => return false,
            };
            for gene in genes.iter_mut() {
                if rng.gen::<f64>() < PER_GENE_RATE {
                    let noise = normal.sample(rng);
                    changed |= noise != 0.0;
                    *gene += noise;
                }
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::evolution::MutationIntensity;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn bounds() -> GeneBounds {
        GeneBounds::new(-5.0, 5.0)
    }

    #[test]
    fn test_random_genes_in_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let genes = random_genes(500, bounds(), &mut rng);
        assert_eq!(genes.len(), 500);
        assert!(genes.iter().all(|g| (-5.0..=5.0).contains(g)));
    }

    #[test]
    fn test_crossover_swaps_one_contiguous_segment() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..50 {
            let mut a = vec![0.0; 10];
            let mut b = vec![1.0; 10];
            assert!(two_point_crossover(&mut a, &mut b, &mut rng));

            let swapped: Vec<usize> = (0..10).filter(|&i| a[i] == 1.0).collect();
            assert!(!swapped.is_empty());
            assert!(swapped.windows(2).all(|w| w[1] == w[0] + 1));
            for i in 0..10 {
                assert_eq!(a[i] + b[i], 1.0);
            }
        }
    }

    #[test]
    fn test_crossover_too_short_is_noop() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut a = vec![0.0];
        let mut b = vec![1.0];
        assert!(!two_point_crossover(&mut a, &mut b, &mut rng));
        assert_eq!((a[0], b[0]), (0.0, 1.0));
    }

    #[test]
    fn test_uniform_high_changes_more_than_low() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let count_changes = |intensity, rng: &mut ChaCha8Rng| {
            let mut genes = vec![10.0; 2000];
            mutate(&mut genes, MutationKind::Uniform { intensity }, bounds(), false, rng);
            genes.iter().filter(|&&g| g != 10.0).count()
        };
        let low = count_changes(MutationIntensity::Low, &mut rng);
        let high = count_changes(MutationIntensity::High, &mut rng);
        assert!(low > 0);
        assert!(high > low * 3);
    }

    #[test]
    fn test_zero_sigma_gaussian_is_noop() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut genes = vec![1.0; 50];
        let changed = mutate(
            &mut genes,
            MutationKind::Gaussian { sigma: 0.0 },
            bounds(),
            false,
            &mut rng,
        );
        assert!(!changed);

        // Constant vector has zero spread, so self-adaptive noise vanishes too.
        let changed = mutate(
            &mut genes,
            MutationKind::Gaussian { sigma: 1.0 },
            bounds(),
            true,
            &mut rng,
        );
        assert!(!changed);
        assert!(genes.iter().all(|&g| g == 1.0));
    }

    #[test]
    fn test_gene_std() {
        assert_eq!(gene_std(&[]), 0.0);
        assert!((gene_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_operators_preserve_length(
            seed in any::<u64>(),
            len in 1usize..120,
            sigma in 0.0f64..3.0,
        ) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut a = random_genes(len, bounds(), &mut rng);
            let mut b = random_genes(len, bounds(), &mut rng);
            two_point_crossover(&mut a, &mut b, &mut rng);
            for kind in [
                MutationKind::BitFlip,
                MutationKind::Uniform { intensity: MutationIntensity::Medium },
                MutationKind::Gaussian { sigma },
            ] {
                mutate(&mut a, kind, bounds(), false, &mut rng);
                mutate(&mut b, kind, bounds(), true, &mut rng);
            }
            prop_assert_eq!(a.len(), len);
            prop_assert_eq!(b.len(), len);
        }

        #[test]
        fn prop_resampling_stays_in_bounds(seed in any::<u64>()) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut genes = random_genes(64, bounds(), &mut rng);
            let uniform = MutationKind::Uniform { intensity: MutationIntensity::High };
            mutate(&mut genes, uniform, bounds(), false, &mut rng);
            mutate(&mut genes, MutationKind::BitFlip, bounds(), false, &mut rng);
            prop_assert!(genes.iter().all(|g| (-5.0..=5.0).contains(g)));
        }
    }
}
