use crate::types::{Fitness, Individual};
use serde::{Deserialize, Serialize};

/// Best individual ever observed in a run (capacity one).
///
/// The archive only changes on strict improvement, so its fitness never
/// decreases over the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HallOfFame {
    best: Option<Individual>,
}

impl HallOfFame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers every evaluated individual. Returns `true` if the archive changed.
    pub fn update<'a, I>(&mut self, candidates: I) -> bool
    where
        I: IntoIterator<Item = &'a Individual>,
    {
        let mut improved = false;
        for candidate in candidates {
            let Some(fitness) = candidate.fitness else {
                continue;
            };
            if self.fitness().map_or(true, |current| fitness > current) {
                self.best = Some(candidate.clone());
                improved = true;
            }
        }
        improved
    }

    pub fn best(&self) -> Option<&Individual> {
        self.best.as_ref()
    }

    pub fn fitness(&self) -> Option<Fitness> {
        self.best.as_ref().and_then(|b| b.fitness)
    }

    pub fn len(&self) -> usize {
        usize::from(self.best.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.best.is_none()
    }
}
