use crate::{
    environment::{Controller, ControllerBlueprint, Trail, TrailBlueprint},
    types::{Action, Fitness, Genes, MoveStats},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything an evaluation needs besides the genes. Shared read-only
/// between all tasks of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalContext {
    pub controller: ControllerBlueprint,
    pub trail: TrailBlueprint,
    pub moves_limit: u32,
}

impl EvalContext {
    pub fn new(controller: ControllerBlueprint, trail: TrailBlueprint, moves_limit: u32) -> Self {
        Self {
            controller,
            trail,
            moves_limit,
        }
    }

    pub fn param_count(&self) -> usize {
        self.controller.param_count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalTask {
    pub genes: Genes,
    pub context: Arc<EvalContext>,
    /// Also report the per-action breakdown (elite replays).
    pub detailed: bool,
}

impl EvalTask {
    pub fn fitness(genes: Genes, context: Arc<EvalContext>) -> Self {
        Self {
            genes,
            context,
            detailed: false,
        }
    }

    pub fn replay(genes: Genes, context: Arc<EvalContext>) -> Self {
        Self {
            genes,
            context,
            detailed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub fitness: Fitness,
    pub breakdown: Option<MoveStats>,
}

/// Failure inside an evaluation. Plain message so it can cross a process
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{0}")]
pub struct EvalError(pub String);

pub type TaskResult = std::result::Result<Outcome, EvalError>;

/// Pure fitness function. Implementations must not touch shared mutable state.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, task: &EvalTask) -> TaskResult;
}

/// Runs the controller through a fresh copy of the trail.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrailEvaluator;

impl Evaluator for TrailEvaluator {
    fn evaluate(&self, task: &EvalTask) -> TaskResult {
        let trail = simulate(&task.genes, &task.context, |_| {})?;
        Ok(Outcome {
            fitness: Fitness::new(trail.food_consumed(), trail.moves_taken()),
            breakdown: task.detailed.then(|| trail.move_stats()),
        })
    }
}

/// Drives one agent until the move budget is spent or the food is gone.
pub fn simulate<F>(
    genes: &[f64],
    context: &EvalContext,
    mut on_action: F,
) -> Result<Trail, EvalError>
where
    F: FnMut(Action),
{
    let mut controller = context.controller.instantiate();
    controller
        .set_parameters(genes)
        .map_err(|e| EvalError(e.to_string()))?;

    let mut trail = Trail::new(&context.trail);
    for _ in 0..context.moves_limit {
        if trail.food_remaining() == 0 {
            break;
        }
        let action = controller.decide(trail.is_food_ahead());
        trail.apply(action);
        on_action(action);
    }
    Ok(trail)
}

/// The action sequence an individual produces, for replay and animation.
pub fn moves_of(genes: &[f64], context: &EvalContext) -> Result<Vec<Action>, EvalError> {
    let mut actions = Vec::with_capacity(context.moves_limit as usize);
    simulate(genes, context, |a| actions.push(a))?;
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Arc<EvalContext> {
        let trail = TrailBlueprint::parse("line", "3 1 1 1 0 0", 90).unwrap();
        let controller = ControllerBlueprint::Recurrent {
            hidden: 2,
            in_to_out: true,
        };
        Arc::new(EvalContext::new(controller, trail, 20))
    }

    fn always_forward(ctx: &EvalContext) -> Genes {
        let mut genes = vec![0.0; ctx.param_count()];
        // input→output block starts after input→hidden (2x2) and hidden→output (2x4)
        genes[12 + 3 * 2] = 1.0;
        genes[12 + 3 * 2 + 1] = 1.0;
        genes
    }

    #[test]
    fn test_stops_when_food_is_gone() {
        let ctx = context();
        let outcome = TrailEvaluator
            .evaluate(&EvalTask::fitness(always_forward(&ctx), ctx.clone()))
            .unwrap();
        assert_eq!(outcome.fitness, Fitness::new(3, 3));
        assert!(outcome.breakdown.is_none());
    }

    #[test]
    fn test_replay_reports_breakdown() {
        let ctx = context();
        let outcome = TrailEvaluator
            .evaluate(&EvalTask::replay(always_forward(&ctx), ctx.clone()))
            .unwrap();
        let breakdown = outcome.breakdown.unwrap();
        assert_eq!(breakdown.forward, 3);
        assert_eq!(breakdown.total(), outcome.fitness.moves);
    }

    #[test]
    fn test_move_budget_is_respected() {
        let ctx = context();
        let genes = vec![0.0; ctx.param_count()];
        let outcome = TrailEvaluator
            .evaluate(&EvalTask::fitness(genes, ctx.clone()))
            .unwrap();
        assert_eq!(outcome.fitness, Fitness::new(0, 20));
    }

    #[test]
    fn test_wrong_gene_length_is_an_error() {
        let ctx = context();
        let result = TrailEvaluator.evaluate(&EvalTask::fitness(vec![0.5; 3], ctx));
        assert!(result.is_err());
    }

    #[test]
    fn test_moves_of_matches_fitness() {
        let ctx = context();
        let actions = moves_of(&always_forward(&ctx), &ctx).unwrap();
        assert_eq!(actions, vec![Action::Forward; 3]);
    }
}
