use super::evolution_engine::ProgressCallback;
use super::statistics::GenerationStats;
use crate::types::{Fitness, Genes};
use serde::{Deserialize, Serialize};

/// Emitted once per completed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub percent_complete: f64,
    pub generation: usize,
    pub elite_genes: Genes,
    pub elite_fitness: Fitness,
    pub stats: GenerationStats,
}

/// Discards everything; for callers that only want the final outcome.
pub struct SilentProgressCallback;

impl ProgressCallback for SilentProgressCallback {}

// For handing progress to another thread
pub struct IpcProgressCallback {
    sender: std::sync::mpsc::Sender<ProgressMessage>,
}

#[derive(Debug, Clone)]
pub enum ProgressMessage {
    GenerationStart(usize),
    GenerationComplete(ProgressEvent),
    IndividualEvaluated { done: usize, total: usize },
}

impl IpcProgressCallback {
    pub fn new(sender: std::sync::mpsc::Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for IpcProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        let _ = self.sender.send(ProgressMessage::GenerationStart(generation));
    }

    fn on_generation_complete(&mut self, event: &ProgressEvent) {
        let _ = self
            .sender
            .send(ProgressMessage::GenerationComplete(event.clone()));
    }

    fn on_individual_evaluated(&mut self, done: usize, total: usize) {
        let _ = self
            .sender
            .send(ProgressMessage::IndividualEvaluated { done, total });
    }
}
