use super::checkpoint::CheckpointRecord;
use std::sync::mpsc::Sender;

/// Snapshot of one rank right after a sort-and-slice round.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub rank: usize,
    /// Generations completed; 0 after setup.
    pub generation: usize,
    pub global_best: Option<f64>,
    pub pool_size: usize,
    /// Fitness of every genome in the new local population, fittest first.
    pub local_fitness: Vec<f64>,
}

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, rank: usize, generation: usize);
    fn on_generation_complete(&mut self, report: &GenerationReport);
    fn on_checkpoint(&mut self, _record: &CheckpointRecord) {}
}

/// Reports through the `log` facade.
pub struct LogProgressCallback;

impl ProgressCallback for LogProgressCallback {
    fn on_generation_start(&mut self, rank: usize, generation: usize) {
        log::debug!("rank {} starting generation {}", rank, generation + 1);
    }

    fn on_generation_complete(&mut self, report: &GenerationReport) {
        for fitness in &report.local_fitness {
            log::debug!("rank {} genome fitness is {:.6e}", report.rank, fitness);
        }
        if report.rank == 0 {
            log::info!(
                "generation {} complete: global best {:.6e} over {} genomes",
                report.generation,
                report.global_best.unwrap_or(f64::NAN),
                report.pool_size
            );
        }
    }
}

pub enum ProgressMessage {
    GenerationStart { rank: usize, generation: usize },
    GenerationComplete(GenerationReport),
    Checkpoint(CheckpointRecord),
}

/// Forwards progress to another thread, e.g. a collector for all local ranks.
pub struct ChannelProgressCallback {
    sender: Sender<ProgressMessage>,
}

impl ChannelProgressCallback {
    pub fn new(sender: Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_generation_start(&mut self, rank: usize, generation: usize) {
        let _ = self
            .sender
            .send(ProgressMessage::GenerationStart { rank, generation });
    }

    fn on_generation_complete(&mut self, report: &GenerationReport) {
        let _ = self
            .sender
            .send(ProgressMessage::GenerationComplete(report.clone()));
    }

    fn on_checkpoint(&mut self, record: &CheckpointRecord) {
        let _ = self.sender.send(ProgressMessage::Checkpoint(record.clone()));
    }
}
