pub mod mutation;
pub mod partition;
pub mod source;
pub mod checkpoint;
pub mod progress;
pub mod coordinator;

#[cfg(test)]
pub(crate) mod testing;

pub use mutation::{mutation_count, MutationPolicy};
pub use partition::{check_uniform, partition, sort_pool, PopulationPartitioner, Redistribution};
pub use source::GenomeSource;
pub use checkpoint::{CheckpointRecord, CheckpointStage, Checkpointer, MANIFEST_FILE};
pub use progress::{
    ChannelProgressCallback, GenerationReport, LogProgressCallback, ProgressCallback,
    ProgressMessage,
};
pub use coordinator::{GenerationCoordinator, Phase, RunSummary};
