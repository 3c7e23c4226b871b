pub mod traits;
pub mod evolution;
pub mod cluster;
pub mod checkpoint;
pub mod magnets;
pub mod manager;

pub use manager::{ConfigManager, RunConfig};
pub use evolution::EvolutionConfig;
pub use cluster::{ClusterConfig, TransportConfig};
pub use checkpoint::CheckpointConfig;
pub use magnets::MagnetConfig;
