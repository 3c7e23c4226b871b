use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdSortError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Domain error: {0}")]
    Domain(String),

    #[error("Collective desync on rank {rank}: {reason}")]
    CollectiveDesync { rank: usize, reason: String },

    #[error("Rank {peer} disconnected during exchange {epoch}")]
    PeerDisconnected { peer: usize, epoch: u64 },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Genome error: {0}")]
    Genome(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, IdSortError>;
