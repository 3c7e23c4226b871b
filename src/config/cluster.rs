use super::traits::{invalid, ConfigSection};
use crate::error::IdSortError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// How ranks reach each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Every rank is a thread of this process.
    Local,
    /// This process is `rank`; `peers[r]` is the listen address of rank `r`.
    Tcp {
        rank: usize,
        peers: Vec<String>,
        #[serde(default = "default_connect_timeout_secs")]
        connect_timeout_secs: u64,
    },
}

fn default_connect_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub participant_count: usize,
    pub transport: TransportConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            participant_count: 10,
            transport: TransportConfig::Local,
        }
    }
}

impl ClusterConfig {
    /// Parsed peer addresses for the TCP transport.
    pub fn peer_addrs(&self) -> Result<Vec<SocketAddr>, IdSortError> {
        match &self.transport {
            TransportConfig::Local => Ok(Vec::new()),
            TransportConfig::Tcp { peers, .. } => peers
                .iter()
                .map(|p| {
                    p.parse::<SocketAddr>()
                        .map_err(|e| invalid::<Self>(format!("bad peer address '{}': {}", p, e)))
                })
                .collect(),
        }
    }
}

impl ConfigSection for ClusterConfig {
    fn section_name() -> &'static str {
        "cluster"
    }

    fn validate(&self) -> Result<(), IdSortError> {
        if self.participant_count == 0 {
            return Err(invalid::<Self>("participant_count must be at least 1"));
        }
        if let TransportConfig::Tcp { rank, peers, .. } = &self.transport {
            if peers.len() != self.participant_count {
                return Err(invalid::<Self>(format!(
                    "{} peers listed for {} participants",
                    peers.len(),
                    self.participant_count
                )));
            }
            if *rank >= self.participant_count {
                return Err(invalid::<Self>(format!(
                    "rank {} out of range for {} participants",
                    rank, self.participant_count
                )));
            }
            self.peer_addrs()?;
        }
        Ok(())
    }
}
