//! All-to-all population exchange between a fixed set of ranks.
//!
//! Every rank calls [`CollectiveChannel::exchange`] the same number of times in
//! the same order. Each call blocks until all ranks have contributed and returns
//! the contributions indexed by rank, identically on every rank.

pub mod local;
pub mod tcp;

use crate::error::Result;
use serde::{Deserialize, Serialize};

pub use local::{LocalChannel, LocalCluster};
pub use tcp::TcpChannel;

/// Rank that owns checkpointing.
pub const LEADER_RANK: usize = 0;

/// Position of this process in the fixed group, constant for its lifetime.
pub trait Topology {
    fn rank(&self) -> usize;
    fn participant_count(&self) -> usize;

    fn is_leader(&self) -> bool {
        self.rank() == LEADER_RANK
    }
}

pub trait CollectiveChannel<T>: Topology {
    /// Contribute `local` and receive every rank's contribution in rank order.
    ///
    /// Contributions may differ in length; callers that slice the result at a
    /// fixed stride must check that themselves.
    fn exchange(&mut self, local: &[T]) -> Result<Vec<Vec<T>>>;

    /// Number of exchanges completed so far.
    fn epoch(&self) -> u64;

    fn barrier(&mut self) -> Result<()> {
        self.exchange(&[]).map(|_| ())
    }
}

/// One rank's contribution to one exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Envelope<T> {
    pub epoch: u64,
    pub rank: usize,
    pub payload: Vec<T>,
}
