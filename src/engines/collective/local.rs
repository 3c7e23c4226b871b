use super::{CollectiveChannel, Envelope, Topology};
use crate::error::{IdSortError, Result};
use std::sync::mpsc::{channel, Receiver, Sender};

/// Exchange endpoint for a rank running as a thread of this process.
///
/// Ranks are wired by one channel per ordered pair, so contributions from any
/// one sender arrive in the order they were sent.
pub struct LocalChannel<T> {
    rank: usize,
    epoch: u64,
    /// Indexed by destination rank.
    outboxes: Vec<Sender<Envelope<T>>>,
    /// Indexed by source rank.
    inboxes: Vec<Receiver<Envelope<T>>>,
}

pub struct LocalCluster;

impl LocalCluster {
    /// Build `participant_count` connected endpoints, element `r` belonging to rank `r`.
    pub fn channels<T: Send>(participant_count: usize) -> Vec<LocalChannel<T>> {
        let mut outboxes: Vec<Vec<Sender<Envelope<T>>>> =
            (0..participant_count).map(|_| Vec::with_capacity(participant_count)).collect();
        let mut inboxes: Vec<Vec<Receiver<Envelope<T>>>> =
            (0..participant_count).map(|_| Vec::with_capacity(participant_count)).collect();

        for src in 0..participant_count {
            for dst in 0..participant_count {
                let (tx, rx) = channel();
                outboxes[src].push(tx);
                inboxes[dst].push(rx);
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| LocalChannel {
                rank,
                epoch: 0,
                outboxes,
                inboxes,
            })
            .collect()
    }
}

impl<T> Topology for LocalChannel<T> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn participant_count(&self) -> usize {
        self.outboxes.len()
    }
}

impl<T: Clone + Send> CollectiveChannel<T> for LocalChannel<T> {
    fn exchange(&mut self, local: &[T]) -> Result<Vec<Vec<T>>> {
        self.epoch += 1;
        let epoch = self.epoch;

        for (peer, outbox) in self.outboxes.iter().enumerate() {
            outbox
                .send(Envelope {
                    epoch,
                    rank: self.rank,
                    payload: local.to_vec(),
                })
                .map_err(|_| IdSortError::PeerDisconnected { peer, epoch })?;
        }

        let mut contributions = Vec::with_capacity(self.inboxes.len());
        for (peer, inbox) in self.inboxes.iter().enumerate() {
            // Blocks until `peer` reaches this exchange; errors only once it is gone
            let envelope = inbox
                .recv()
                .map_err(|_| IdSortError::PeerDisconnected { peer, epoch })?;

            if envelope.epoch != epoch || envelope.rank != peer {
                return Err(IdSortError::CollectiveDesync {
                    rank: self.rank,
                    reason: format!(
                        "expected exchange {} from rank {}, got exchange {} from rank {}",
                        epoch, peer, envelope.epoch, envelope.rank
                    ),
                });
            }
            contributions.push(envelope.payload);
        }

        Ok(contributions)
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }
}
