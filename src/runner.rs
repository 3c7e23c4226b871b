use crate::config::{RunConfig, TransportConfig};
use crate::engines::collective::{
    CollectiveChannel, LocalChannel, LocalCluster, TcpChannel, Topology,
};
use crate::engines::generation::{
    ChannelProgressCallback, GenerationCoordinator, GenomeSource, ProgressMessage, RunSummary,
};
use crate::error::{IdSortError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

/// Runs every rank as a thread of this process.
pub struct LocalRunner {
    config: RunConfig,
    progress_tx: Option<Sender<ProgressMessage>>,
}

impl LocalRunner {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            progress_tx: None,
        }
    }

    /// Forward every rank's progress to `sender`.
    pub fn with_progress(mut self, sender: Sender<ProgressMessage>) -> Self {
        self.progress_tx = Some(sender);
        self
    }

    /// Run all ranks to completion. `factory` builds the genome source of each
    /// rank on that rank's thread.
    ///
    /// On failure the root cause is returned in preference to the
    /// disconnects it caused on the other ranks.
    pub fn run<S, F>(&self, factory: F) -> Result<Vec<RunSummary>>
    where
        S: GenomeSource,
        F: Fn(usize) -> Result<S> + Sync,
    {
        self.config.validate()?;
        let participant_count = self.config.cluster.participant_count;
        log::info!("starting {} local ranks", participant_count);

        let channels: Vec<LocalChannel<S::Genome>> = LocalCluster::channels(participant_count);
        let config = &self.config;
        let factory = &factory;

        let outcomes: Vec<Result<RunSummary>> = thread::scope(|scope| {
            let handles: Vec<_> = channels
                .into_iter()
                .map(|channel| {
                    let rank = channel.rank();
                    let progress_tx = self.progress_tx.clone();
                    thread::Builder::new()
                        .name(format!("rank-{}", rank))
                        .spawn_scoped(scope, move || {
                            run_rank(config, factory(rank)?, channel, progress_tx)
                        })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| match handle {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        Err(IdSortError::Transport(format!("rank {} panicked", rank)))
                    }),
                    Err(e) => Err(IdSortError::Io(e)),
                })
                .collect()
        });

        collect_outcomes(outcomes)
    }
}

/// Run this process as one rank of a TCP mesh described by `config`.
pub fn run_tcp<S>(config: &RunConfig, source: S) -> Result<RunSummary>
where
    S: GenomeSource,
    S::Genome: Serialize + DeserializeOwned,
{
    config.validate()?;
    let TransportConfig::Tcp {
        rank,
        connect_timeout_secs,
        ..
    } = &config.cluster.transport
    else {
        return Err(IdSortError::Configuration(
            "run_tcp needs a tcp transport".to_string(),
        ));
    };

    let peers = config.cluster.peer_addrs()?;
    log::info!("rank {} listening on {}", rank, peers[*rank]);
    let channel = TcpChannel::connect(*rank, &peers, Duration::from_secs(*connect_timeout_secs))?;

    GenerationCoordinator::new(&config.evolution, &config.checkpoint, source, channel)?.run()
}

fn run_rank<S, C>(
    config: &RunConfig,
    source: S,
    channel: C,
    progress_tx: Option<Sender<ProgressMessage>>,
) -> Result<RunSummary>
where
    S: GenomeSource,
    C: CollectiveChannel<S::Genome>,
{
    let mut coordinator =
        GenerationCoordinator::new(&config.evolution, &config.checkpoint, source, channel)?;
    if let Some(tx) = progress_tx {
        coordinator = coordinator.with_progress(Box::new(ChannelProgressCallback::new(tx)));
    }
    coordinator.run()
}

fn collect_outcomes(outcomes: Vec<Result<RunSummary>>) -> Result<Vec<RunSummary>> {
    let mut summaries = Vec::with_capacity(outcomes.len());
    let mut root_cause = None;
    let mut disconnect = None;

    for (rank, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(summary) => summaries.push(summary),
            Err(e @ IdSortError::PeerDisconnected { .. }) => {
                log::warn!("rank {} lost a peer: {}", rank, e);
                disconnect.get_or_insert(e);
            }
            Err(e) => {
                log::error!("rank {} failed: {}", rank, e);
                root_cause.get_or_insert(e);
            }
        }
    }

    match root_cause.or(disconnect) {
        Some(e) => Err(e),
        None => Ok(summaries),
    }
}
