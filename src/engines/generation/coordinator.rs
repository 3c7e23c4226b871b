//! Per-rank driver of the distributed generational loop.
//!
//! ```text
//! Setup ──► Evolving ──(iterations done | target reached)──► Finalizing ──► Done
//!   │                                                           ▲
//!   └────────────────────(iterations == 0)──────────────────────┘
//! ```
//!
//! Every rank runs the same sequence of collective calls: one barrier, one
//! exchange in Setup (none when resuming), one per generation and one in
//! Finalizing. Anything that can fail locally is checked before the rank's
//! next exchange, so a failing rank leaves the collective instead of
//! contributing a malformed population.

use super::checkpoint::{CheckpointStage, Checkpointer};
use super::mutation::MutationPolicy;
use super::partition::{sort_pool, PopulationPartitioner, Redistribution};
use super::progress::{GenerationReport, LogProgressCallback, ProgressCallback};
use super::source::GenomeSource;
use crate::config::traits::ConfigSection;
use crate::config::{CheckpointConfig, EvolutionConfig};
use crate::engines::collective::{CollectiveChannel, Topology};
use crate::error::{IdSortError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Evolving,
    Finalizing,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub rank: usize,
    /// Generations evolved by this run, excluding setup and the final flush.
    pub generations: usize,
    /// Generation number of the last checkpoint, counting resumed ones.
    pub last_generation: usize,
    pub stopped_at_target: bool,
    pub global_best: Option<f64>,
    pub local_best: Option<f64>,
    pub checkpoints_written: usize,
    pub checkpoint_failures: usize,
}

pub struct GenerationCoordinator<S: GenomeSource, C> {
    config: EvolutionConfig,
    restart: bool,
    output_directory: PathBuf,
    source: S,
    channel: C,
    policy: MutationPolicy,
    partitioner: PopulationPartitioner,
    checkpointer: Option<Checkpointer>,
    progress: Box<dyn ProgressCallback>,
    rng: StdRng,
    phase: Phase,
    population: Vec<S::Genome>,
    /// Offspring plus parents of the last generation, flushed once more in Finalizing.
    working_buffer: Vec<S::Genome>,
    generation: usize,
    generations_run: usize,
    global_best: Option<f64>,
    stopped_at_target: bool,
}

impl<S, C> GenerationCoordinator<S, C>
where
    S: GenomeSource,
    C: CollectiveChannel<S::Genome>,
{
    pub fn new(
        config: &EvolutionConfig,
        checkpoint: &CheckpointConfig,
        source: S,
        channel: C,
    ) -> Result<Self> {
        config.validate()?;
        checkpoint.validate()?;

        let rank = channel.rank();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(rank as u64)),
            None => StdRng::from_entropy(),
        };
        let checkpointer = channel
            .is_leader()
            .then(|| Checkpointer::new(checkpoint.output_directory.clone()));

        Ok(Self {
            config: config.clone(),
            restart: checkpoint.restart,
            output_directory: checkpoint.output_directory.clone(),
            policy: MutationPolicy::from_config(config),
            partitioner: PopulationPartitioner::new(
                config.population_size,
                channel.participant_count(),
            ),
            source,
            channel,
            checkpointer,
            progress: Box::new(LogProgressCallback),
            rng,
            phase: Phase::Setup,
            population: Vec::new(),
            working_buffer: Vec::new(),
            generation: 0,
            generations_run: 0,
            global_best: None,
            stopped_at_target: false,
        })
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn rank(&self) -> usize {
        self.channel.rank()
    }

    pub fn population(&self) -> &[S::Genome] {
        &self.population
    }

    /// Setup, every generation, then the final flush.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.expect_phase(Phase::Setup)?;
        log::info!(
            "rank {}/{} starting: {} genomes per rank, {} iterations",
            self.rank(),
            self.channel.participant_count(),
            self.config.population_size,
            self.config.iterations
        );

        self.channel.barrier()?;
        self.setup()?;
        while self.phase == Phase::Evolving {
            self.evolve_generation()?;
        }
        self.finalize()?;

        Ok(self.summary())
    }

    /// Build (or resume) the initial population and share it out fairly.
    pub fn setup(&mut self) -> Result<()> {
        self.expect_phase(Phase::Setup)?;

        if self.restart {
            self.resume()?;
        } else {
            let mut initial = Vec::with_capacity(self.config.population_size);
            for _ in 0..self.config.population_size {
                initial.push(self.source.create(&mut self.rng)?);
            }

            let outcome = self.exchange_and_partition(&initial)?;
            self.adopt(outcome);
        }

        self.working_buffer = self.population.clone();
        self.phase = if self.config.iterations == 0 {
            Phase::Finalizing
        } else {
            Phase::Evolving
        };
        Ok(())
    }

    /// Reproduce, exchange, sort, slice and checkpoint once.
    pub fn evolve_generation(&mut self) -> Result<()> {
        self.expect_phase(Phase::Evolving)?;
        let rank = self.rank();
        let setup = self.config.population_size;
        self.progress.on_generation_start(rank, self.generation);

        if self.population.len() != setup {
            return Err(IdSortError::CollectiveDesync {
                rank,
                reason: format!(
                    "holding {} genomes before reproduction, expected {}",
                    self.population.len(),
                    setup
                ),
            });
        }

        // All counts first so a bad fitness aborts before this rank's exchange
        let counts = self
            .population
            .iter()
            .map(|genome| {
                self.policy
                    .mutation_count(self.source.fitness(genome), &mut self.rng)
            })
            .collect::<Result<Vec<usize>>>()?;

        let children_per_parent = self.config.children_per_parent();
        let mut buffer = Vec::with_capacity(setup * (1 + children_per_parent));
        for (parent, mutations) in self.population.iter().zip(counts) {
            let children = self.source.generate_children(
                parent,
                children_per_parent,
                mutations,
                &mut self.rng,
            )?;
            if children.len() != children_per_parent {
                return Err(IdSortError::Genome(format!(
                    "asked for {} children, got {}",
                    children_per_parent,
                    children.len()
                )));
            }
            buffer.extend(children);
            buffer.push(parent.clone());
        }

        let outcome = self.exchange_and_partition(&buffer)?;
        self.working_buffer = buffer;
        self.generation += 1;
        self.generations_run += 1;
        self.adopt(outcome);
        self.checkpoint_best(CheckpointStage::Generation);

        // Every rank sees the same global best, so they all stop together
        if self.config.stop_at_target
            && self
                .global_best
                .is_some_and(|best| best <= self.config.fitness_target)
        {
            log::info!(
                "rank {} reached fitness target {} after generation {}",
                rank,
                self.config.fitness_target,
                self.generation
            );
            self.stopped_at_target = true;
            self.phase = Phase::Finalizing;
        } else if self.generations_run >= self.config.iterations {
            self.phase = Phase::Finalizing;
        }
        Ok(())
    }

    /// Exchange the last working buffer once more and checkpoint the result.
    pub fn finalize(&mut self) -> Result<()> {
        self.expect_phase(Phase::Finalizing)?;

        let buffer = std::mem::take(&mut self.working_buffer);
        let outcome = self.exchange_and_partition(&buffer)?;
        self.working_buffer = buffer;
        self.adopt(outcome);
        self.checkpoint_best(CheckpointStage::Final);

        self.phase = Phase::Done;
        Ok(())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            rank: self.rank(),
            generations: self.generations_run,
            last_generation: self.generation,
            stopped_at_target: self.stopped_at_target,
            global_best: self.global_best,
            local_best: self.population.first().map(|g| self.source.fitness(g)),
            checkpoints_written: self.checkpointer.as_ref().map_or(0, Checkpointer::written),
            checkpoint_failures: self.checkpointer.as_ref().map_or(0, Checkpointer::failures),
        }
    }

    fn resume(&mut self) -> Result<()> {
        let setup = self.config.population_size;
        let record = Checkpointer::latest(&self.output_directory)?.ok_or_else(|| {
            IdSortError::Configuration(format!(
                "restart requested but {} holds no checkpoint",
                self.output_directory.display()
            ))
        })?;
        log::info!(
            "rank {} resuming from generation {} (fitness {:.6e})",
            self.rank(),
            record.iteration,
            record.fitness
        );

        let genome = self.source.load(&record.path)?;
        let mutations = self
            .policy
            .mutation_count(self.source.fitness(&genome), &mut self.rng)?;

        let mut population = Vec::with_capacity(setup);
        if setup > 1 {
            let children =
                self.source
                    .generate_children(&genome, setup - 1, mutations, &mut self.rng)?;
            if children.len() != setup - 1 {
                return Err(IdSortError::Genome(format!(
                    "asked for {} children, got {}",
                    setup - 1,
                    children.len()
                )));
            }
            population.extend(children);
        }
        population.push(genome);

        let source = &self.source;
        self.population = sort_pool(vec![population], |g| source.fitness(g));
        self.generation = record.iteration;
        self.global_best = self.population.first().map(|g| self.source.fitness(g));
        Ok(())
    }

    fn exchange_and_partition(&mut self, local: &[S::Genome]) -> Result<Redistribution<S::Genome>> {
        let contributions = self.channel.exchange(local)?;
        let rank = self.channel.rank();
        let source = &self.source;
        self.partitioner
            .redistribute(contributions, rank, |g| source.fitness(g))
    }

    fn adopt(&mut self, outcome: Redistribution<S::Genome>) {
        self.population = outcome.slice;
        self.global_best = outcome.global_best;

        let report = GenerationReport {
            rank: self.rank(),
            generation: self.generation,
            global_best: outcome.global_best,
            pool_size: outcome.pool_size,
            local_fitness: self
                .population
                .iter()
                .map(|g| self.source.fitness(g))
                .collect(),
        };
        self.progress.on_generation_complete(&report);
    }

    /// Leader only. Failures are logged by the checkpointer and never abort the run.
    fn checkpoint_best(&mut self, stage: CheckpointStage) {
        let Some(checkpointer) = self.checkpointer.as_mut() else {
            return;
        };
        let Some(best) = self.population.first() else {
            return;
        };
        if let Ok(record) = checkpointer.checkpoint(&self.source, best, self.generation, stage) {
            self.progress.on_checkpoint(&record);
        }
    }

    fn expect_phase(&self, expected: Phase) -> Result<()> {
        if self.phase != expected {
            return Err(IdSortError::CollectiveDesync {
                rank: self.rank(),
                reason: format!("called in {:?} phase, expected {:?}", self.phase, expected),
            });
        }
        Ok(())
    }
}
