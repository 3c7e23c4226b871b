//! Distributed generational optimiser for sorting insertion device magnets.
//!
//! A population of genomes is split across a fixed group of ranks. Each
//! generation every rank breeds its share, all ranks exchange their whole
//! populations, and each rank sorts the union and keeps its own contiguous
//! slice of it. Rank 0 always ends up with the fittest slice and checkpoints
//! the best genome.
//!
//! - `engines::collective`: the all-to-all exchange and its transports
//! - `engines::generation`: mutation policy, partitioning, checkpoints and the
//!   per-rank coordinator
//! - `genomes`: the magnet ordering genome used by the binary
//! - `runner`: launching ranks as threads or as TCP peers

pub mod config;
pub mod engines;
pub mod error;
pub mod genomes;
pub mod runner;

pub use error::{IdSortError, Result};
