//! Magnet ordering for an insertion device.
//!
//! Every magnet has a small strength error. Placing them so that the errors
//! cancel as they accumulate along the device keeps the field straight. A
//! genome is one ordering of the magnets; its fitness is the summed square of
//! the running error, so lower is straighter.

use crate::config::MagnetConfig;
use crate::engines::generation::GenomeSource;
use crate::error::{IdSortError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Added to every score so a fitness is never exactly zero.
pub const FITNESS_FLOOR: f64 = 1e-12;

/// Measured strength errors, indexed by magnet.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetSet {
    errors: Vec<f64>,
}

impl MagnetSet {
    /// Simulated errors; the same seed gives the same set on every rank.
    pub fn generate(config: &MagnetConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.magnet_seed);
        let errors = (0..config.magnet_count)
            .map(|_| rng.gen_range(-config.error_spread..config.error_spread))
            .collect();
        Self { errors }
    }

    pub fn from_errors(errors: Vec<f64>) -> Self {
        Self { errors }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn score(&self, order: &[usize]) -> f64 {
        let mut running = 0.0;
        let mut total = 0.0;
        for &magnet in order {
            running += self.errors[magnet];
            total += running * running;
        }
        total + FITNESS_FLOOR
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnetOrdering {
    pub order: Vec<usize>,
    pub fitness: f64,
}

impl MagnetOrdering {
    fn tag(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.order.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Clone)]
pub struct MagnetSorter {
    magnets: Arc<MagnetSet>,
}

impl MagnetSorter {
    pub fn new(magnets: Arc<MagnetSet>) -> Self {
        Self { magnets }
    }

    pub fn magnets(&self) -> &MagnetSet {
        &self.magnets
    }

    fn scored(&self, order: Vec<usize>) -> MagnetOrdering {
        let fitness = self.magnets.score(&order);
        MagnetOrdering { order, fitness }
    }

    fn check_permutation(&self, order: &[usize]) -> Result<()> {
        let n = self.magnets.len();
        if order.len() != n {
            return Err(IdSortError::Genome(format!(
                "ordering has {} magnets, set has {}",
                order.len(),
                n
            )));
        }
        let mut seen = vec![false; n];
        for &magnet in order {
            if magnet >= n || std::mem::replace(&mut seen[magnet], true) {
                return Err(IdSortError::Genome(format!(
                    "magnet {} is out of range or repeated",
                    magnet
                )));
            }
        }
        Ok(())
    }
}

impl GenomeSource for MagnetSorter {
    type Genome = MagnetOrdering;

    fn create<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<MagnetOrdering> {
        if self.magnets.is_empty() {
            return Err(IdSortError::Genome("no magnets to order".to_string()));
        }
        let mut order: Vec<usize> = (0..self.magnets.len()).collect();
        order.shuffle(rng);
        Ok(self.scored(order))
    }

    /// Each child is the parent with `mutations` random swaps, at least one and
    /// at most four per magnet.
    fn generate_children<R: Rng + ?Sized>(
        &mut self,
        parent: &MagnetOrdering,
        count: usize,
        mutations: usize,
        rng: &mut R,
    ) -> Result<Vec<MagnetOrdering>> {
        let n = parent.order.len();
        if n < 2 {
            return Err(IdSortError::Genome(format!("cannot mutate {} magnets", n)));
        }
        let swaps = mutations.clamp(1, 4 * n);

        Ok((0..count)
            .map(|_| {
                let mut order = parent.order.clone();
                for _ in 0..swaps {
                    let a = rng.gen_range(0..n);
                    let b = rng.gen_range(0..n);
                    order.swap(a, b);
                }
                self.scored(order)
            })
            .collect())
    }

    fn fitness(&self, genome: &MagnetOrdering) -> f64 {
        genome.fitness
    }

    fn save(&self, genome: &MagnetOrdering, directory: &Path) -> Result<PathBuf> {
        let path = directory.join(format!("{:.8e}_{:016x}.genome.json", genome.fitness, genome.tag()));
        let body = serde_json::to_string_pretty(genome)?;
        std::fs::write(&path, body)
            .map_err(|e| IdSortError::Persistence(format!("writing {}: {}", path.display(), e)))?;
        Ok(path)
    }

    fn load(&self, path: &Path) -> Result<MagnetOrdering> {
        let body = std::fs::read_to_string(path)
            .map_err(|e| IdSortError::Persistence(format!("reading {}: {}", path.display(), e)))?;
        let stored: MagnetOrdering = serde_json::from_str(&body)?;
        self.check_permutation(&stored.order)?;
        // Score against our magnet set rather than trusting the file
        Ok(self.scored(stored.order))
    }
}
