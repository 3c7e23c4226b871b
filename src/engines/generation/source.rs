use crate::error::Result;
use rand::Rng;
use std::path::{Path, PathBuf};

/// Domain model behind the generational loop.
///
/// The loop never looks inside a genome: it only needs to create one, breed
/// from one, read its fitness (lower is better) and persist it.
pub trait GenomeSource {
    type Genome: Clone + Send;

    /// A fresh randomised genome.
    fn create<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Self::Genome>;

    /// Exactly `count` offspring of `parent`, each carrying `mutations` mutations.
    fn generate_children<R: Rng + ?Sized>(
        &mut self,
        parent: &Self::Genome,
        count: usize,
        mutations: usize,
        rng: &mut R,
    ) -> Result<Vec<Self::Genome>>;

    fn fitness(&self, genome: &Self::Genome) -> f64;

    /// Persist `genome` under `directory` and return the file written.
    fn save(&self, genome: &Self::Genome, directory: &Path) -> Result<PathBuf>;

    /// Read back a genome written by [`GenomeSource::save`].
    fn load(&self, path: &Path) -> Result<Self::Genome>;
}
