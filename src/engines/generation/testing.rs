//! Minimal genome source for exercising the loop without a real domain model.

use super::source::GenomeSource;
use crate::error::{IdSortError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarGenome {
    pub value: f64,
}

/// Genomes are bare positive numbers; each mutation shaves a little off.
#[derive(Debug, Clone, Default)]
pub struct ScalarSource {
    pub zero_fitness: bool,
    pub fail_saves: bool,
}

impl GenomeSource for ScalarSource {
    type Genome = ScalarGenome;

    fn create<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<ScalarGenome> {
        if self.zero_fitness {
            return Ok(ScalarGenome { value: 0.0 });
        }
        Ok(ScalarGenome {
            value: rng.gen_range(10.0..100.0),
        })
    }

    fn generate_children<R: Rng + ?Sized>(
        &mut self,
        parent: &ScalarGenome,
        count: usize,
        mutations: usize,
        rng: &mut R,
    ) -> Result<Vec<ScalarGenome>> {
        Ok((0..count)
            .map(|_| {
                let step = rng.gen_range(0.9..1.05_f64).powi(mutations.min(8) as i32);
                ScalarGenome {
                    value: (parent.value * step).max(1e-6),
                }
            })
            .collect())
    }

    fn fitness(&self, genome: &ScalarGenome) -> f64 {
        genome.value
    }

    fn save(&self, genome: &ScalarGenome, directory: &Path) -> Result<PathBuf> {
        if self.fail_saves {
            return Err(IdSortError::Persistence("disk full".to_string()));
        }
        let path = directory.join(format!("{:.12e}.scalar.json", genome.value));
        std::fs::write(&path, serde_json::to_vec(genome)?)?;
        Ok(path)
    }

    fn load(&self, path: &Path) -> Result<ScalarGenome> {
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }
}
