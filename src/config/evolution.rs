use super::traits::{invalid, ConfigSection};
use crate::error::IdSortError;
use serde::{Deserialize, Serialize};

/// Parameters of the generational loop and the mutation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Genomes held by each rank between generations ("setup").
    pub population_size: usize,
    pub iterations: usize,
    pub fitness_target: f64,
    /// End the loop early once the global best reaches `fitness_target`.
    pub stop_at_target: bool,
    /// Accepted for compatibility, genome ageing is left to the genome source.
    pub max_age: usize,
    pub param_c: f64,
    pub param_e_star: f64,
    pub param_scale: f64,
    /// Base seed for the per-rank generators. Rank `r` uses `seed + r`.
    pub seed: Option<u64>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 5,
            iterations: 1,
            fitness_target: 0.0,
            stop_at_target: false,
            max_age: 10,
            param_c: 10.0,
            param_e_star: 0.0,
            param_scale: 10.0,
            seed: None,
        }
    }
}

impl EvolutionConfig {
    /// Number of children produced per parent each generation.
    pub fn children_per_parent(&self) -> usize {
        self.population_size
    }
}

impl ConfigSection for EvolutionConfig {
    fn section_name() -> &'static str {
        "evolution"
    }

    fn validate(&self) -> Result<(), IdSortError> {
        if self.population_size == 0 {
            return Err(invalid::<Self>("population_size must be at least 1"));
        }
        if !self.fitness_target.is_finite() {
            return Err(invalid::<Self>("fitness_target must be finite"));
        }
        for (name, value) in [
            ("param_c", self.param_c),
            ("param_e_star", self.param_e_star),
            ("param_scale", self.param_scale),
        ] {
            if !value.is_finite() {
                return Err(invalid::<Self>(format!("{} must be finite, got {}", name, value)));
            }
        }
        Ok(())
    }
}
