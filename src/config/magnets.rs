use super::traits::{invalid, ConfigSection};
use crate::error::IdSortError;
use serde::{Deserialize, Serialize};

/// Settings for the built-in magnet ordering genome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnetConfig {
    pub magnet_count: usize,
    /// Shared by every rank so all of them score against the same magnet set.
    pub magnet_seed: u64,
    /// Spread of the simulated strength errors.
    pub error_spread: f64,
}

impl Default for MagnetConfig {
    fn default() -> Self {
        Self {
            magnet_count: 64,
            magnet_seed: 1,
            error_spread: 0.05,
        }
    }
}

impl ConfigSection for MagnetConfig {
    fn section_name() -> &'static str {
        "magnets"
    }

    fn validate(&self) -> Result<(), IdSortError> {
        if self.magnet_count < 2 {
            return Err(invalid::<Self>("magnet_count must be at least 2"));
        }
        if !(self.error_spread.is_finite() && self.error_spread > 0.0) {
            return Err(invalid::<Self>("error_spread must be a positive number"));
        }
        Ok(())
    }
}
