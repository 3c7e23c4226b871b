use super::traits::{invalid, ConfigSection};
use crate::error::IdSortError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub output_directory: PathBuf,
    /// Resume from the latest checkpoint instead of building a fresh population.
    pub restart: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("run"),
            restart: false,
        }
    }
}

impl ConfigSection for CheckpointConfig {
    fn section_name() -> &'static str {
        "checkpoint"
    }

    fn validate(&self) -> Result<(), IdSortError> {
        if self.output_directory.as_os_str().is_empty() {
            return Err(invalid::<Self>("output_directory must not be empty"));
        }
        Ok(())
    }
}
