use super::{
    checkpoint::CheckpointConfig,
    cluster::ClusterConfig,
    evolution::EvolutionConfig,
    magnets::MagnetConfig,
    traits::ConfigSection,
};
use crate::error::IdSortError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Environment variables with this prefix override file values,
/// e.g. `IDSORT_EVOLUTION__ITERATIONS=50`.
pub const ENV_PREFIX: &str = "IDSORT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub evolution: EvolutionConfig,
    pub cluster: ClusterConfig,
    pub checkpoint: CheckpointConfig,
    pub magnets: MagnetConfig,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), IdSortError> {
        self.evolution.validate()?;
        self.cluster.validate()?;
        self.checkpoint.validate()?;
        self.magnets.validate()?;
        Ok(())
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<RunConfig>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(RunConfig::default())),
        }
    }

    /// Layer the file (TOML or JSON, by extension) and `IDSORT_*` environment
    /// variables over the defaults, then validate.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), IdSortError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IdSortError::Configuration(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: RunConfig = settings
            .try_deserialize()
            .map_err(|e| IdSortError::Configuration(format!("Failed to parse config: {}", e)))?;

        self.replace(config)
    }

    /// Defaults plus environment overrides, for runs without a config file.
    pub fn load_from_env(&self) -> Result<(), IdSortError> {
        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: RunConfig = settings
            .try_deserialize()
            .map_err(|e| IdSortError::Configuration(format!("Failed to parse config: {}", e)))?;

        self.replace(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), IdSortError> {
        let config = self.get();
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| IdSortError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| IdSortError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> RunConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn update<F>(&self, f: F) -> Result<(), IdSortError>
    where
        F: FnOnce(&mut RunConfig),
    {
        let mut candidate = self.get();
        f(&mut candidate);
        self.replace(candidate)
    }

    fn replace(&self, config: RunConfig) -> Result<(), IdSortError> {
        config.validate()?;
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.evolution.population_size, 5);
        assert_eq!(config.evolution.max_age, 10);
        assert_eq!(config.evolution.param_c, 10.0);
        assert_eq!(config.evolution.param_e_star, 0.0);
        assert_eq!(config.evolution.param_scale, 10.0);
        assert_eq!(config.cluster.participant_count, 10);
        assert!(!config.checkpoint.restart);
    }

    #[test]
    fn test_rejects_empty_population() {
        let manager = ConfigManager::new();
        let result = manager.update(|c| c.evolution.population_size = 0);
        assert!(matches!(result, Err(IdSortError::Configuration(_))));
        // Rejected update leaves the previous config in place
        assert_eq!(manager.get().evolution.population_size, 5);
    }

    #[test]
    fn test_rejects_mismatched_peer_list() {
        let mut config = RunConfig::default();
        config.cluster.participant_count = 3;
        config.cluster.transport = TransportConfig::Tcp {
            rank: 0,
            peers: vec!["127.0.0.1:7000".to_string(), "127.0.0.1:7001".to_string()],
            connect_timeout_secs: 5,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_finite_mutation_params() {
        let mut config = RunConfig::default();
        config.evolution.param_scale = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_toml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[evolution]\npopulation_size = 3\niterations = 7\n\n[cluster]\nparticipant_count = 2\n",
        )
        .unwrap();

        let manager = ConfigManager::new();
        manager.load_from_file(&path).unwrap();
        let config = manager.get();

        assert_eq!(config.evolution.population_size, 3);
        assert_eq!(config.evolution.iterations, 7);
        assert_eq!(config.evolution.param_c, 10.0);
        assert_eq!(config.cluster.participant_count, 2);
        assert_eq!(config.cluster.transport, TransportConfig::Local);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let manager = ConfigManager::new();
        manager
            .update(|c| {
                c.evolution.iterations = 12;
                c.cluster.participant_count = 4;
            })
            .unwrap();
        manager.save_to_file(&path).unwrap();

        let reloaded = ConfigManager::new();
        reloaded.load_from_file(&path).unwrap();
        assert_eq!(reloaded.get().evolution.iterations, 12);
        assert_eq!(reloaded.get().cluster.participant_count, 4);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new();
        let result = manager.load_from_file(dir.path().join("does-not-exist.toml"));
        assert!(matches!(result, Err(IdSortError::Configuration(_))));
    }
}
