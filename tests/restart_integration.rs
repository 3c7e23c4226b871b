use idsort::config::{CheckpointConfig, ClusterConfig, EvolutionConfig, MagnetConfig, RunConfig};
use idsort::engines::generation::{CheckpointStage, Checkpointer};
use idsort::genomes::{MagnetSet, MagnetSorter};
use idsort::runner::LocalRunner;
use idsort::IdSortError;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::tempdir;


fn run_config(dir: PathBuf, iterations: usize, restart: bool) -> RunConfig {
    RunConfig {
        evolution: EvolutionConfig {
            population_size: 3,
            iterations,
            seed: Some(7),
            ..EvolutionConfig::default()
        },
        cluster: ClusterConfig {
            participant_count: 2,
            ..ClusterConfig::default()
        },
        checkpoint: CheckpointConfig {
            output_directory: dir,
            restart,
        },
        magnets: MagnetConfig {
            magnet_count: 20,
            ..MagnetConfig::default()
        },
    }
}

fn run(config: RunConfig) -> idsort::Result<Vec<idsort::engines::generation::RunSummary>> {
    let magnets = Arc::new(MagnetSet::generate(&config.magnets));
    LocalRunner::new(config).run(|_| Ok(MagnetSorter::new(Arc::clone(&magnets))))
}

#[test]
fn test_restart_continues_numbering_from_latest_checkpoint() {
    let dir = tempdir().unwrap();

    let first = run(run_config(dir.path().to_path_buf(), 2, false)).unwrap();
    assert_eq!(first[0].last_generation, 2);
    let best_before = Checkpointer::latest(dir.path()).unwrap().unwrap().fitness;

    let second = run(run_config(dir.path().to_path_buf(), 3, true)).unwrap();
    for summary in &second {
        assert_eq!(summary.generations, 3);
        assert_eq!(summary.last_generation, 5);
    }
    // The resumed genome stays in the pool
    assert!(second[0].global_best.unwrap() <= best_before * (1.0 + 1e-12));

    let records = Checkpointer::read_manifest(dir.path()).unwrap();
    let iterations: Vec<usize> = records.iter().map(|r| r.iteration).collect();
    assert_eq!(iterations, vec![1, 2, 2, 3, 4, 5, 5]);
    assert_eq!(
        records.iter().filter(|r| r.stage == CheckpointStage::Final).count(),
        2
    );
}

#[test]
fn test_restart_with_zero_iterations_only_flushes() {
    let dir = tempdir().unwrap();
    run(run_config(dir.path().to_path_buf(), 1, false)).unwrap();

    let summaries = run(run_config(dir.path().to_path_buf(), 0, true)).unwrap();
    assert!(summaries.iter().all(|s| s.generations == 0 && s.last_generation == 1));

    let latest = Checkpointer::latest(dir.path()).unwrap().unwrap();
    assert_eq!(latest.iteration, 1);
    assert_eq!(latest.stage, CheckpointStage::Final);
    assert_eq!(Checkpointer::lookup(dir.path(), 1).unwrap().unwrap(), latest);
}

#[test]
fn test_restart_without_checkpoint_fails() {
    let dir = tempdir().unwrap();
    let result = run(run_config(dir.path().to_path_buf(), 2, true));
    assert!(matches!(result, Err(IdSortError::Configuration(_))));
}
