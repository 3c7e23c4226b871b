use super::source::GenomeSource;
use crate::error::{IdSortError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One line per checkpoint, appended in the order they were written.
pub const MANIFEST_FILE: &str = "checkpoints.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStage {
    Generation,
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Generations completed when the genome was saved.
    pub iteration: usize,
    pub stage: CheckpointStage,
    pub fitness: f64,
    pub path: PathBuf,
    pub saved_at: DateTime<Utc>,
}

/// Leader-side persistence of the best genome.
pub struct Checkpointer {
    directory: PathBuf,
    written: usize,
    failures: usize,
}

impl Checkpointer {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
            written: 0,
            failures: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Save `genome` and record it in the manifest.
    ///
    /// A failure is logged and counted and then returned; the caller decides
    /// whether to carry on.
    pub fn checkpoint<S: GenomeSource>(
        &mut self,
        source: &S,
        genome: &S::Genome,
        iteration: usize,
        stage: CheckpointStage,
    ) -> Result<CheckpointRecord> {
        match self.try_checkpoint(source, genome, iteration, stage) {
            Ok(record) => {
                self.written += 1;
                log::info!(
                    "checkpoint {:?} {} saved: fitness {:.6e} -> {}",
                    stage,
                    iteration,
                    record.fitness,
                    record.path.display()
                );
                Ok(record)
            }
            Err(e) => {
                self.failures += 1;
                log::error!("checkpoint {:?} {} failed: {}", stage, iteration, e);
                Err(e)
            }
        }
    }

    fn try_checkpoint<S: GenomeSource>(
        &self,
        source: &S,
        genome: &S::Genome,
        iteration: usize,
        stage: CheckpointStage,
    ) -> Result<CheckpointRecord> {
        fs::create_dir_all(&self.directory).map_err(|e| {
            IdSortError::Persistence(format!(
                "cannot create {}: {}",
                self.directory.display(),
                e
            ))
        })?;

        let path = source
            .save(genome, &self.directory)
            .map_err(|e| IdSortError::Persistence(format!("saving genome failed: {}", e)))?;

        let record = CheckpointRecord {
            iteration,
            stage,
            fitness: source.fitness(genome),
            path,
            saved_at: Utc::now(),
        };
        self.append(&record).map_err(|e| {
            IdSortError::Persistence(format!(
                "genome written to {} but not recorded: {}",
                record.path.display(),
                e
            ))
        })?;
        Ok(record)
    }

    fn append(&self, record: &CheckpointRecord) -> Result<()> {
        let manifest = self.directory.join(MANIFEST_FILE);
        let line = serde_json::to_string(record)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&manifest)
            .and_then(|mut file| {
                writeln!(file, "{}", line)?;
                Ok(file)
            })
            .map_err(|e| {
                IdSortError::Persistence(format!("cannot append to {}: {}", manifest.display(), e))
            })?;

        file.flush()?;
        file.sync_all()
            .map_err(|e| IdSortError::Persistence(format!("sync of {} failed: {}", manifest.display(), e)))
    }

    /// All records under `directory`, oldest first. Empty if none were written.
    pub fn read_manifest(directory: &Path) -> Result<Vec<CheckpointRecord>> {
        let manifest = directory.join(MANIFEST_FILE);
        if !manifest.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&manifest)?);
        let mut records = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                IdSortError::Persistence(format!(
                    "{} line {} is corrupt: {}",
                    manifest.display(),
                    number + 1,
                    e
                ))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// The checkpoint that stands for `iteration`; the latest one if several.
    pub fn lookup(directory: &Path, iteration: usize) -> Result<Option<CheckpointRecord>> {
        Ok(Self::read_manifest(directory)?
            .into_iter()
            .rev()
            .find(|r| r.iteration == iteration))
    }

    pub fn latest(directory: &Path) -> Result<Option<CheckpointRecord>> {
        Ok(Self::read_manifest(directory)?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::testing::{ScalarGenome, ScalarSource};
    use tempfile::tempdir;

    #[test]
    fn test_records_are_read_back_in_order() {
        let dir = tempdir().unwrap();
        let mut checkpointer = Checkpointer::new(dir.path());
        let source = ScalarSource::default();

        for (iteration, value, stage) in [
            (1, 4.0, CheckpointStage::Generation),
            (2, 3.0, CheckpointStage::Generation),
            (2, 2.5, CheckpointStage::Final),
        ] {
            checkpointer
                .checkpoint(&source, &ScalarGenome { value }, iteration, stage)
                .unwrap();
        }

        assert_eq!(checkpointer.written(), 3);
        assert_eq!(Checkpointer::read_manifest(dir.path()).unwrap().len(), 3);
        let second = Checkpointer::lookup(dir.path(), 2).unwrap().unwrap();
        assert_eq!(second.stage, CheckpointStage::Final);
        assert_eq!(second.fitness, 2.5);
        assert_eq!(Checkpointer::latest(dir.path()).unwrap().unwrap(), second);
        assert!(Checkpointer::lookup(dir.path(), 9).unwrap().is_none());
    }

    #[test]
    fn test_unrecorded_genome_path_is_reported() {
        let dir = tempdir().unwrap();
        // A directory where the manifest should be makes every append fail
        fs::create_dir(dir.path().join(MANIFEST_FILE)).unwrap();

        let mut checkpointer = Checkpointer::new(dir.path());
        let result = checkpointer.checkpoint(
            &ScalarSource::default(),
            &ScalarGenome { value: 7.0 },
            1,
            CheckpointStage::Generation,
        );

        let message = match result {
            Err(IdSortError::Persistence(message)) => message,
            other => panic!("expected a persistence error, got {:?}", other),
        };
        let saved = dir.path().join(format!("{:.12e}.scalar.json", 7.0));
        assert!(saved.exists());
        assert!(message.contains(&saved.display().to_string()));
        assert_eq!(checkpointer.failures(), 1);
        assert_eq!(checkpointer.written(), 0);
    }
}
