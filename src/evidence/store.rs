use std::env;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use thiserror::Error;

use crate::evidence::record::{EvidenceRecord, EvidenceRunMetadata};
use crate::paths::RalphPaths;

/// Environment variable for evidence retention period (days).
pub const RETENTION_ENV_VAR: &str = "RALPH_EVIDENCE_RETENTION_DAYS";

/// Default retention period in days.
pub const DEFAULT_RETENTION_DAYS: u64 = 30;

const EVIDENCE_DIR_NAME: &str = "evidence";
const RUNS_DIR_NAME: &str = "runs";
const METADATA_FILE_NAME: &str = "run.json";
const EVENTS_FILE_NAME: &str = "events.jsonl";

/// Errors that can occur during evidence storage operations.
#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid run ID")]
    InvalidRunId,
}

pub type EvidenceResult<T> = Result<T, EvidenceError>;

/// Retention period from `RALPH_EVIDENCE_RETENTION_DAYS`, 0 disables pruning.
pub fn retention_days_from_env() -> u64 {
    env::var(RETENTION_ENV_VAR)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETENTION_DAYS)
}

/// Evidence store under `.ralph/evidence/`.
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    root_dir: PathBuf,
    retention_days: u64,
}

impl EvidenceStore {
    pub fn new(paths: &RalphPaths, retention_days: u64) -> EvidenceResult<Self> {
        let root_dir = paths.ralph_dir().join(EVIDENCE_DIR_NAME);
        fs::create_dir_all(root_dir.join(RUNS_DIR_NAME))?;
        Ok(Self {
            root_dir,
            retention_days,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root_dir.join(RUNS_DIR_NAME).join(run_id)
    }

    /// Append one record to the run's event log and refresh `run.json`.
    pub fn append_record(&self, record: &EvidenceRecord) -> EvidenceResult<()> {
        if record.run_id.trim().is_empty() {
            return Err(EvidenceError::InvalidRunId);
        }

        let run_dir = self.run_dir(&record.run_id);
        fs::create_dir_all(&run_dir)?;

        let mut events = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(run_dir.join(EVENTS_FILE_NAME))?;
        writeln!(events, "{}", serde_json::to_string(record)?)?;
        events.sync_all()?;

        let mut metadata = self
            .metadata(&record.run_id)?
            .unwrap_or_else(|| EvidenceRunMetadata::new(&record.run_id, record.recorded_at));
        metadata.record(record);
        self.write_metadata(&run_dir, &metadata)
    }

    /// All records of a run, oldest first.
    pub fn read_records(&self, run_id: &str) -> EvidenceResult<Vec<EvidenceRecord>> {
        let path = self.run_dir(run_id).join(EVENTS_FILE_NAME);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    /// The run's `run.json`, if it exists.
    pub fn metadata(&self, run_id: &str) -> EvidenceResult<Option<EvidenceRunMetadata>> {
        read_metadata(&self.run_dir(run_id).join(METADATA_FILE_NAME))
    }

    /// Delete runs created before the retention cutoff. Returns how many
    /// run directories were removed.
    pub fn enforce_retention(&self) -> EvidenceResult<usize> {
        if self.retention_days == 0 {
            return Ok(0);
        }

        let runs_dir = self.root_dir.join(RUNS_DIR_NAME);
        if !runs_dir.exists() {
            return Ok(0);
        }

        let cutoff = Utc::now() - Duration::days(self.retention_days as i64);
        let mut deleted = 0;
        for entry in fs::read_dir(&runs_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let run_dir = entry.path();
            let Some(metadata) = read_metadata(&run_dir.join(METADATA_FILE_NAME))? else {
                continue;
            };
            if metadata.created_at < cutoff {
                fs::remove_dir_all(&run_dir)?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn write_metadata(&self, run_dir: &Path, metadata: &EvidenceRunMetadata) -> EvidenceResult<()> {
        let json = serde_json::to_string_pretty(metadata)?;
        let temp_path = run_dir.join(format!("{}.tmp", METADATA_FILE_NAME));

        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, run_dir.join(METADATA_FILE_NAME))?;
        Ok(())
    }
}

fn read_metadata(path: &Path) -> EvidenceResult<Option<EvidenceRunMetadata>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}
