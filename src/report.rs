use std::collections::BTreeMap;
use std::time::Duration;

use crate::connector::Source;
use crate::pipeline::RunMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Ok,
    Failed,
    Skipped,
}

/// Per-connector result collected by the orchestrator. Ephemeral: lives in
/// logs and CLI output only, never persisted.
#[derive(Debug, Clone)]
pub struct ConnectorOutcome {
    pub source: Source,
    pub status: OutcomeStatus,
    pub records: u64,
    pub duration: Duration,
    pub error: Option<String>,
}

impl ConnectorOutcome {
    pub fn ok(source: Source, records: u64, duration: Duration) -> Self {
        ConnectorOutcome {
            source,
            status: OutcomeStatus::Ok,
            records,
            duration,
            error: None,
        }
    }

    pub fn failed(source: Source, error: String, duration: Duration) -> Self {
        ConnectorOutcome {
            source,
            status: OutcomeStatus::Failed,
            records: 0,
            duration,
            error: Some(error),
        }
    }

    pub fn skipped(source: Source) -> Self {
        ConnectorOutcome {
            source,
            status: OutcomeStatus::Skipped,
            records: 0,
            duration: Duration::ZERO,
            error: None,
        }
    }
}

/// Answer to the `status` command: where the data lives and how much of it
/// there is.
#[derive(Debug)]
pub struct StatusReport {
    pub database: std::path::PathBuf,
    pub tracked_assets: Vec<String>,
    pub record_counts: BTreeMap<&'static str, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// At least one source failed; everything obtained from the others was
    /// still persisted.
    PartialSuccess { failed: Vec<Source> },
}

#[derive(Debug)]
pub struct RunReport {
    pub mode: RunMode,
    pub outcomes: Vec<ConnectorOutcome>,
    pub snapshots: u64,
    pub record_counts: BTreeMap<&'static str, u64>,
    pub duration: Duration,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        let failed: Vec<Source> = self
            .outcomes
            .iter()
            .filter(|outcome| outcome.status == OutcomeStatus::Failed)
            .map(|outcome| outcome.source)
            .collect();
        if failed.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::PartialSuccess { failed }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == RunStatus::Success
    }

    pub fn total_records(&self) -> u64 {
        self.outcomes.iter().map(|outcome| outcome.records).sum()
    }
}
