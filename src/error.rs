use thiserror::Error;

/// Classified failure of a single data source.
///
/// `Transient` covers network faults, timeouts, rate limiting and
/// server-side errors; the retry policy retries these up to its attempt
/// budget before surfacing them. `Fatal` covers auth failures and malformed
/// requests (HTTP 4xx other than 429) and is never retried. Either class is
/// caught at the orchestrator boundary and recorded in the run report; it
/// does not abort the run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transient source failure: {0}")]
    Transient(String),
    #[error("fatal source failure: {0}")]
    Fatal(String),
}

impl SourceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Fatal(_))
    }
}

/// Storage-layer failure. Unlike source errors these propagate to the top
/// level and halt the run, since data integrity is at risk.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("schema conflict: {0}")]
    Schema(String),
    #[error("storage backend error: {0}")]
    Backend(#[from] fjall::Error),
    #[error("record encoding error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
