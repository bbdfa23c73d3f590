use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::fmt;

use crate::error::SourceError;
use crate::model::RawRecord;

/// Identifier tag for each data source. The orchestrator holds a fixed-order
/// list of connectors keyed by this tag; there is no per-source subclassing
/// beyond the single `Connector` trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Prices,
    FearGreed,
    EtfFlows,
    MarketMetrics,
    Derivatives,
    Social,
}

impl Source {
    pub fn id(&self) -> &'static str {
        match self {
            Source::Prices => "prices",
            Source::FearGreed => "fear_greed",
            Source::EtfFlows => "etf_flows",
            Source::MarketMetrics => "market_metrics",
            Source::Derivatives => "derivatives",
            Source::Social => "social",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Inclusive UTC time window `[start, end]` requested from a connector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn trailing_days(end: DateTime<Utc>, days: u32) -> Self {
        FetchWindow {
            start: end - Duration::days(days as i64),
            end,
        }
    }

    /// Whole days covered, rounded up. Used by connectors whose remote APIs
    /// take a day count rather than explicit bounds.
    pub fn days(&self) -> u32 {
        let seconds = (self.end - self.start).num_seconds().max(0);
        (seconds as u64).div_ceil(86_400) as u32
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Calendar dates covered by the window, oldest first.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut date = self.start.date_naive();
        let last = self.end.date_naive();
        while date <= last {
            dates.push(date);
            date = date.succ_opt().expect("date overflow");
        }
        dates
    }
}

/// One implementation per data source. A connector fetches its window,
/// normalizes units and timestamps to UTC, tags every record with its
/// natural-key fields and returns the batch. On failure it surfaces a
/// classified [`SourceError`] and returns nothing; absence means "unknown"
/// downstream, never "zero", so no placeholder data is ever substituted.
#[async_trait]
pub trait Connector: Send + Sync {
    fn source(&self) -> Source;

    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<RawRecord>, SourceError>;
}
