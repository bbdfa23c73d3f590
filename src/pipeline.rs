use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::aggregate::Aggregator;
use crate::config::AppConfig;
use crate::connector::{Connector, FetchWindow, Source};
use crate::connectors::{
    binance_futures::BinanceFuturesConnector, coingecko::CoinGeckoConnector,
    etf_flows::EtfFlowsConnector, fear_greed::FearGreedConnector,
    market_metrics::MarketMetricsConnector, reddit::RedditConnector,
};
use crate::model::{SnapshotRow, SocialSentimentRow};
use crate::report::{ConnectorOutcome, RunReport};
use crate::retry::RetryPolicy;
use crate::sentiment::LexiconScorer;
use crate::store::Store;

/// Platforms whose raw posts feed the daily social aggregate.
const SOCIAL_PLATFORMS: &[&str] = &["reddit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One-time ingestion of each source's full historical horizon.
    Backfill,
    /// Recurring ingestion of a short trailing window; overlaps with
    /// previously ingested days are safe because upserts are idempotent.
    DailySync,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Backfill => f.write_str("backfill"),
            RunMode::DailySync => f.write_str("daily_sync"),
        }
    }
}

impl RunMode {
    /// Window requested from a connector in this mode. Backfill horizons are
    /// source-specific; daily-sync uses one short lookback for every source.
    pub fn window(&self, source: Source, config: &AppConfig, now: DateTime<Utc>) -> FetchWindow {
        let days = match self {
            RunMode::Backfill => match source {
                Source::Prices => config.backfill.prices_days,
                Source::FearGreed => config.backfill.fear_greed_days,
                Source::EtfFlows => config.backfill.etf_flows_days,
                // Current-value endpoints; no history to backfill
                Source::MarketMetrics | Source::Derivatives => 1,
                Source::Social => config.backfill.social_days,
            },
            RunMode::DailySync => config.daily_lookback_days,
        };
        FetchWindow::trailing_days(now, days)
    }
}

/// Sequences a run: connectors in a fixed order, each behind the shared
/// retry policy, followed by one aggregation pass over the affected dates.
/// Intentionally a single sequential worker, which keeps rate limiting and
/// the single-writer store simple.
pub struct Pipeline {
    config: AppConfig,
    store: Store,
    /// Fixed execution order: price data lands before the sentiment and flow
    /// sources so the aggregator always has its raw inputs. Disabled sources
    /// keep their slot and surface as `Skipped` in the report.
    slots: Vec<(Source, Option<Box<dyn Connector>>)>,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing ingestion pipeline");
        let store = Store::open(config.database_path()?).context("Failed to open store")?;
        let policy = RetryPolicy::from_config(&config.retry);

        let mut slots: Vec<(Source, Option<Box<dyn Connector>>)> = Vec::new();

        let prices: Option<Box<dyn Connector>> = if config.sources.coingecko.enabled {
            Some(Box::new(CoinGeckoConnector::new(
                &config.sources.coingecko,
                &config.tracked_assets,
                policy.clone(),
            )?))
        } else {
            None
        };
        slots.push((Source::Prices, prices));

        let fear_greed: Option<Box<dyn Connector>> = if config.sources.fear_greed.enabled {
            Some(Box::new(FearGreedConnector::new(
                &config.sources.fear_greed,
                policy.clone(),
            )?))
        } else {
            None
        };
        slots.push((Source::FearGreed, fear_greed));

        let etf_flows: Option<Box<dyn Connector>> = if config.sources.etf_flows.enabled {
            Some(Box::new(EtfFlowsConnector::new(
                &config.sources.etf_flows,
                policy.clone(),
            )?))
        } else {
            None
        };
        slots.push((Source::EtfFlows, etf_flows));

        let market_metrics: Option<Box<dyn Connector>> = if config.sources.market_metrics.enabled {
            Some(Box::new(MarketMetricsConnector::new(
                &config.sources.market_metrics,
                &config.tracked_assets,
                policy.clone(),
            )?))
        } else {
            None
        };
        slots.push((Source::MarketMetrics, market_metrics));

        let derivatives: Option<Box<dyn Connector>> = if config.sources.derivatives.enabled {
            Some(Box::new(BinanceFuturesConnector::new(
                &config.sources.derivatives,
                &config.tracked_assets,
                policy.clone(),
            )?))
        } else {
            None
        };
        slots.push((Source::Derivatives, derivatives));

        let social: Option<Box<dyn Connector>> = if config.sources.social.enabled {
            Some(Box::new(RedditConnector::new(
                &config.sources.social,
                policy.clone(),
                Arc::new(LexiconScorer),
            )?))
        } else {
            None
        };
        slots.push((Source::Social, social));

        info!("Pipeline initialization complete");
        Ok(Pipeline {
            config,
            store,
            slots,
        })
    }

    /// Runs the full ingest-then-aggregate sequence. Source failures are
    /// recorded and skipped over, so one source never aborts the run.
    /// Storage errors propagate and halt everything.
    pub async fn run(&self, mode: RunMode) -> Result<RunReport> {
        let started = Instant::now();
        let now = Utc::now();
        info!("Starting {mode} run");

        let mut outcomes = Vec::new();
        let mut affected: BTreeSet<NaiveDate> = BTreeSet::new();

        for (source, connector) in &self.slots {
            let Some(connector) = connector else {
                info!("Source {source} disabled, skipping");
                outcomes.push(ConnectorOutcome::skipped(*source));
                continue;
            };

            let window = mode.window(*source, &self.config, now);
            info!(
                "Ingesting {source} for {} day(s) ending {}",
                window.days(),
                window.end
            );
            let fetch_started = Instant::now();

            match connector.fetch(&window).await {
                Ok(records) => {
                    affected.extend(records.iter().map(|record| record.as_of_date()));
                    let count = self
                        .store
                        .upsert_raw(&records)
                        .context("Failed to persist connector batch")?;
                    info!("Ingested {count} records from {source}");
                    outcomes.push(ConnectorOutcome::ok(*source, count, fetch_started.elapsed()));
                }
                Err(err) => {
                    error!("Ingestion failed for {source}: {err}");
                    outcomes.push(ConnectorOutcome::failed(
                        *source,
                        err.to_string(),
                        fetch_started.elapsed(),
                    ));
                }
            }
        }

        // Nothing fetched (all sources failed or empty): repair the recent
        // window anyway so aggregates track raw-table state.
        if affected.is_empty() {
            warn!("No records ingested; re-aggregating the daily lookback window");
            affected.extend(
                FetchWindow::trailing_days(now, self.config.daily_lookback_days).dates(),
            );
        }

        let snapshots = self.aggregate(&affected)?;

        let report = RunReport {
            mode,
            outcomes,
            snapshots,
            record_counts: self.store.record_counts()?,
            duration: started.elapsed(),
        };
        info!(
            "Run complete in {:.2?}: {} records, {} snapshots",
            report.duration,
            report.total_records(),
            report.snapshots
        );
        Ok(report)
    }

    /// Recomputes social aggregates and rebuilds snapshots for the affected
    /// dates. Aggregated tables are a cache over raw data, so they are fully
    /// overwritten for every touched date.
    fn aggregate(&self, dates: &BTreeSet<NaiveDate>) -> Result<u64> {
        let aggregator = Aggregator::new(&self.store);

        let mut sentiment_rows: Vec<SocialSentimentRow> = Vec::new();
        let mut snapshot_rows: Vec<SnapshotRow> = Vec::new();
        for date in dates {
            for platform in SOCIAL_PLATFORMS {
                sentiment_rows.push(aggregator.social_sentiment(*date, platform)?);
            }
            for asset in &self.config.tracked_assets {
                snapshot_rows.push(aggregator.snapshot(*date, &asset.to_uppercase())?);
            }
        }

        self.store
            .upsert(&sentiment_rows)
            .context("Failed to persist social aggregates")?;
        let snapshots = self
            .store
            .upsert(&snapshot_rows)
            .context("Failed to persist snapshots")?;
        info!(
            "Recomputed {} social aggregates and {} snapshots over {} date(s)",
            sentiment_rows.len(),
            snapshots,
            dates.len()
        );
        Ok(snapshots)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_daily_sync_window_is_exactly_the_lookback() {
        let config = AppConfig::default();
        let now = Utc::now();
        for source in [
            Source::Prices,
            Source::FearGreed,
            Source::EtfFlows,
            Source::MarketMetrics,
            Source::Derivatives,
            Source::Social,
        ] {
            let window = RunMode::DailySync.window(source, &config, now);
            assert_eq!(window.end, now);
            assert_eq!(window.start, now - Duration::days(7));
        }
    }

    #[test]
    fn test_backfill_windows_cover_source_horizons() {
        let config = AppConfig::default();
        let now = Utc::now();

        let prices = RunMode::Backfill.window(Source::Prices, &config, now);
        assert!(now - prices.start >= Duration::days(config.backfill.prices_days as i64));

        let flows = RunMode::Backfill.window(Source::EtfFlows, &config, now);
        assert!(now - flows.start >= Duration::days(300));

        let social = RunMode::Backfill.window(Source::Social, &config, now);
        assert!(now - social.start >= Duration::days(7));

        // Flow history runs deeper than social history
        assert!(flows.start < social.start);
    }
}
