use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::config::FearGreedConfig;
use crate::connector::{Connector, FetchWindow, Source};
use crate::connectors::send_json;
use crate::error::SourceError;
use crate::model::{FearGreedRow, RawRecord};
use crate::retry::RetryPolicy;

/// Daily Fear & Greed index connector (alternative.me style API). The API
/// returns one entry per day; numbers arrive string-encoded.
pub struct FearGreedConnector {
    base_url: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl FearGreedConnector {
    pub fn new(config: &FearGreedConfig, policy: RetryPolicy) -> Result<Self> {
        Ok(FearGreedConnector {
            base_url: config.base_url.clone(),
            client: super::build_client()?,
            policy,
        })
    }
}

#[derive(Deserialize, Debug)]
struct FearGreedResponse {
    data: Vec<FearGreedEntry>,
}

#[derive(Deserialize, Debug)]
struct FearGreedEntry {
    value: String,
    value_classification: String,
    timestamp: String,
}

#[async_trait]
impl Connector for FearGreedConnector {
    fn source(&self) -> Source {
        Source::FearGreed
    }

    #[instrument(name = "FearGreedFetch", skip(self, window))]
    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<RawRecord>, SourceError> {
        let limit = window.days().max(1);
        info!("Fetching Fear & Greed index for last {limit} days");

        let url = format!("{}/fng/", self.base_url);
        let response: FearGreedResponse = self
            .policy
            .call(|| send_json(self.client.get(&url).query(&[("limit", limit.to_string())])))
            .await?;

        let mut records = Vec::new();
        for entry in response.data {
            let (Ok(ts), Ok(value)) = (entry.timestamp.parse::<i64>(), entry.value.parse::<i64>())
            else {
                warn!(
                    "Skipping malformed Fear & Greed entry (timestamp={}, value={})",
                    entry.timestamp, entry.value
                );
                continue;
            };
            let Some(ts_utc) = Utc.timestamp_opt(ts, 0).single() else {
                warn!("Skipping Fear & Greed entry with out-of-range timestamp {ts}");
                continue;
            };
            if !window.contains(ts_utc) {
                continue;
            }
            records.push(RawRecord::FearGreed(FearGreedRow {
                as_of_date: ts_utc.date_naive(),
                value,
                classification: entry.value_classification.to_uppercase(),
            }));
        }

        info!("Fetched {} Fear & Greed records", records.len());
        Ok(records)
    }
}
