use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::config::EtfFlowsConfig;
use crate::connector::{Connector, FetchWindow, Source};
use crate::connectors::send_json;
use crate::error::SourceError;
use crate::model::{EtfFlowRow, RawRecord};
use crate::retry::RetryPolicy;

/// Institutional ETF flow connector. Authenticated JSON endpoint returning
/// per-ticker daily net flows; an unavailable source surfaces a classified
/// error and yields nothing; there is no placeholder substitution, since
/// downstream consumers treat absence as "unknown" rather than "zero".
pub struct EtfFlowsConnector {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl EtfFlowsConnector {
    pub fn new(config: &EtfFlowsConfig, policy: RetryPolicy) -> Result<Self> {
        Ok(EtfFlowsConnector {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            client: super::build_client()?,
            policy,
        })
    }

    fn request(&self, days: u32) -> reqwest::RequestBuilder {
        let url = format!("{}/etf/flows", self.base_url);
        let mut request = self
            .client
            .get(url)
            .query(&[("days", days.to_string())]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        request
    }
}

#[derive(Deserialize, Debug)]
struct EtfFlowsResponse {
    data: Vec<EtfFlowEntry>,
}

#[derive(Deserialize, Debug)]
struct EtfFlowEntry {
    date: NaiveDate,
    ticker: String,
    net_flow_usd: Option<f64>,
    aum_usd: Option<f64>,
}

#[async_trait]
impl Connector for EtfFlowsConnector {
    fn source(&self) -> Source {
        Source::EtfFlows
    }

    #[instrument(name = "EtfFlowsFetch", skip(self, window))]
    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<RawRecord>, SourceError> {
        let days = window.days().max(1);
        info!("Fetching ETF flows for last {days} days");

        let response: EtfFlowsResponse = self
            .policy
            .call(|| send_json(self.request(days)))
            .await?;

        let start = window.start.date_naive();
        let end = window.end.date_naive();
        let records: Vec<RawRecord> = response
            .data
            .into_iter()
            .filter(|entry| entry.date >= start && entry.date <= end)
            .map(|entry| {
                RawRecord::EtfFlow(EtfFlowRow {
                    as_of_date: entry.date,
                    ticker: entry.ticker.to_uppercase(),
                    net_flow_usd: entry.net_flow_usd,
                    aum_usd: entry.aum_usd,
                    source: "API".to_string(),
                })
            })
            .collect();

        info!("Fetched {} ETF flow records", records.len());
        Ok(records)
    }
}
