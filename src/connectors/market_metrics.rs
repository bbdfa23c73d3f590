use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, instrument};

use crate::config::MarketMetricsConfig;
use crate::connector::{Connector, FetchWindow, Source};
use crate::connectors::send_json;
use crate::error::SourceError;
use crate::model::{MarketMetricsRow, RawRecord};
use crate::retry::RetryPolicy;

/// Market-wide metrics connector (CoinGecko `/global` + `/coins/markets`).
/// Both endpoints report current values only, so every run yields one row
/// per tracked asset dated to the window's end. BTC dominance is a global
/// figure and rides on the BITCOIN row alone.
pub struct MarketMetricsConnector {
    base_url: String,
    api_key: Option<String>,
    assets: Vec<String>,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl MarketMetricsConnector {
    pub fn new(
        config: &MarketMetricsConfig,
        tracked_assets: &[String],
        policy: RetryPolicy,
    ) -> Result<Self> {
        Ok(MarketMetricsConnector {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            assets: tracked_assets.to_vec(),
            client: super::build_client()?,
            policy,
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-pro-api-key", key);
        }
        request
    }
}

#[derive(Deserialize, Debug)]
struct GlobalResponse {
    data: GlobalData,
}

#[derive(Deserialize, Debug)]
struct GlobalData {
    #[serde(default)]
    market_cap_percentage: HashMap<String, f64>,
}

#[derive(Deserialize, Debug)]
struct CoinMarket {
    id: String,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    total_volume: Option<f64>,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
}

#[async_trait]
impl Connector for MarketMetricsConnector {
    fn source(&self) -> Source {
        Source::MarketMetrics
    }

    #[instrument(name = "MarketMetricsFetch", skip(self, window))]
    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<RawRecord>, SourceError> {
        info!("Fetching global market metrics");
        let global: GlobalResponse = self
            .policy
            .call(|| send_json(self.request("/global")))
            .await?;
        let btc_dominance = global.data.market_cap_percentage.get("btc").copied();

        self.policy.pause().await;

        let ids = self.assets.join(",");
        info!("Fetching coin metrics for {} assets", self.assets.len());
        let coins: Vec<CoinMarket> = self
            .policy
            .call(|| {
                send_json(self.request("/coins/markets").query(&[
                    ("vs_currency", "usd"),
                    ("ids", ids.as_str()),
                    ("order", "market_cap_desc"),
                    ("sparkline", "false"),
                ]))
            })
            .await?;

        let as_of_date = window.end.date_naive();
        let records: Vec<RawRecord> = coins
            .into_iter()
            .map(|coin| {
                let asset = coin.id.to_uppercase();
                RawRecord::MarketMetrics(MarketMetricsRow {
                    as_of_date,
                    btc_dominance_pct: if asset == "BITCOIN" { btc_dominance } else { None },
                    asset,
                    volume_24h_usd: coin.total_volume,
                    market_cap_usd: coin.market_cap,
                    price_change_24h_pct: coin.price_change_percentage_24h,
                    source: "COINGECKO".to_string(),
                })
            })
            .collect();

        info!("Fetched {} market metrics records", records.len());
        Ok(records)
    }
}
