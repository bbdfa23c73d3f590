use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Timelike, Utc};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::config::CoinGeckoConfig;
use crate::connector::{Connector, FetchWindow, Source};
use crate::connectors::send_json;
use crate::error::SourceError;
use crate::model::{OhlcRow, RawRecord, Session};
use crate::retry::RetryPolicy;

/// Hourly price connector backed by CoinGecko's `market_chart` endpoint.
/// One request per tracked asset; each price point becomes one `OhlcRow`
/// keyed by (asset, ts_utc).
pub struct CoinGeckoConnector {
    base_url: String,
    api_key: Option<String>,
    assets: Vec<String>,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl CoinGeckoConnector {
    pub fn new(
        config: &CoinGeckoConfig,
        tracked_assets: &[String],
        policy: RetryPolicy,
    ) -> Result<Self> {
        Ok(CoinGeckoConnector {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            assets: tracked_assets.to_vec(),
            client: super::build_client()?,
            policy,
        })
    }

    fn request(&self, coin_id: &str, days: u32) -> reqwest::RequestBuilder {
        let url = format!("{}/coins/{}/market_chart", self.base_url, coin_id);
        let mut request = self
            .client
            .get(url)
            .query(&[("vs_currency", "usd"), ("days", &days.to_string())]);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-pro-api-key", key);
        }
        request
    }
}

#[derive(Deserialize, Debug)]
struct MarketChartResponse {
    /// `[timestamp_ms, price]` pairs.
    prices: Vec<(f64, f64)>,
}

#[async_trait]
impl Connector for CoinGeckoConnector {
    fn source(&self) -> Source {
        Source::Prices
    }

    #[instrument(name = "CoinGeckoFetch", skip(self, window))]
    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<RawRecord>, SourceError> {
        let days = window.days();
        let mut records = Vec::new();

        for (i, coin_id) in self.assets.iter().enumerate() {
            if i > 0 {
                self.policy.pause().await;
            }
            info!("Fetching {days}-day price data for {coin_id}");

            let response: MarketChartResponse = self
                .policy
                .call(|| send_json(self.request(coin_id, days)))
                .await?;

            let asset = coin_id.to_uppercase();
            let mut count = 0usize;
            for (ts_ms, price) in response.prices {
                let Some(ts_utc) = Utc.timestamp_millis_opt(ts_ms as i64).single() else {
                    warn!("Skipping price point with invalid timestamp {ts_ms}");
                    continue;
                };
                if !window.contains(ts_utc) {
                    continue;
                }
                records.push(RawRecord::Ohlc(OhlcRow {
                    asset: asset.clone(),
                    ts_utc,
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    session: Session::classify(ts_utc.hour()),
                }));
                count += 1;
            }
            debug!("Normalized {count} price records for {coin_id}");
        }

        info!("Fetched {} price records total", records.len());
        Ok(records)
    }
}
