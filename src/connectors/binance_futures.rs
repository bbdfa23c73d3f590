use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::config::DerivativesConfig;
use crate::connector::{Connector, FetchWindow, Source};
use crate::connectors::send_json;
use crate::error::SourceError;
use crate::model::{FundingRateRow, OpenInterestRow, RawRecord};
use crate::retry::RetryPolicy;

/// Derivatives connector for Binance's public futures API: perpetual funding
/// rates and open interest per tracked asset. Both endpoints report current
/// values only. Funding rows are stamped with the start of the funding
/// interval they belong to and open interest with the window's end date.
/// Decimal fields arrive string-encoded and are parsed defensively. No API
/// key is needed for market data.
pub struct BinanceFuturesConnector {
    base_url: String,
    assets: Vec<String>,
    client: reqwest::Client,
    policy: RetryPolicy,
}

/// Binance's standard funding cadence.
const FUNDING_INTERVAL_HOURS: i64 = 8;

/// Binance perpetual symbol for a CoinGecko coin id. Unmapped assets are
/// skipped with a warning rather than failing the whole source.
fn perp_symbol(coin_id: &str) -> Option<&'static str> {
    match coin_id {
        "bitcoin" => Some("BTCUSDT"),
        "ethereum" => Some("ETHUSDT"),
        _ => None,
    }
}

impl BinanceFuturesConnector {
    pub fn new(
        config: &DerivativesConfig,
        tracked_assets: &[String],
        policy: RetryPolicy,
    ) -> Result<Self> {
        Ok(BinanceFuturesConnector {
            base_url: config.base_url.clone(),
            assets: tracked_assets.to_vec(),
            client: super::build_client()?,
            policy,
        })
    }

    fn request(&self, path: &str, symbol: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .query(&[("symbol", symbol)])
    }
}

#[derive(Deserialize, Debug)]
struct PremiumIndex {
    #[serde(rename = "lastFundingRate")]
    last_funding_rate: String,
    #[serde(rename = "markPrice")]
    mark_price: String,
    /// Milliseconds timestamp of the upcoming funding event.
    #[serde(rename = "nextFundingTime", default)]
    next_funding_time: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct OpenInterest {
    #[serde(rename = "openInterest")]
    open_interest: String,
}

#[async_trait]
impl Connector for BinanceFuturesConnector {
    fn source(&self) -> Source {
        Source::Derivatives
    }

    #[instrument(name = "BinanceFuturesFetch", skip(self, window))]
    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<RawRecord>, SourceError> {
        let mut records = Vec::new();
        let mut first_request = true;

        for coin_id in &self.assets {
            let Some(symbol) = perp_symbol(coin_id) else {
                warn!("No futures symbol mapping for {coin_id}, skipping");
                continue;
            };
            if !first_request {
                self.policy.pause().await;
            }
            first_request = false;

            info!("Fetching funding rate for {symbol}");
            let premium: PremiumIndex = self
                .policy
                .call(|| send_json(self.request("/fapi/v1/premiumIndex", symbol)))
                .await?;

            self.policy.pause().await;
            info!("Fetching open interest for {symbol}");
            let oi: OpenInterest = self
                .policy
                .call(|| send_json(self.request("/fapi/v1/openInterest", symbol)))
                .await?;

            let asset = coin_id.to_uppercase();
            let mark_price = premium.mark_price.parse::<f64>().ok();

            // The current rate applies to the running 8h funding interval;
            // stamping its start keeps re-ingestion of the same reading
            // idempotent.
            let ts_utc = premium
                .next_funding_time
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .map(|next| next - Duration::hours(FUNDING_INTERVAL_HOURS))
                .unwrap_or(window.end);

            match premium.last_funding_rate.parse::<f64>() {
                Ok(rate) => records.push(RawRecord::FundingRate(FundingRateRow {
                    asset: asset.clone(),
                    ts_utc,
                    funding_rate_pct: rate * 100.0,
                    funding_interval_hours: FUNDING_INTERVAL_HOURS,
                    mark_price,
                    source: "BINANCE".to_string(),
                })),
                Err(_) => warn!(
                    "Skipping unparsable funding rate {:?} for {symbol}",
                    premium.last_funding_rate
                ),
            }

            match (oi.open_interest.parse::<f64>(), mark_price) {
                (Ok(contracts), Some(price)) => {
                    records.push(RawRecord::OpenInterest(OpenInterestRow {
                        as_of_date: window.end.date_naive(),
                        asset,
                        open_interest_usd: contracts * price,
                        open_interest_contracts: Some(contracts),
                        source: "BINANCE".to_string(),
                    }))
                }
                _ => warn!(
                    "Skipping open interest for {symbol}: contracts={:?}, mark_price={mark_price:?}",
                    oi.open_interest
                ),
            }
        }

        info!("Fetched {} derivatives records", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector(base_url: &str, assets: &[&str]) -> BinanceFuturesConnector {
        let config = DerivativesConfig {
            enabled: true,
            base_url: base_url.to_string(),
        };
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            jitter: 0.0,
            rate_limit_delay: Duration::ZERO,
        };
        BinanceFuturesConnector::new(
            &config,
            &assets.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            policy,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_parses_string_encoded_derivatives() {
        let mock_server = MockServer::start().await;
        let end = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();
        let window = FetchWindow::trailing_days(end, 1);

        Mock::given(method("GET"))
            .and(path("/fapi/v1/premiumIndex"))
            .and(query_param("symbol", "BTCUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"symbol": "BTCUSDT", "markPrice": "100000.00", "indexPrice": "99990.00", "lastFundingRate": "0.00010000", "nextFundingTime": 1749600000000}"#,
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/openInterest"))
            .and(query_param("symbol", "BTCUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"openInterest": "80000.00", "symbol": "BTCUSDT", "time": 1749550000000}"#,
            ))
            .mount(&mock_server)
            .await;

        let records = connector(&mock_server.uri(), &["bitcoin"])
            .fetch(&window)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        match &records[0] {
            RawRecord::FundingRate(row) => {
                assert_eq!(row.asset, "BITCOIN");
                // 0.0001 as a percentage
                assert!((row.funding_rate_pct - 0.01).abs() < 1e-12);
                assert_eq!(row.funding_interval_hours, 8);
                assert_eq!(row.mark_price, Some(100000.0));
                // Start of the funding interval that ends 2025-06-11T00:00Z
                assert_eq!(
                    row.ts_utc,
                    Utc.with_ymd_and_hms(2025, 6, 10, 16, 0, 0).unwrap()
                );
            }
            other => panic!("Unexpected record: {other:?}"),
        }
        match &records[1] {
            RawRecord::OpenInterest(row) => {
                assert_eq!(row.asset, "BITCOIN");
                // 80k contracts at the 100k mark price
                assert_eq!(row.open_interest_usd, 8.0e9);
                assert_eq!(row.open_interest_contracts, Some(80000.0));
                assert_eq!(row.as_of_date, end.date_naive());
            }
            other => panic!("Unexpected record: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unmapped_asset_skipped_without_requests() {
        let mock_server = MockServer::start().await;
        let window = FetchWindow::trailing_days(Utc::now(), 1);

        // No mounts: any request would 404 and fail the fetch
        let records = connector(&mock_server.uri(), &["dogecoin"])
            .fetch(&window)
            .await
            .unwrap();
        assert!(records.is_empty());
    }
}
