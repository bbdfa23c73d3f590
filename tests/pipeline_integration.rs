use chrono::{Duration, Utc};
use tracing::info;

use marketintel::config::AppConfig;
use marketintel::pipeline::{Pipeline, RunMode};
use marketintel::report::{OutcomeStatus, RunStatus};

mod test_utils {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Config with every source pointed at the mock server and the store
    /// rooted in a temp directory. Retries are kept fast for tests.
    pub fn test_config(server_uri: &str, db_path: &std::path::Path) -> AppConfig {
        let yaml = format!(
            r#"
database: "{db}"
tracked_assets:
  - bitcoin
daily_lookback_days: 7
retry:
  max_attempts: 3
  base_delay_ms: 1
  jitter: 0.0
  rate_limit_delay_ms: 0
sources:
  coingecko:
    base_url: "{uri}"
  fear_greed:
    base_url: "{uri}"
  etf_flows:
    base_url: "{uri}"
    api_key: "etf-secret"
  market_metrics:
    base_url: "{uri}"
  derivatives:
    base_url: "{uri}"
  social:
    enabled: true
    base_url: "{uri}"
    subreddits: ["Bitcoin"]
"#,
            db = db_path.display(),
            uri = server_uri
        );
        serde_yaml::from_str(&yaml).expect("test config should parse")
    }

    pub async fn mount_prices(server: &MockServer) {
        let now = Utc::now();
        let body = format!(
            r#"{{"prices": [[{}, 100000.0], [{}, 110000.0]]}}"#,
            (now - Duration::hours(3)).timestamp_millis(),
            (now - Duration::hours(1)).timestamp_millis()
        );
        Mock::given(method("GET"))
            .and(path("/coins/bitcoin/market_chart"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    pub async fn mount_fear_greed(server: &MockServer) {
        let body = format!(
            r#"{{"data": [{{"value": "28", "value_classification": "Fear", "timestamp": "{}"}}]}}"#,
            (Utc::now() - Duration::hours(2)).timestamp()
        );
        Mock::given(method("GET"))
            .and(path("/fng/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    pub async fn mount_etf_flows(server: &MockServer) {
        let body = format!(
            r#"{{"data": [{{"date": "{}", "ticker": "IBIT", "net_flow_usd": 120500000.0, "aum_usd": null}}]}}"#,
            Utc::now().date_naive()
        );
        Mock::given(method("GET"))
            .and(path("/etf/flows"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    pub async fn mount_market_metrics(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/global"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data": {"market_cap_percentage": {"btc": 56.2}}}"#,
            ))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"id": "bitcoin", "market_cap": 2.1e12, "total_volume": 3.5e10, "price_change_percentage_24h": 1.8}]"#,
            ))
            .mount(server)
            .await;
    }

    pub async fn mount_derivatives(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/fapi/v1/premiumIndex"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"symbol": "BTCUSDT", "markPrice": "100000.00", "lastFundingRate": "0.00010000", "nextFundingTime": 1749600000000}"#,
            ))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/openInterest"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"openInterest": "80000.00", "symbol": "BTCUSDT"}"#,
            ))
            .mount(server)
            .await;
    }

    pub async fn mount_social(server: &MockServer) {
        let body = format!(
            r#"{{"data": {{"children": [
                {{"data": {{"id": "abc", "title": "Bitcoin rally continues", "selftext": "bullish", "created_utc": {}, "score": 120, "num_comments": 31, "permalink": "/r/Bitcoin/abc"}}}}
            ]}}}}"#,
            (Utc::now() - Duration::hours(5)).timestamp()
        );
        Mock::given(method("GET"))
            .and(path("/r/Bitcoin/top.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    pub async fn mount_all(server: &MockServer) {
        mount_prices(server).await;
        mount_fear_greed(server).await;
        mount_etf_flows(server).await;
        mount_market_metrics(server).await;
        mount_derivatives(server).await;
        mount_social(server).await;
    }
}

#[test_log::test(tokio::test)]
async fn test_daily_sync_ingests_all_sources() {
    let server = wiremock::MockServer::start().await;
    test_utils::mount_all(&server).await;
    let dir = tempfile::tempdir().unwrap();

    let pipeline = Pipeline::new(test_utils::test_config(&server.uri(), dir.path())).unwrap();
    let report = pipeline.run(RunMode::DailySync).await.unwrap();

    info!(?report, "Daily sync finished");
    assert_eq!(report.status(), RunStatus::Success);
    // 2 price points + 1 index reading + 1 flow + 1 metrics row
    // + 1 funding rate + 1 open interest + 1 post
    assert_eq!(report.total_records(), 8);
    assert_eq!(report.record_counts["ohlc_hourly"], 2);
    assert_eq!(report.record_counts["sentiment_daily"], 1);
    assert_eq!(report.record_counts["etf_flows_daily"], 1);
    assert_eq!(report.record_counts["market_metrics_daily"], 1);
    assert_eq!(report.record_counts["funding_rates_snapshots"], 1);
    assert_eq!(report.record_counts["open_interest_daily"], 1);
    assert_eq!(report.record_counts["social_posts_raw"], 1);
    // One social aggregate and one snapshot per affected date
    assert!(report.record_counts["social_sentiment_daily"] >= 1);
    assert!(report.snapshots >= 1);
    assert_eq!(report.record_counts["daily_market_snapshot"], report.snapshots);
}

#[test_log::test(tokio::test)]
async fn test_rerun_is_idempotent() {
    let server = wiremock::MockServer::start().await;
    test_utils::mount_all(&server).await;
    let dir = tempfile::tempdir().unwrap();

    let pipeline = Pipeline::new(test_utils::test_config(&server.uri(), dir.path())).unwrap();
    let first = pipeline.run(RunMode::DailySync).await.unwrap();
    let second = pipeline.run(RunMode::DailySync).await.unwrap();

    // Same upstream data twice: every row replaces itself, counts are stable
    assert_eq!(first.record_counts["ohlc_hourly"], 2);
    assert_eq!(first.record_counts, second.record_counts);
}

#[test_log::test(tokio::test)]
async fn test_failed_source_does_not_abort_the_run() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    let server = wiremock::MockServer::start().await;
    test_utils::mount_prices(&server).await;
    test_utils::mount_fear_greed(&server).await;
    test_utils::mount_market_metrics(&server).await;
    test_utils::mount_derivatives(&server).await;
    test_utils::mount_social(&server).await;
    // Auth failure is fatal: no retries, source recorded as failed
    Mock::given(method("GET"))
        .and(path("/etf/flows"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let pipeline = Pipeline::new(test_utils::test_config(&server.uri(), dir.path())).unwrap();
    let report = pipeline.run(RunMode::DailySync).await.unwrap();

    match report.status() {
        RunStatus::PartialSuccess { failed } => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].id(), "etf_flows");
        }
        other => panic!("Expected partial success, got {other:?}"),
    }
    // Everything obtained from the healthy sources was still persisted
    assert_eq!(report.record_counts["ohlc_hourly"], 2);
    assert_eq!(report.record_counts["sentiment_daily"], 1);
    assert_eq!(report.record_counts["etf_flows_daily"], 0);
    assert!(report.snapshots >= 1);
}

#[test_log::test(tokio::test)]
async fn test_status_reads_the_store_without_contacting_sources() {
    let server = wiremock::MockServer::start().await;
    test_utils::mount_all(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db");

    let pipeline = Pipeline::new(test_utils::test_config(&server.uri(), &db_path)).unwrap();
    let report = pipeline.run(RunMode::DailySync).await.unwrap();
    drop(pipeline);

    // Same database, but a config whose endpoints resolve nowhere; status
    // only opens the store, so the dead endpoints are never contacted.
    let config_path = dir.path().join("config.yaml");
    let offline = test_utils::test_config("http://127.0.0.1:9", &db_path);
    std::fs::write(&config_path, serde_yaml::to_string(&offline).unwrap()).unwrap();

    let status = marketintel::status(config_path.to_str()).unwrap();
    assert_eq!(status.database, db_path);
    assert_eq!(status.tracked_assets, vec!["bitcoin".to_string()]);
    assert_eq!(status.record_counts, report.record_counts);
}

#[test_log::test(tokio::test)]
async fn test_transient_failure_respects_attempt_budget() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    let server = wiremock::MockServer::start().await;
    test_utils::mount_fear_greed(&server).await;
    test_utils::mount_etf_flows(&server).await;
    test_utils::mount_market_metrics(&server).await;
    test_utils::mount_derivatives(&server).await;
    test_utils::mount_social(&server).await;
    // Server errors are transient; mock verification pins exactly 3 attempts
    Mock::given(method("GET"))
        .and(path("/coins/bitcoin/market_chart"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let pipeline = Pipeline::new(test_utils::test_config(&server.uri(), dir.path())).unwrap();
    let report = pipeline.run(RunMode::DailySync).await.unwrap();

    let prices = report
        .outcomes
        .iter()
        .find(|outcome| outcome.source.id() == "prices")
        .unwrap();
    assert_eq!(prices.status, OutcomeStatus::Failed);
    assert!(prices.error.as_deref().unwrap().contains("after 3 attempts"));
    assert!(!report.is_success());
}
