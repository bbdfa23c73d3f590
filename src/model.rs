use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::sentiment::SentimentScore;

/// Persisted tables. Raw tables are written only by their owning connector's
/// ingestion step; aggregated and snapshot tables are fully recomputed
/// whenever their raw window is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    OhlcHourly,
    SentimentDaily,
    EtfFlowsDaily,
    MarketMetricsDaily,
    FundingRatesSnapshots,
    OpenInterestDaily,
    SocialPostsRaw,
    SocialSentimentDaily,
    DailySnapshot,
}

impl Table {
    pub const ALL: [Table; 9] = [
        Table::OhlcHourly,
        Table::SentimentDaily,
        Table::EtfFlowsDaily,
        Table::MarketMetricsDaily,
        Table::FundingRatesSnapshots,
        Table::OpenInterestDaily,
        Table::SocialPostsRaw,
        Table::SocialSentimentDaily,
        Table::DailySnapshot,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::OhlcHourly => "ohlc_hourly",
            Table::SentimentDaily => "sentiment_daily",
            Table::EtfFlowsDaily => "etf_flows_daily",
            Table::MarketMetricsDaily => "market_metrics_daily",
            Table::FundingRatesSnapshots => "funding_rates_snapshots",
            Table::OpenInterestDaily => "open_interest_daily",
            Table::SocialPostsRaw => "social_posts_raw",
            Table::SocialSentimentDaily => "social_sentiment_daily",
            Table::DailySnapshot => "daily_market_snapshot",
        }
    }
}

/// A row type bound to its table and natural key. The key string is the
/// business identity of the row: upserting a row with an existing key
/// replaces it, never duplicates it.
pub trait TableRow: Serialize + DeserializeOwned + Send {
    const TABLE: Table;
    fn key(&self) -> String;
}

/// Trading session by UTC hour, carried on hourly price rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Session {
    Asia,
    Europe,
    Us,
}

impl Session {
    pub fn classify(hour_utc: u32) -> Self {
        match hour_utc {
            0..=7 => Session::Asia,
            8..=15 => Session::Europe,
            _ => Session::Us,
        }
    }
}

/// Hourly price point for one asset. Natural key: (asset, ts_utc).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcRow {
    pub asset: String,
    pub ts_utc: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub session: Session,
}

impl TableRow for OhlcRow {
    const TABLE: Table = Table::OhlcHourly;

    fn key(&self) -> String {
        format!(
            "{}/{}",
            self.asset,
            self.ts_utc.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// Daily Fear & Greed index reading. Natural key: as_of_date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FearGreedRow {
    pub as_of_date: NaiveDate,
    pub value: i64,
    pub classification: String,
}

impl TableRow for FearGreedRow {
    const TABLE: Table = Table::SentimentDaily;

    fn key(&self) -> String {
        self.as_of_date.to_string()
    }
}

/// Daily net flow for one ETF ticker. Natural key: (as_of_date, ticker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtfFlowRow {
    pub as_of_date: NaiveDate,
    pub ticker: String,
    pub net_flow_usd: Option<f64>,
    pub aum_usd: Option<f64>,
    pub source: String,
}

impl TableRow for EtfFlowRow {
    const TABLE: Table = Table::EtfFlowsDaily;

    fn key(&self) -> String {
        format!("{}/{}", self.as_of_date, self.ticker)
    }
}

/// Daily market-wide metrics per asset. BTC dominance is a global figure
/// and only carried on the BITCOIN row; other assets hold `None`.
/// Natural key: (as_of_date, asset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMetricsRow {
    pub as_of_date: NaiveDate,
    pub asset: String,
    pub volume_24h_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub btc_dominance_pct: Option<f64>,
    pub price_change_24h_pct: Option<f64>,
    pub source: String,
}

impl TableRow for MarketMetricsRow {
    const TABLE: Table = Table::MarketMetricsDaily;

    fn key(&self) -> String {
        format!("{}/{}", self.as_of_date, self.asset)
    }
}

/// Point-in-time perpetual funding rate for one asset. Natural key:
/// (asset, ts_utc), so the day's snapshots sort chronologically per asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRateRow {
    pub asset: String,
    pub ts_utc: DateTime<Utc>,
    pub funding_rate_pct: f64,
    pub funding_interval_hours: i64,
    pub mark_price: Option<f64>,
    pub source: String,
}

impl TableRow for FundingRateRow {
    const TABLE: Table = Table::FundingRatesSnapshots;

    fn key(&self) -> String {
        format!(
            "{}/{}",
            self.asset,
            self.ts_utc.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// Daily open interest for one asset's perpetual contract. Natural key:
/// (as_of_date, asset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenInterestRow {
    pub as_of_date: NaiveDate,
    pub asset: String,
    pub open_interest_usd: f64,
    pub open_interest_contracts: Option<f64>,
    pub source: String,
}

impl TableRow for OpenInterestRow {
    const TABLE: Table = Table::OpenInterestDaily;

    fn key(&self) -> String {
        format!("{}/{}", self.as_of_date, self.asset)
    }
}

/// Raw social post with its sentiment score attached at ingest time.
/// Natural key: (platform, post_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialPostRow {
    pub platform: String,
    pub post_id: String,
    pub channel: String,
    pub title: String,
    pub created_utc: DateTime<Utc>,
    /// Engagement proxy used as an aggregation weight.
    pub score: i64,
    pub num_comments: i64,
    pub url: String,
    pub sentiment: SentimentScore,
}

impl TableRow for SocialPostRow {
    const TABLE: Table = Table::SocialPostsRaw;

    fn key(&self) -> String {
        format!("{}/{}", self.platform, self.post_id)
    }
}

/// Daily social sentiment aggregate per platform, recomputable byte-for-byte
/// from `social_posts_raw` alone. Natural key: (as_of_date, platform).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialSentimentRow {
    pub as_of_date: NaiveDate,
    pub platform: String,
    pub post_count: u64,
    pub avg_compound: Option<f64>,
    pub positive_pct: Option<f64>,
    pub negative_pct: Option<f64>,
    pub neutral_pct: Option<f64>,
}

impl TableRow for SocialSentimentRow {
    const TABLE: Table = Table::SocialSentimentDaily;

    fn key(&self) -> String {
        format!("{}/{}", self.as_of_date, self.platform)
    }
}

/// Derived per-day-per-asset summary joining price, sentiment and flow
/// aggregates. Absent inputs stay `None`; the snapshot never fabricates a
/// value for a source that produced nothing. Natural key: (as_of_date, asset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub as_of_date: NaiveDate,
    pub asset: String,
    pub price_close_usd: Option<f64>,
    pub price_chg_24h_pct: Option<f64>,
    pub realized_vol_7d_pct: Option<f64>,
    pub fng_value: Option<i64>,
    pub fng_classification: Option<String>,
    pub etf_net_flow_usd: Option<f64>,
    pub btc_dominance_pct: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub avg_funding_rate_pct: Option<f64>,
    pub open_interest_usd: Option<f64>,
    pub social_avg_compound: Option<f64>,
    pub dominant_session: Option<Session>,
}

impl TableRow for SnapshotRow {
    const TABLE: Table = Table::DailySnapshot;

    fn key(&self) -> String {
        format!("{}/{}", self.as_of_date, self.asset)
    }
}

/// A normalized record produced by a connector, routed to its raw table by
/// the storage layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Ohlc(OhlcRow),
    FearGreed(FearGreedRow),
    EtfFlow(EtfFlowRow),
    MarketMetrics(MarketMetricsRow),
    FundingRate(FundingRateRow),
    OpenInterest(OpenInterestRow),
    SocialPost(SocialPostRow),
}

impl RawRecord {
    pub fn table(&self) -> Table {
        match self {
            RawRecord::Ohlc(_) => OhlcRow::TABLE,
            RawRecord::FearGreed(_) => FearGreedRow::TABLE,
            RawRecord::EtfFlow(_) => EtfFlowRow::TABLE,
            RawRecord::MarketMetrics(_) => MarketMetricsRow::TABLE,
            RawRecord::FundingRate(_) => FundingRateRow::TABLE,
            RawRecord::OpenInterest(_) => OpenInterestRow::TABLE,
            RawRecord::SocialPost(_) => SocialPostRow::TABLE,
        }
    }

    pub fn key(&self) -> String {
        match self {
            RawRecord::Ohlc(row) => row.key(),
            RawRecord::FearGreed(row) => row.key(),
            RawRecord::EtfFlow(row) => row.key(),
            RawRecord::MarketMetrics(row) => row.key(),
            RawRecord::FundingRate(row) => row.key(),
            RawRecord::OpenInterest(row) => row.key(),
            RawRecord::SocialPost(row) => row.key(),
        }
    }

    /// UTC calendar date the record belongs to, used to size the
    /// re-aggregation window after ingestion.
    pub fn as_of_date(&self) -> NaiveDate {
        match self {
            RawRecord::Ohlc(row) => row.ts_utc.date_naive(),
            RawRecord::FearGreed(row) => row.as_of_date,
            RawRecord::EtfFlow(row) => row.as_of_date,
            RawRecord::MarketMetrics(row) => row.as_of_date,
            RawRecord::FundingRate(row) => row.ts_utc.date_naive(),
            RawRecord::OpenInterest(row) => row.as_of_date,
            RawRecord::SocialPost(row) => row.created_utc.date_naive(),
        }
    }

    pub fn to_value(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            RawRecord::Ohlc(row) => serde_json::to_vec(row),
            RawRecord::FearGreed(row) => serde_json::to_vec(row),
            RawRecord::EtfFlow(row) => serde_json::to_vec(row),
            RawRecord::MarketMetrics(row) => serde_json::to_vec(row),
            RawRecord::FundingRate(row) => serde_json::to_vec(row),
            RawRecord::OpenInterest(row) => serde_json::to_vec(row),
            RawRecord::SocialPost(row) => serde_json::to_vec(row),
        }
    }
}
