use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::error::StoreError;
use crate::model::{
    EtfFlowRow, FearGreedRow, FundingRateRow, MarketMetricsRow, OhlcRow, OpenInterestRow, Session,
    SnapshotRow, SocialPostRow, SocialSentimentRow,
};
use crate::sentiment::SentimentLabel;
use crate::store::Store;

/// Trailing window for realized volatility, in calendar days including the
/// as-of date.
pub const VOLATILITY_WINDOW_DAYS: i64 = 7;

/// Annualization factor for hourly log returns: hours per year. Annualized
/// volatility = stddev(hourly log returns) * sqrt(HOURS_PER_YEAR), in
/// percent.
pub const HOURS_PER_YEAR: f64 = 24.0 * 365.0;

/// Pure function of stored raw data. Reads rows in natural-key order and
/// folds sequentially, so identical raw inputs always produce bit-identical
/// aggregates and re-aggregation never needs a re-fetch. Missing raw inputs
/// yield `None` fields, never a fabricated value.
pub struct Aggregator<'a> {
    store: &'a Store,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a Store) -> Self {
        Aggregator { store }
    }

    /// Daily sentiment composite for one platform: mean of per-post compound
    /// scores weighted by engagement (`max(score, 1)`), plus label-bucket
    /// percentages. A day without posts yields a null-valued aggregate.
    pub fn social_sentiment(
        &self,
        as_of_date: NaiveDate,
        platform: &str,
    ) -> Result<SocialSentimentRow, StoreError> {
        let posts: Vec<SocialPostRow> = self.store.query(|post: &SocialPostRow| {
            post.platform == platform && post.created_utc.date_naive() == as_of_date
        })?;

        if posts.is_empty() {
            return Ok(SocialSentimentRow {
                as_of_date,
                platform: platform.to_string(),
                post_count: 0,
                avg_compound: None,
                positive_pct: None,
                negative_pct: None,
                neutral_pct: None,
            });
        }

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        let mut positive = 0u64;
        let mut negative = 0u64;
        let mut neutral = 0u64;

        for post in &posts {
            let weight = post.score.max(1) as f64;
            weighted_sum += post.sentiment.compound * weight;
            weight_total += weight;
            match post.sentiment.label {
                SentimentLabel::Positive => positive += 1,
                SentimentLabel::Negative => negative += 1,
                SentimentLabel::Neutral => neutral += 1,
            }
        }

        let total = posts.len() as f64;
        debug!(
            "Aggregated {} posts for {platform} on {as_of_date}",
            posts.len()
        );
        Ok(SocialSentimentRow {
            as_of_date,
            platform: platform.to_string(),
            post_count: posts.len() as u64,
            avg_compound: Some(weighted_sum / weight_total),
            positive_pct: Some(positive as f64 / total * 100.0),
            negative_pct: Some(negative as f64 / total * 100.0),
            neutral_pct: Some(neutral as f64 / total * 100.0),
        })
    }

    /// Derived per-day-per-asset summary joining price, sentiment and flow
    /// aggregates. Every field traces to a stored row; absent inputs stay
    /// `None`.
    pub fn snapshot(&self, as_of_date: NaiveDate, asset: &str) -> Result<SnapshotRow, StoreError> {
        let day_rows: Vec<OhlcRow> = self
            .store
            .scan_prefix(&format!("{asset}/{as_of_date}T"))?;

        let price_close_usd = day_rows.last().map(|row| row.close);
        let price_chg_24h_pct = match (day_rows.first(), day_rows.last()) {
            (Some(first), Some(last)) if first.open > 0.0 && day_rows.len() >= 2 => {
                Some((last.close - first.open) / first.open * 100.0)
            }
            _ => None,
        };

        let realized_vol_7d_pct = self.realized_volatility(as_of_date, asset)?;
        let dominant_session = dominant_session(&day_rows);

        let fng: Option<FearGreedRow> = self.store.get(&as_of_date.to_string())?;

        let flows: Vec<EtfFlowRow> = self.store.scan_prefix(&format!("{as_of_date}/"))?;
        let etf_net_flow_usd = flows
            .iter()
            .filter_map(|row| row.net_flow_usd)
            .fold(None, |acc, flow| Some(acc.unwrap_or(0.0) + flow));

        let metrics: Option<MarketMetricsRow> =
            self.store.get(&format!("{as_of_date}/{asset}"))?;
        let open_interest: Option<OpenInterestRow> =
            self.store.get(&format!("{as_of_date}/{asset}"))?;

        let funding: Vec<FundingRateRow> =
            self.store.scan_prefix(&format!("{asset}/{as_of_date}T"))?;
        let avg_funding_rate_pct = mean(funding.iter().map(|row| row.funding_rate_pct));

        let social: Vec<SocialSentimentRow> =
            self.store.scan_prefix(&format!("{as_of_date}/"))?;
        let social_avg_compound = weighted_social_mean(&social);

        Ok(SnapshotRow {
            as_of_date,
            asset: asset.to_string(),
            price_close_usd,
            price_chg_24h_pct,
            realized_vol_7d_pct,
            fng_value: fng.as_ref().map(|row| row.value),
            fng_classification: fng.map(|row| row.classification),
            etf_net_flow_usd,
            btc_dominance_pct: metrics.as_ref().and_then(|row| row.btc_dominance_pct),
            market_cap_usd: metrics.and_then(|row| row.market_cap_usd),
            avg_funding_rate_pct,
            open_interest_usd: open_interest.map(|row| row.open_interest_usd),
            social_avg_compound,
            dominant_session,
        })
    }

    /// Sample standard deviation of hourly log returns over the trailing
    /// window, annualized by `sqrt(HOURS_PER_YEAR)`, in percent. Needs at
    /// least three price points (two returns).
    fn realized_volatility(
        &self,
        as_of_date: NaiveDate,
        asset: &str,
    ) -> Result<Option<f64>, StoreError> {
        let window_start = as_of_date - Duration::days(VOLATILITY_WINDOW_DAYS - 1);
        let rows: Vec<OhlcRow> = self.store.query(|row: &OhlcRow| {
            let date = row.ts_utc.date_naive();
            row.asset == asset && date >= window_start && date <= as_of_date
        })?;

        let closes: Vec<f64> = rows
            .iter()
            .map(|row| row.close)
            .filter(|close| *close > 0.0)
            .collect();
        if closes.len() < 3 {
            return Ok(None);
        }

        let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns
            .iter()
            .map(|r| (r - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);

        Ok(Some(variance.sqrt() * HOURS_PER_YEAR.sqrt() * 100.0))
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values {
        sum += value;
        count += 1;
    }
    if count > 0 { Some(sum / count as f64) } else { None }
}

/// Most frequent trading session among the day's price rows; ties break by
/// session order (ASIA, EUROPE, US) so the result is deterministic.
fn dominant_session(rows: &[OhlcRow]) -> Option<Session> {
    if rows.is_empty() {
        return None;
    }
    let mut best: Option<(usize, Session)> = None;
    for session in [Session::Asia, Session::Europe, Session::Us] {
        let count = rows.iter().filter(|row| row.session == session).count();
        if best.is_none_or(|(best_count, _)| count > best_count) {
            best = Some((count, session));
        }
    }
    best.map(|(_, session)| session)
}

/// Cross-platform mean of daily compounds, weighted by post count.
fn weighted_social_mean(rows: &[SocialSentimentRow]) -> Option<f64> {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for row in rows {
        if let Some(compound) = row.avg_compound {
            let weight = row.post_count.max(1) as f64;
            weighted_sum += compound * weight;
            weight_total += weight;
        }
    }
    if weight_total > 0.0 {
        Some(weighted_sum / weight_total)
    } else {
        None
    }
}
