use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::SocialConfig;
use crate::connector::{Connector, FetchWindow, Source};
use crate::connectors::send_json;
use crate::error::SourceError;
use crate::model::{RawRecord, SocialPostRow};
use crate::retry::RetryPolicy;
use crate::sentiment::SentimentScorer;

/// Social sentiment connector reading Reddit's public listing JSON, no API
/// key required. Posts are scored with the black-box sentiment model right
/// after fetch so the raw table already carries per-item scores.
pub struct RedditConnector {
    base_url: String,
    subreddits: Vec<String>,
    client: reqwest::Client,
    policy: RetryPolicy,
    scorer: Arc<dyn SentimentScorer>,
}

impl RedditConnector {
    pub fn new(
        config: &SocialConfig,
        policy: RetryPolicy,
        scorer: Arc<dyn SentimentScorer>,
    ) -> Result<Self> {
        Ok(RedditConnector {
            base_url: config.base_url.clone(),
            subreddits: config.subreddits.clone(),
            client: super::build_client()?,
            policy,
            scorer,
        })
    }

    /// Listing sort and time filter scale with the window, matching how far
    /// back the listing API can reach.
    fn time_filter(days: u32) -> &'static str {
        match days {
            0..=1 => "day",
            2..=7 => "week",
            _ => "month",
        }
    }
}

#[derive(Deserialize, Debug)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize, Debug)]
struct ListingData {
    children: Vec<ListingChild>,
}

#[derive(Deserialize, Debug)]
struct ListingChild {
    data: RedditPost,
}

#[derive(Deserialize, Debug)]
struct RedditPost {
    id: String,
    title: String,
    #[serde(default)]
    selftext: String,
    created_utc: f64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: i64,
    permalink: String,
}

#[async_trait]
impl Connector for RedditConnector {
    fn source(&self) -> Source {
        Source::Social
    }

    #[instrument(name = "RedditFetch", skip(self, window))]
    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<RawRecord>, SourceError> {
        let filter = Self::time_filter(window.days());
        info!(
            "Fetching posts from {} subreddits (t={filter})",
            self.subreddits.len()
        );

        let mut records = Vec::new();
        for (i, subreddit) in self.subreddits.iter().enumerate() {
            if i > 0 {
                self.policy.pause().await;
            }
            let url = format!("{}/r/{}/top.json", self.base_url, subreddit);
            let listing: Listing = self
                .policy
                .call(|| {
                    send_json(
                        self.client
                            .get(&url)
                            .query(&[("limit", "100"), ("t", filter)]),
                    )
                })
                .await?;

            let mut count = 0usize;
            for child in listing.data.children {
                let post = child.data;
                let Some(created_utc) = Utc.timestamp_opt(post.created_utc as i64, 0).single()
                else {
                    warn!("Skipping post {} with invalid timestamp", post.id);
                    continue;
                };
                if !window.contains(created_utc) {
                    continue;
                }
                let text = format!("{} {}", post.title, post.selftext);
                let sentiment = self.scorer.score(&text);
                records.push(RawRecord::SocialPost(SocialPostRow {
                    platform: "reddit".to_string(),
                    post_id: post.id,
                    channel: subreddit.clone(),
                    title: post.title,
                    created_utc,
                    score: post.score,
                    num_comments: post.num_comments,
                    url: format!("https://www.reddit.com{}", post.permalink),
                    sentiment,
                }));
                count += 1;
            }
            debug!("Kept {count} posts from r/{subreddit}");
        }

        info!("Fetched {} social posts total", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::LexiconScorer;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector(base_url: &str, subreddits: &[&str]) -> RedditConnector {
        let config = SocialConfig {
            enabled: true,
            base_url: base_url.to_string(),
            subreddits: subreddits.iter().map(|s| s.to_string()).collect(),
        };
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            jitter: 0.0,
            rate_limit_delay: Duration::ZERO,
        };
        RedditConnector::new(&config, policy, Arc::new(LexiconScorer)).unwrap()
    }

    #[tokio::test]
    async fn test_posts_scored_and_filtered() {
        let mock_server = MockServer::start().await;
        let end = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();
        let window = FetchWindow::trailing_days(end, 7);
        let fresh = end - chrono::Duration::days(1);
        let stale = end - chrono::Duration::days(30);

        let body = format!(
            r#"{{"data": {{"children": [
                {{"data": {{"id": "abc", "title": "Bitcoin rally to record high", "selftext": "bullish", "created_utc": {}, "score": 250, "num_comments": 40, "permalink": "/r/Bitcoin/abc"}}}},
                {{"data": {{"id": "old", "title": "stale", "created_utc": {}, "permalink": "/r/Bitcoin/old"}}}}
            ]}}}}"#,
            fresh.timestamp(),
            stale.timestamp()
        );

        Mock::given(method("GET"))
            .and(path("/r/Bitcoin/top.json"))
            .and(query_param("t", "week"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let records = connector(&mock_server.uri(), &["Bitcoin"])
            .fetch(&window)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        match &records[0] {
            RawRecord::SocialPost(row) => {
                assert_eq!(row.post_id, "abc");
                assert_eq!(row.platform, "reddit");
                assert_eq!(row.channel, "Bitcoin");
                assert_eq!(row.score, 250);
                assert!(row.sentiment.compound > 0.0);
                assert_eq!(row.url, "https://www.reddit.com/r/Bitcoin/abc");
            }
            other => panic!("Unexpected record: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limited_then_recovered() {
        let mock_server = MockServer::start().await;
        let end = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();
        let window = FetchWindow::trailing_days(end, 1);

        Mock::given(method("GET"))
            .and(path("/r/Bitcoin/top.json"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/r/Bitcoin/top.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"data": {"children": []}}"#),
            )
            .mount(&mock_server)
            .await;

        let records = connector(&mock_server.uri(), &["Bitcoin"])
            .fetch(&window)
            .await
            .unwrap();
        assert!(records.is_empty());
    }
}
