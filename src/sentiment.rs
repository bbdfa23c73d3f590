use serde::{Deserialize, Serialize};

/// Classification thresholds on the compound score. Fixed so that bucket
/// membership is stable across re-aggregation.
pub const POSITIVE_THRESHOLD: f64 = 0.05;
pub const NEGATIVE_THRESHOLD: f64 = -0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn from_compound(compound: f64) -> Self {
        if compound >= POSITIVE_THRESHOLD {
            SentimentLabel::Positive
        } else if compound <= NEGATIVE_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    /// Overall sentiment in [-1, +1].
    pub compound: f64,
    pub label: SentimentLabel,
}

/// Black-box text scorer invoked by sentiment connectors after fetch. The
/// model behind it is an external collaborator; this crate only depends on
/// the `text -> {score, label}` contract.
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> SentimentScore;
}

const POSITIVE_WORDS: &[&str] = &[
    "bull", "bullish", "rally", "surge", "gain", "gains", "high", "soar", "pump", "moon",
    "adoption", "breakout", "profit", "win", "record", "growth", "up",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bear", "bearish", "crash", "dump", "loss", "losses", "low", "plunge", "fear", "scam",
    "hack", "fraud", "sell-off", "selloff", "drop", "down", "liquidation",
];

/// Word-list scorer used when no external model is wired in. Deliberately
/// small; real deployments swap in a model-backed implementation.
#[derive(Debug, Default)]
pub struct LexiconScorer;

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> SentimentScore {
        let mut positive = 0usize;
        let mut negative = 0usize;
        let mut tokens = 0usize;

        for token in text.split_whitespace() {
            tokens += 1;
            let word: String = token
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '-')
                .collect::<String>()
                .to_lowercase();
            if POSITIVE_WORDS.contains(&word.as_str()) {
                positive += 1;
            } else if NEGATIVE_WORDS.contains(&word.as_str()) {
                negative += 1;
            }
        }

        let compound = if tokens == 0 {
            0.0
        } else {
            // Hits relative to a short attention span, clamped to [-1, 1].
            let span = (tokens as f64).min(20.0);
            ((positive as f64 - negative as f64) / span).clamp(-1.0, 1.0)
        };

        SentimentScore {
            compound,
            label: SentimentLabel::from_compound(compound),
        }
    }
}
