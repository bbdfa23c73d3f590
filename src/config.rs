use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

/// Retry and rate-limit parameters shared by all connectors.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.25
}
fn default_rate_limit_delay_ms() -> u64 {
    1500
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
        }
    }
}

/// Per-source historical horizons used by backfill mode. Flow data keeps a
/// deeper history than social data, so each source gets its own horizon.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackfillConfig {
    #[serde(default = "default_prices_days")]
    pub prices_days: u32,
    #[serde(default = "default_fear_greed_days")]
    pub fear_greed_days: u32,
    #[serde(default = "default_etf_flows_days")]
    pub etf_flows_days: u32,
    #[serde(default = "default_social_days")]
    pub social_days: u32,
}

fn default_prices_days() -> u32 {
    90
}
fn default_fear_greed_days() -> u32 {
    365
}
fn default_etf_flows_days() -> u32 {
    300
}
fn default_social_days() -> u32 {
    7
}

impl Default for BackfillConfig {
    fn default() -> Self {
        BackfillConfig {
            prices_days: default_prices_days(),
            fear_greed_days: default_fear_greed_days(),
            etf_flows_days: default_etf_flows_days(),
            social_days: default_social_days(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_coingecko_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FearGreedConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_fear_greed_url")]
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EtfFlowsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_etf_flows_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Market-wide metrics share CoinGecko's endpoint family but are toggled
/// independently of the price connector.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MarketMetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_coingecko_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DerivativesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_derivatives_url")]
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SocialConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_social_url")]
    pub base_url: String,
    #[serde(default = "default_subreddits")]
    pub subreddits: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}
fn default_fear_greed_url() -> String {
    "https://api.alternative.me".to_string()
}
fn default_etf_flows_url() -> String {
    "https://api.sosovalue.com".to_string()
}
fn default_derivatives_url() -> String {
    "https://fapi.binance.com".to_string()
}
fn default_social_url() -> String {
    "https://www.reddit.com".to_string()
}
fn default_subreddits() -> Vec<String> {
    vec![
        "CryptoCurrency".to_string(),
        "Bitcoin".to_string(),
        "ethereum".to_string(),
    ]
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        CoinGeckoConfig {
            enabled: true,
            base_url: default_coingecko_url(),
            api_key: None,
        }
    }
}

impl Default for FearGreedConfig {
    fn default() -> Self {
        FearGreedConfig {
            enabled: true,
            base_url: default_fear_greed_url(),
        }
    }
}

impl Default for EtfFlowsConfig {
    fn default() -> Self {
        EtfFlowsConfig {
            enabled: true,
            base_url: default_etf_flows_url(),
            api_key: None,
        }
    }
}

impl Default for MarketMetricsConfig {
    fn default() -> Self {
        MarketMetricsConfig {
            enabled: true,
            base_url: default_coingecko_url(),
            api_key: None,
        }
    }
}

impl Default for DerivativesConfig {
    fn default() -> Self {
        DerivativesConfig {
            enabled: true,
            base_url: default_derivatives_url(),
        }
    }
}

impl Default for SocialConfig {
    fn default() -> Self {
        SocialConfig {
            enabled: false,
            base_url: default_social_url(),
            subreddits: default_subreddits(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub coingecko: CoinGeckoConfig,
    #[serde(default)]
    pub fear_greed: FearGreedConfig,
    #[serde(default)]
    pub etf_flows: EtfFlowsConfig,
    #[serde(default)]
    pub market_metrics: MarketMetricsConfig,
    #[serde(default)]
    pub derivatives: DerivativesConfig,
    #[serde(default)]
    pub social: SocialConfig,
}

/// Immutable application configuration, constructed once at startup and
/// passed explicitly into the pipeline and each connector.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Directory holding the backing keyspace. Defaults to the platform data
    /// directory when unset.
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// CoinGecko asset identifiers to track (stored upper-cased).
    #[serde(default = "default_tracked_assets")]
    pub tracked_assets: Vec<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Trailing window requested by daily-sync mode.
    #[serde(default = "default_daily_lookback_days")]
    pub daily_lookback_days: u32,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    /// Recognized for the external CSV backup sink; the sink itself lives
    /// outside this crate.
    #[serde(default)]
    pub enable_backup: bool,
}

fn default_tracked_assets() -> Vec<String> {
    vec!["bitcoin".to_string(), "ethereum".to_string()]
}
fn default_daily_lookback_days() -> u32 {
    7
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database: None,
            tracked_assets: default_tracked_assets(),
            retry: RetryConfig::default(),
            daily_lookback_days: default_daily_lookback_days(),
            backfill: BackfillConfig::default(),
            sources: SourcesConfig::default(),
            enable_backup: false,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "marketintel", "marketintel")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "marketintel", "marketintel")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Directory holding the backing keyspace.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::default_data_path()?.join("market_intel")),
        }
    }
}
