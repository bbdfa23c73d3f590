pub mod binance_futures;
pub mod coingecko;
pub mod etf_flows;
pub mod fear_greed;
pub mod market_metrics;
pub mod reddit;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::SourceError;

pub(crate) const USER_AGENT: &str = "marketintel/0.1";

/// Sends a request and decodes the JSON body, classifying every failure for
/// the retry policy: network faults, timeouts, 429 and 5xx are transient;
/// other 4xx and undecodable payloads are fatal. Connectors build the
/// request, this seam decides what is worth retrying.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| SourceError::Transient(format!("request error: {e}")))?;

    let status = response.status();
    let url = response.url().clone();
    debug!(%status, %url, "Received source response");

    if !status.is_success() {
        let msg = format!("HTTP {status} for {url}");
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(SourceError::Transient(msg));
        }
        return Err(SourceError::Fatal(msg));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| SourceError::Fatal(format!("undecodable payload from {url}: {e}")))
}

pub(crate) fn build_client() -> Result<reqwest::Client, anyhow::Error> {
    Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
}
