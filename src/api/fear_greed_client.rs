use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::models::Config;

/// The endpoint rejects non-browser user agents
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36";

/// One historical reading: `x` epoch milliseconds, `y` index value
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct FearGreedPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Deserialize)]
struct GraphData {
    #[serde(default)]
    fear_and_greed_historical: Option<Historical>,
}

#[derive(Debug, Deserialize)]
struct Historical {
    #[serde(default)]
    data: Vec<FearGreedPoint>,
}

/// Extract the historical series from a graphdata payload
pub fn parse_payload(body: &str) -> Result<Vec<FearGreedPoint>> {
    let payload: GraphData =
        serde_json::from_str(body).context("Fear & Greed payload is not valid JSON")?;
    let points = payload
        .fear_and_greed_historical
        .map(|h| h.data)
        .unwrap_or_default();
    if points.is_empty() {
        return Err(anyhow!("No historical data found in the response"));
    }
    Ok(points)
}

/// Client for the CNN Fear & Greed graphdata endpoint
pub struct FearGreedClient {
    client: Client,
    url: Url,
}

impl FearGreedClient {
    pub fn new(config: &Config) -> Result<Self> {
        let url = Url::parse(&config.fear_greed_url)
            .with_context(|| format!("Invalid Fear & Greed URL: {}", config.fear_greed_url))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, url })
    }

    /// Fetch the full history
    pub async fn fetch_history(&self) -> Result<Vec<FearGreedPoint>> {
        debug!("GET {}", self.url);
        let response = self.client.get(self.url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Failed to fetch Fear & Greed data: {}", status));
        }

        let body = response.text().await?;
        let points = parse_payload(&body)?;
        info!("📈 Fetched {} Fear & Greed readings", points.len());
        Ok(points)
    }
}
