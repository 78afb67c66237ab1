use chrono::{Duration as ChronoDuration, NaiveDate};
use rand::prelude::IndexedRandom;
use reqwest::{Client, Error as ReqwestError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration as StdDuration, SystemTime};
use tokio::time::sleep;

#[derive(Debug)]
pub enum MarketError {
    Http(ReqwestError),
    Serialization(serde_json::Error),
    InvalidResponse(String),
    InvalidSymbol(String),
    NoData,
}

impl From<ReqwestError> for MarketError {
    fn from(error: ReqwestError) -> Self {
        MarketError::Http(error)
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(error: serde_json::Error) -> Self {
        MarketError::Serialization(error)
    }
}

impl std::fmt::Display for MarketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketError::Http(e) => write!(f, "provider request failed: {e}"),
            MarketError::Serialization(e) => write!(f, "provider response unreadable: {e}"),
            MarketError::InvalidResponse(msg) => write!(f, "unexpected provider response: {msg}"),
            MarketError::InvalidSymbol(symbol) => write!(f, "unsupported symbol '{symbol}'"),
            MarketError::NoData => write!(f, "provider returned no data for the symbol"),
        }
    }
}

impl std::error::Error for MarketError {}

/// One daily-interval historical record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

pub struct MarketClient {
    client: Client,
    base_url: String,
    rate_limit_per_minute: u32,
    request_timestamps: Vec<SystemTime>,
    user_agents: Vec<String>,
    random_agent: bool,
}

impl MarketClient {
    pub fn new(base_url: String, random_agent: bool, rate_limit_per_minute: u32) -> Result<Self, MarketError> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(30))
            .build()?;

        let user_agents = vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0".to_string(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.3 Safari/605.1.15".to_string(),
        ];

        Ok(MarketClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limit_per_minute,
            request_timestamps: Vec::new(),
            user_agents,
            random_agent,
        })
    }

    fn get_user_agent(&self) -> String {
        if self.random_agent {
            self.user_agents
                .choose(&mut rand::rng())
                .unwrap_or(&self.user_agents[0])
                .clone()
        } else {
            self.user_agents[0].clone()
        }
    }

    async fn enforce_rate_limit(&mut self) {
        let current_time = SystemTime::now();

        // Drop timestamps older than the one-minute window
        self.request_timestamps.retain(|&timestamp| {
            current_time
                .duration_since(timestamp)
                .unwrap_or(StdDuration::from_secs(0))
                < StdDuration::from_secs(60)
        });

        if self.request_timestamps.len() >= self.rate_limit_per_minute as usize {
            if let Some(&oldest_request) = self.request_timestamps.first() {
                let wait_time = StdDuration::from_secs(60)
                    - current_time
                        .duration_since(oldest_request)
                        .unwrap_or(StdDuration::from_secs(0));
                if !wait_time.is_zero() {
                    sleep(wait_time + StdDuration::from_millis(100)).await;
                }
            }
        }

        self.request_timestamps.push(current_time);
    }

    async fn get_json(&mut self, url: &str) -> Result<Value, MarketError> {
        const MAX_RETRIES: u32 = 4;

        for attempt in 0..MAX_RETRIES {
            self.enforce_rate_limit().await;

            if attempt > 0 {
                let delay =
                    StdDuration::from_secs_f64(2.0_f64.powi(attempt as i32 - 1) + rand::random::<f64>());
                let delay = delay.min(StdDuration::from_secs(30));
                sleep(delay).await;
            }

            let response = self
                .client
                .get(url)
                .header("Accept", "application/json, text/plain, */*")
                .header("Accept-Language", "en-US,en;q=0.9")
                .header("User-Agent", self.get_user_agent())
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        match resp.json::<Value>().await {
                            Ok(data) => return Ok(data),
                            Err(_) => continue,
                        }
                    } else if status == 403 || status == 429 || status.is_server_error() {
                        continue;
                    } else if status.is_client_error() {
                        // Non-retryable rejection. The provider reports an
                        // unknown symbol as a 404 whose body still carries a
                        // chart/quoteSummary error payload.
                        let body = resp.json::<Value>().await.ok();
                        if status == reqwest::StatusCode::NOT_FOUND
                            || body.as_ref().is_some_and(has_provider_error)
                        {
                            return Err(MarketError::NoData);
                        }
                        return Err(MarketError::InvalidResponse(format!(
                            "provider rejected request with status {status}"
                        )));
                    } else {
                        continue;
                    }
                }
                Err(_) => continue,
            }
        }

        Err(MarketError::InvalidResponse(format!(
            "max retries exceeded after {MAX_RETRIES} attempts"
        )))
    }

    /// Fetch daily-interval history for a symbol over an inclusive date range.
    pub async fn history(
        &mut self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, MarketError> {
        // period2 is exclusive at second granularity, so include the end day
        // by pushing it one day forward
        let period1 = start
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| MarketError::InvalidResponse("invalid start date".to_string()))?
            .and_utc()
            .timestamp();
        let period2 = (end + ChronoDuration::days(1))
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| MarketError::InvalidResponse("invalid end date".to_string()))?
            .and_utc()
            .timestamp();

        let symbol = sanitize_symbol(symbol)?;
        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=history",
            self.base_url, symbol, period1, period2
        );

        let response_data = self.get_json(&url).await?;
        let mut bars = parse_chart_response(&response_data)?;
        bars.retain(|bar| bar.date >= start && bar.date <= end);
        if bars.is_empty() {
            return Err(MarketError::NoData);
        }
        Ok(bars)
    }

    /// Fetch the issuer metadata dictionary, returned verbatim to the caller.
    pub async fn profile(&mut self, symbol: &str) -> Result<Map<String, Value>, MarketError> {
        let symbol = sanitize_symbol(symbol)?;
        let url = format!(
            "{}/v10/finance/quoteSummary/{}?modules=assetProfile,price",
            self.base_url, symbol
        );

        let response_data = self.get_json(&url).await?;
        parse_profile_response(&response_data)
    }
}

/// Uppercase the symbol and refuse anything that could splice the request
/// path. Tickers are alphanumeric plus the '.', '-', '^' and '=' forms the
/// provider uses for share classes, indices and currency pairs.
pub(crate) fn sanitize_symbol(symbol: &str) -> Result<String, MarketError> {
    let symbol = symbol.trim().to_uppercase();
    let valid = !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    if !valid {
        return Err(MarketError::InvalidSymbol(symbol));
    }
    Ok(symbol)
}

/// True when a provider body carries a populated `chart.error` or
/// `quoteSummary.error` payload.
fn has_provider_error(body: &Value) -> bool {
    ["chart", "quoteSummary"].iter().any(|root| {
        body.get(root)
            .and_then(|v| v.get("error"))
            .is_some_and(|error| !error.is_null())
    })
}

/// Decode the provider's columnar chart payload: a `timestamp` array plus
/// parallel open/high/low/close/volume arrays under `indicators.quote[0]`.
/// Entries with a null close (halted or padded days) are skipped.
pub(crate) fn parse_chart_response(response: &Value) -> Result<Vec<DailyBar>, MarketError> {
    let chart = response
        .get("chart")
        .ok_or_else(|| MarketError::InvalidResponse("missing 'chart' object".to_string()))?;

    if let Some(error) = chart.get("error") {
        if !error.is_null() {
            let description = error
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown provider error");
            return Err(MarketError::InvalidResponse(description.to_string()));
        }
    }

    let result = chart
        .get("result")
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .ok_or(MarketError::NoData)?;

    let timestamps = result
        .get("timestamp")
        .and_then(|v| v.as_array())
        .ok_or(MarketError::NoData)?;

    let quote = result
        .get("indicators")
        .and_then(|v| v.get("quote"))
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| MarketError::InvalidResponse("missing quote indicators".to_string()))?;

    let series = |key: &str| -> Result<&Vec<Value>, MarketError> {
        quote
            .get(key)
            .and_then(|v| v.as_array())
            .ok_or_else(|| MarketError::InvalidResponse(format!("missing series '{key}'")))
    };

    let opens = series("open")?;
    let highs = series("high")?;
    let lows = series("low")?;
    let closes = series("close")?;
    let volumes = series("volume")?;

    let length = timestamps.len();
    if [opens.len(), highs.len(), lows.len(), closes.len(), volumes.len()]
        .iter()
        .any(|&len| len != length)
    {
        return Err(MarketError::InvalidResponse(
            "inconsistent series lengths".to_string(),
        ));
    }

    let mut bars = Vec::new();
    for i in 0..length {
        let Some(close) = closes[i].as_f64() else {
            continue;
        };

        let timestamp = timestamps[i].as_i64().ok_or_else(|| {
            MarketError::InvalidResponse(format!("invalid timestamp at index {i}"))
        })?;
        let date = chrono::DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(|| {
                MarketError::InvalidResponse(format!("timestamp {timestamp} out of range"))
            })?
            .date_naive();

        bars.push(DailyBar {
            date,
            open: opens[i].as_f64().unwrap_or(close),
            high: highs[i].as_f64().unwrap_or(close),
            low: lows[i].as_f64().unwrap_or(close),
            close,
            volume: volumes[i].as_u64().unwrap_or(0),
        });
    }

    bars.sort_by_key(|bar| bar.date);
    Ok(bars)
}

pub(crate) fn parse_profile_response(response: &Value) -> Result<Map<String, Value>, MarketError> {
    let summary = response
        .get("quoteSummary")
        .ok_or_else(|| MarketError::InvalidResponse("missing 'quoteSummary' object".to_string()))?;

    if let Some(error) = summary.get("error") {
        if !error.is_null() {
            let description = error
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown provider error");
            return Err(MarketError::InvalidResponse(description.to_string()));
        }
    }

    summary
        .get("result")
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .and_then(|v| v.as_object())
        .cloned()
        .ok_or(MarketError::NoData)
}
