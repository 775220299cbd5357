use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::core::cache::KeyValueCollection;
use crate::core::{PriceHistory, PriceProvider, PriceSeries};
use crate::providers::util::{seconds_until, with_retry};
use crate::store::KeyValueStore;

const USER_AGENT: &str = "pfsim/0.1";
const REFRESH_HOUR_UTC: u32 = 22;
const SYMBOL_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// `true` for twelve-character ISO 6166 codes such as `IE00B5BMR087`.
pub fn looks_like_isin(identifier: &str) -> bool {
    let bytes = identifier.as_bytes();
    bytes.len() == 12
        && bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..11].iter().all(u8::is_ascii_alphanumeric)
        && bytes[11].is_ascii_digit()
}

fn to_unix(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

pub struct YahooFinanceProvider {
    base_url: String,
    prices: Arc<dyn KeyValueCollection>,
    symbols: Arc<dyn KeyValueCollection>,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str, store: &KeyValueStore) -> Self {
        Self::with_collections(base_url, store.collection("yahoo_prices"), store.collection("yahoo_symbols"))
    }

    pub fn with_collections(
        base_url: &str,
        prices: Arc<dyn KeyValueCollection>,
        symbols: Arc<dyn KeyValueCollection>,
    ) -> Self {
        YahooFinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            prices,
            symbols,
        }
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let response = with_retry(
            || async { client.get(url).send().await?.error_for_status() },
            3,
            500,
        )
        .await
        .with_context(|| format!("Request failed: {url}"))?;

        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body: {url}"))?;
        if text.trim().is_empty() {
            return Err(anyhow!("Received empty response from {}", url));
        }
        Ok(text)
    }

    /// Maps an ISIN to the first ticker Yahoo's search returns for it. Any
    /// other identifier is used as is.
    #[instrument(name = "YahooSymbolSearch", skip(self))]
    pub async fn resolve_symbol(&self, identifier: &str) -> Result<String> {
        if !looks_like_isin(identifier) {
            return Ok(identifier.to_string());
        }
        if let Some(cached) = self.symbols.get(identifier.as_bytes()).await {
            return Ok(String::from_utf8_lossy(&cached).into_owned());
        }

        let url = format!(
            "{}/v1/finance/search?q={}&quotesCount=5&newsCount=0",
            self.base_url, identifier
        );
        debug!("Resolving ISIN via {}", url);
        let text = self.get_text(&url).await?;
        let response: YahooSearchResponse = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse search response for {identifier}"))?;
        let symbol = response
            .quotes
            .into_iter()
            .find_map(|quote| quote.symbol)
            .ok_or_else(|| anyhow!("No ticker found for ISIN: {}", identifier))?;

        debug!("Resolved {} to {}", identifier, symbol);
        self.symbols
            .put(identifier.as_bytes(), symbol.as_bytes(), Some(SYMBOL_TTL))
            .await;
        Ok(symbol)
    }
}

#[derive(Deserialize, Debug)]
struct YahooSearchResponse {
    #[serde(default)]
    quotes: Vec<SearchQuote>,
}

#[derive(Deserialize, Debug)]
struct SearchQuote {
    symbol: Option<String>,
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    currency: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

/// Daily closes of one chart item. Bars without a close are skipped and
/// timestamps are shifted into the exchange's own time zone before taking
/// the date.
fn extract_closes(item: &ChartItem) -> Vec<(NaiveDate, f64)> {
    let (Some(timestamps), Some(closes)) = (
        item.timestamp.as_ref(),
        item.indicators
            .as_ref()
            .and_then(|inds| inds.quote.first())
            .and_then(|q| q.close.as_ref()),
    ) else {
        return Vec::new();
    };

    timestamps
        .iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            let close = (*close)?;
            let date = Utc
                .timestamp_opt(ts + item.meta.gmtoffset, 0)
                .single()?
                .date_naive();
            Some((date, close))
        })
        .collect()
}

#[async_trait]
impl PriceProvider for YahooFinanceProvider {
    #[instrument(
        name = "YahooHistoryFetch",
        skip(self),
        fields(identifier = %identifier)
    )]
    async fn fetch_history(
        &self,
        identifier: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceHistory> {
        let cache_key = format!("{identifier}:{start}:{end}");
        if let Some(cached) = self.prices.get(cache_key.as_bytes()).await {
            match serde_json::from_slice(&cached) {
                Ok(history) => return Ok(history),
                Err(e) => warn!("Discarding unreadable cache entry {}: {}", cache_key, e),
            }
        }

        let symbol = self.resolve_symbol(identifier).await?;
        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=history",
            self.base_url,
            symbol,
            to_unix(start),
            to_unix(end) + 24 * 60 * 60
        );
        debug!("Requesting price history from {}", url);

        let text = self.get_text(&url).await?;
        let data: YahooChartResponse = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse chart response for symbol: {symbol}"))?;

        if let Some(error) = data.chart.error {
            return Err(anyhow!(
                "Yahoo error for symbol {}: {} {}",
                symbol,
                error.code.unwrap_or_default(),
                error.description.unwrap_or_default()
            ));
        }
        let item = data
            .chart
            .result
            .and_then(|items| items.into_iter().next())
            .ok_or_else(|| anyhow!("No price history found for symbol: {}", symbol))?;

        let series = PriceSeries::new(extract_closes(&item)).between(start, end);
        debug!("Fetched {} closes for {}", series.len(), symbol);

        let history = PriceHistory {
            symbol,
            name: item.meta.long_name.or(item.meta.short_name),
            currency: item.meta.currency,
            series,
        };

        let ttl_seconds = match seconds_until(REFRESH_HOUR_UTC, 0) {
            Ok(ttl) => ttl,
            Err(e) => {
                warn!("Failed calculating cache refresh TTL: {}. Using fallback 1 day", e);
                24 * 60 * 60
            }
        };
        match serde_json::to_vec(&history) {
            Ok(bytes) => {
                self.prices
                    .put(cache_key.as_bytes(), &bytes, Some(Duration::from_secs(ttl_seconds)))
                    .await
            }
            Err(e) => warn!("Not caching {}: {}", cache_key, e),
        }

        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCollection;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn provider(server: &MockServer) -> YahooFinanceProvider {
        YahooFinanceProvider::with_collections(
            &server.uri(),
            Arc::new(MemoryCollection::new()),
            Arc::new(MemoryCollection::new()),
        )
    }

    fn chart_body(dates: &[NaiveDate], closes: &[Option<f64>]) -> String {
        let timestamps: Vec<i64> = dates.iter().map(|d| to_unix(*d) + 14 * 3600).collect();
        serde_json::json!({
            "chart": {
                "result": [{
                    "meta": {
                        "currency": "USD",
                        "symbol": "AAPL",
                        "longName": "Apple Inc.",
                        "shortName": "Apple",
                        "gmtoffset": -14400
                    },
                    "timestamp": timestamps,
                    "indicators": { "quote": [{ "close": closes }] }
                }],
                "error": null
            }
        })
        .to_string()
    }

    async fn mount_chart(server: &MockServer, symbol: &str, body: String, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/v8/finance/chart/{symbol}")))
            .and(query_param("interval", "1d"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[test]
    fn test_isin_detection() {
        assert!(looks_like_isin("IE00B5BMR087"));
        assert!(looks_like_isin("US0378331005"));
        assert!(!looks_like_isin("AAPL"));
        assert!(!looks_like_isin("ie00b5bmr087"));
        assert!(!looks_like_isin("IE00B5BMR08X"));
    }

    #[tokio::test]
    async fn test_history_fetch_skips_null_closes() {
        let server = MockServer::start().await;
        let dates = [date(2024, 1, 2), date(2024, 1, 3), date(2024, 1, 4)];
        mount_chart(
            &server,
            "AAPL",
            chart_body(&dates, &[Some(185.5), None, Some(181.9)]),
            1,
        )
        .await;

        let history = provider(&server)
            .fetch_history("AAPL", date(2024, 1, 1), date(2024, 1, 31))
            .await
            .unwrap();
        assert_eq!(history.symbol, "AAPL");
        assert_eq!(history.name.as_deref(), Some("Apple Inc."));
        assert_eq!(history.currency.as_deref(), Some("USD"));
        assert_eq!(
            history.series.points(),
            &[(date(2024, 1, 2), 185.5), (date(2024, 1, 4), 181.9)]
        );
    }

    #[tokio::test]
    async fn test_history_is_served_from_cache() {
        let server = MockServer::start().await;
        mount_chart(&server, "MSFT", chart_body(&[date(2024, 3, 1)], &[Some(410.0)]), 1).await;

        let provider = provider(&server);
        let first = provider
            .fetch_history("MSFT", date(2024, 3, 1), date(2024, 3, 2))
            .await
            .unwrap();
        let second = provider
            .fetch_history("MSFT", date(2024, 3, 1), date(2024, 3, 2))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_isin_is_resolved_before_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/finance/search"))
            .and(query_param("q", "IE00B4L5Y983"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"quotes": [{"symbol": "IWDA.AS", "quoteType": "ETF"}, {"symbol": "SWDA.L"}]}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        mount_chart(&server, "IWDA.AS", chart_body(&[date(2024, 5, 2)], &[Some(92.1)]), 1).await;

        let provider = provider(&server);
        let history = provider
            .fetch_history("IE00B4L5Y983", date(2024, 5, 1), date(2024, 5, 3))
            .await
            .unwrap();
        assert_eq!(history.symbol, "IWDA.AS");
        assert_eq!(history.series.len(), 1);
        assert_eq!(provider.resolve_symbol("IE00B4L5Y983").await.unwrap(), "IWDA.AS");
    }

    #[tokio::test]
    async fn test_unknown_isin_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/finance/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"quotes": []}"#))
            .mount(&server)
            .await;

        let result = provider(&server)
            .fetch_history("DE000XXXXXX0", date(2024, 5, 1), date(2024, 5, 3))
            .await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "No ticker found for ISIN: DE000XXXXXX0"
        );
    }

    #[tokio::test]
    async fn test_chart_error_is_reported() {
        let server = MockServer::start().await;
        let body = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        mount_chart(&server, "GONE", body.to_string(), 1).await;

        let err = provider(&server)
            .fetch_history("GONE", date(2024, 1, 1), date(2024, 2, 1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("symbol may be delisted"));
    }

    #[tokio::test]
    async fn test_empty_result_is_an_error() {
        let server = MockServer::start().await;
        mount_chart(&server, "NONE", r#"{"chart": {"result": []}}"#.to_string(), 1).await;

        let err = provider(&server)
            .fetch_history("NONE", date(2024, 1, 1), date(2024, 2, 1))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No price history found for symbol: NONE");
    }

    #[tokio::test]
    async fn test_server_error_is_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/FAIL"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4)
            .mount(&server)
            .await;

        let err = provider(&server)
            .fetch_history("FAIL", date(2024, 1, 1), date(2024, 2, 1))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Request failed"));
    }
}
