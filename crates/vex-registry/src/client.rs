//! REST client for the ticker list and historical candles.
//!
//! All requests share one connection pool, a fixed timeout and a
//! counting limiter that caps in-flight requests to the exchange host.

use crate::error::{RegistryError, RegistryResult};
use crate::universe::Ticker;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;
use vex_core::CandleBar;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL, e.g. "https://www.okx.com/api/v5".
    pub base_url: String,
    pub timeout: Duration,
    /// Maximum concurrent requests to the host.
    pub max_per_host: usize,
    /// Extra header sent with every request.
    pub extra_header: Option<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.okx.com/api/v5".to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_per_host: 40,
            extra_header: None,
        }
    }
}

/// Standard response envelope: `{"code":"0","msg":"","data":...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: Option<String>,
    msg: Option<String>,
    data: Option<T>,
}

/// Rate-limited REST client.
#[derive(Clone)]
pub struct MarketClient {
    client: Client,
    base_url: String,
    limiter: Arc<Semaphore>,
}

impl MarketClient {
    pub fn new(config: &ClientConfig) -> RegistryResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some((name, value)) = &config.extra_header {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RegistryError::HttpClient(format!("Invalid header name: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| RegistryError::HttpClient(format!("Invalid header value: {e}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .pool_max_idle_per_host(config.max_per_host)
            .default_headers(headers)
            .build()
            .map_err(|e| RegistryError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter: Arc::new(Semaphore::new(config.max_per_host.max(1))),
        })
    }

    /// Requests currently allowed to start without waiting.
    pub fn available_permits(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Fetch the ticker list for an instrument type.
    ///
    /// A missing or null `data` field is an error. Entries that cannot be
    /// read are skipped.
    pub async fn fetch_tickers(&self, inst_type: &str) -> RegistryResult<Vec<Ticker>> {
        let envelope: Envelope<Vec<Value>> = self
            .get("/market/tickers", &[("instType", inst_type)])
            .await?;
        let raw = envelope.data.ok_or(RegistryError::MissingData("tickers"))?;

        let total = raw.len();
        let tickers: Vec<Ticker> = raw
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<Ticker>(v) {
                Ok(t) => Some(t),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable ticker");
                    None
                }
            })
            .collect();

        debug!(total, parsed = tickers.len(), "Fetched tickers");
        Ok(tickers)
    }

    /// Fetch recent bars for one instrument, newest first.
    ///
    /// Returns `Ok(None)` when the exchange has no data for the instrument.
    pub async fn fetch_candles(
        &self,
        inst_id: &str,
        bar: &str,
        limit: u32,
    ) -> RegistryResult<Option<Vec<CandleBar>>> {
        let limit = limit.to_string();
        let envelope: Envelope<Vec<Vec<Value>>> = self
            .get(
                "/market/candles",
                &[("instId", inst_id), ("bar", bar), ("limit", limit.as_str())],
            )
            .await?;

        let Some(rows) = envelope.data.filter(|rows| !rows.is_empty()) else {
            return Ok(None);
        };

        let (bars, skipped) = CandleBar::parse_rows(&rows);
        if skipped > 0 {
            debug!(symbol = inst_id, skipped, "Skipped malformed candle rows");
        }
        if bars.is_empty() {
            return Ok(None);
        }
        Ok(Some(bars))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> RegistryResult<Envelope<T>> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| RegistryError::LimiterClosed)?;

        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&body)?;
        if let Some(code) = envelope.code.as_deref().filter(|c| *c != "0") {
            return Err(RegistryError::Api {
                code: code.to_string(),
                msg: envelope.msg.clone().unwrap_or_default(),
            });
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP/1.1 responder. `route` maps the request target to
    /// (status, body).
    async fn serve<F>(route: F) -> (String, Arc<AtomicUsize>)
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let route = Arc::new(route);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let route = route.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let mut read = 0;
                    loop {
                        let n = stream.read(&mut buf[read..]).await.unwrap_or(0);
                        if n == 0 {
                            return;
                        }
                        read += n;
                        if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                    let head = String::from_utf8_lossy(&buf[..read]).to_string();
                    let target = head.split_whitespace().nth(1).unwrap_or("").to_string();
                    let (status, body) = (*route)(&target);
                    let response = format!(
                        "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        (format!("http://{addr}"), hits)
    }

    fn client(base_url: String) -> MarketClient {
        MarketClient::new(&ClientConfig {
            base_url,
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_tickers_skips_bad_entries() {
        let (url, _) = serve(|target| {
            assert!(target.starts_with("/market/tickers?instType=SWAP"));
            (
                200,
                r#"{"code":"0","msg":"","data":[
                    {"instId":"BTC-USDT-SWAP","last":"101","open24h":"100","volCcy24h":"5"},
                    {"instId":"BAD-USDT-SWAP","last":"","open24h":"1","volCcy24h":"1"}
                ]}"#
                .to_string(),
            )
        })
        .await;

        let tickers = client(url).fetch_tickers("SWAP").await.unwrap();
        assert_eq!(tickers.len(), 1);
        assert_eq!(tickers[0].inst_id, "BTC-USDT-SWAP");
        assert_eq!(tickers[0].last, dec!(101));
    }

    #[tokio::test]
    async fn test_fetch_tickers_null_data_is_error() {
        let (url, _) = serve(|_| (200, r#"{"code":"0","msg":"","data":null}"#.to_string())).await;
        let err = client(url).fetch_tickers("SWAP").await.unwrap_err();
        assert!(matches!(err, RegistryError::MissingData("tickers")));
    }

    #[tokio::test]
    async fn test_fetch_candles() {
        let (url, _) = serve(|target| {
            assert!(target.contains("instId=ETH-USDT-SWAP"));
            assert!(target.contains("bar=1H"));
            assert!(target.contains("limit=30"));
            (
                200,
                r#"{"code":"0","msg":"","data":[
                    ["1700003600000","2","3","1","2.5","10","0","0","1"],
                    ["1700000000000","1","2","0.5","2","10","0","0","1"],
                    ["oops"]
                ]}"#
                .to_string(),
            )
        })
        .await;

        let bars = client(url)
            .fetch_candles("ETH-USDT-SWAP", "1H", 30)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].ts, 1_700_003_600_000);
        assert_eq!(bars[1].range(), dec!(1.5));
    }

    #[tokio::test]
    async fn test_fetch_candles_empty_is_none() {
        let (url, _) = serve(|_| (200, r#"{"code":"0","msg":"","data":[]}"#.to_string())).await;
        assert!(client(url.clone())
            .fetch_candles("X", "1H", 30)
            .await
            .unwrap()
            .is_none());

        let (url, _) = serve(|_| (200, r#"{"code":"0","msg":""}"#.to_string())).await;
        assert!(client(url)
            .fetch_candles("X", "1H", 30)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_classified() {
        let (url, _) = serve(|_| (429, r#"{"msg":"Too Many Requests"}"#.to_string())).await;
        let err = client(url)
            .fetch_candles("X", "1H", 30)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::FetchErrorKind::RateLimited);

        let (url, _) = serve(|_| {
            (
                200,
                r#"{"code":"50011","msg":"Too Many Requests","data":[]}"#.to_string(),
            )
        })
        .await;
        let err = client(url)
            .fetch_candles("X", "1H", 30)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Api { .. }));
        assert_eq!(err.kind(), crate::FetchErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn test_timeout_classified() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and never answer
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client = MarketClient::new(&ClientConfig {
            base_url: format!("http://{addr}"),
            timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();
        let err = client.fetch_candles("X", "1H", 30).await.unwrap_err();
        assert_eq!(err.kind(), crate::FetchErrorKind::Timeout);
    }

    #[test]
    fn test_invalid_header_rejected() {
        let result = MarketClient::new(&ClientConfig {
            extra_header: Some(("bad header".to_string(), "v".to_string())),
            ..Default::default()
        });
        assert!(matches!(result, Err(RegistryError::HttpClient(_))));
    }
}
