//! Binance Spot REST 커넥터.
//!
//! 공개 시세 API와 HMAC 서명이 필요한 계정 API를 호출합니다.
//! 응답 헤더 `x-mbx-used-weight-1m`에서 분당 요청 가중치 사용량을 읽어
//! 요청 한도 정보로 돌려줍니다.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use sha2::Sha256;
use signal_core::{Candle, ExchangeConfig, MarketInfo, Ticker, Timeframe, TradingPair};
use tracing::{debug, info};

use crate::error::ExchangeError;
use crate::traits::{
    Balance, ExchangeClient, ExchangeResult, ProviderResponse, RateLimitSnapshot,
};

type HmacSha256 = Hmac<Sha256>;

const MAINNET_URL: &str = "https://api.binance.com";
const TESTNET_URL: &str = "https://testnet.binance.vision";
const USED_WEIGHT_HEADER: &str = "x-mbx-used-weight-1m";

// ============================================================================
// 설정
// ============================================================================

/// Binance 클라이언트 설정.
///
/// `Debug` 출력에서 API 키는 앞뒤 4자만, 시크릿은 전부 가립니다.
pub struct BinanceConfig {
    pub api_key: Option<String>,
    pub api_secret: Option<SecretString>,
    /// REST 기본 URL
    pub base_url: String,
    /// HTTP 요청 타임아웃
    pub timeout: Duration,
    /// 분당 요청 가중치 한도
    pub weight_limit: u32,
    /// 서명 요청 수신 윈도우 (밀리초)
    pub recv_window: u64,
}

impl fmt::Debug for BinanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked_key = match &self.api_key {
            Some(key) if key.len() > 8 => format!("{}...{}", &key[..4], &key[key.len() - 4..]),
            Some(_) => "***REDACTED***".to_string(),
            None => "none".to_string(),
        };

        f.debug_struct("BinanceConfig")
            .field("api_key", &masked_key)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "***REDACTED***"))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("weight_limit", &self.weight_limit)
            .finish()
    }
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            base_url: MAINNET_URL.to_string(),
            timeout: Duration::from_secs(10),
            weight_limit: 1200,
            recv_window: 5000,
        }
    }
}

impl BinanceConfig {
    pub fn with_credentials(mut self, api_key: String, api_secret: String) -> Self {
        self.api_key = Some(api_key);
        self.api_secret = Some(SecretString::new(api_secret.into()));
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 애플리케이션 거래소 설정에서 생성합니다.
    pub fn from_settings(settings: &ExchangeConfig) -> Self {
        let base_url = settings.rest_base_url.clone().unwrap_or_else(|| {
            if settings.testnet {
                TESTNET_URL.to_string()
            } else {
                MAINNET_URL.to_string()
            }
        });

        let mut config = Self {
            base_url,
            timeout: Duration::from_millis(settings.timeout_ms),
            weight_limit: settings.rate_limit_per_minute,
            ..Default::default()
        };

        if let (Some(key), Some(secret)) = (&settings.api_key, &settings.api_secret) {
            config = config.with_credentials(key.clone(), secret.clone());
        }
        config
    }
}

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceTicker {
    last_price: String,
    high_price: String,
    low_price: String,
    volume: String,
    price_change_percent: String,
    close_time: i64,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct BinanceKline(
    i64,        // 0: Open time
    String,     // 1: Open
    String,     // 2: High
    String,     // 3: Low
    String,     // 4: Close
    String,     // 5: Volume
    IgnoredAny, // 6: Close time
    IgnoredAny, // 7: Quote asset volume
    IgnoredAny, // 8: Number of trades
    IgnoredAny, // 9: Taker buy base asset volume
    IgnoredAny, // 10: Taker buy quote asset volume
    IgnoredAny, // 11: Ignore
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceExchangeInfo {
    symbols: Vec<BinanceSymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceSymbolInfo {
    status: String,
    base_asset: String,
    quote_asset: String,
}

#[derive(Debug, Deserialize)]
struct BinanceAccountInfo {
    balances: Vec<BinanceAccountBalance>,
}

#[derive(Debug, Deserialize)]
struct BinanceAccountBalance {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Debug, Deserialize)]
struct BinanceError {
    code: i32,
    msg: String,
}

// ============================================================================
// Binance 클라이언트
// ============================================================================

/// Binance REST 클라이언트.
pub struct BinanceClient {
    config: BinanceConfig,
    client: Client,
    connected: AtomicBool,
}

impl BinanceClient {
    /// 새 클라이언트를 생성합니다.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ExchangeError::Network`.
    pub fn new(config: BinanceConfig) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExchangeError::Network(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            config,
            client,
            connected: AtomicBool::new(false),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn timestamp_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// HMAC-SHA256으로 쿼리 문자열에 서명합니다.
    fn sign(&self, query: &str) -> ExchangeResult<String> {
        let secret = self
            .config
            .api_secret
            .as_ref()
            .ok_or_else(|| ExchangeError::Authentication("API secret not configured".into()))?;

        let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|e| ExchangeError::Authentication(e.to_string()))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn build_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// 공개 API 요청.
    async fn public_get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<ProviderResponse<T>> {
        let query = Self::build_query(params);
        let url = if query.is_empty() {
            format!("{}{}", self.config.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.config.base_url, endpoint, query)
        };

        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    /// 서명된 API 요청.
    async fn signed_get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<ProviderResponse<T>> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| ExchangeError::Authentication("API key not configured".into()))?;

        let mut all_params = params.to_vec();
        all_params.push(("timestamp", Self::timestamp_ms().to_string()));
        all_params.push(("recvWindow", self.config.recv_window.to_string()));

        let query = Self::build_query(&all_params);
        let signature = self.sign(&query)?;
        let url = format!(
            "{}{}?{}&signature={}",
            self.config.base_url, endpoint, query, signature
        );

        debug!("GET (signed) {}", endpoint);

        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
    ) -> ExchangeResult<ProviderResponse<T>> {
        let status = response.status();
        let rate_limit = self.rate_limit_from(&response);
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body = response.text().await?;

        if status.is_success() {
            let data = serde_json::from_str(&body)?;
            return Ok(ProviderResponse { data, rate_limit });
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
            return Err(ExchangeError::RateLimit {
                retry_after_ms: retry_after.unwrap_or(60) * 1000,
            });
        }

        match serde_json::from_str::<BinanceError>(&body) {
            Ok(error) => Err(Self::map_error_code(error.code, &error.msg)),
            Err(_) if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                Err(ExchangeError::Authentication(body))
            }
            Err(_) => Err(ExchangeError::ExternalApi {
                code: Some(status.as_u16() as i32),
                message: body,
            }),
        }
    }

    /// 사용 가중치 헤더를 한도 정보로 바꿉니다. 가중치 창은 매 분 정각에 리셋됩니다.
    fn rate_limit_from(&self, response: &Response) -> Option<RateLimitSnapshot> {
        let used: u32 = response
            .headers()
            .get(USED_WEIGHT_HEADER)?
            .to_str()
            .ok()?
            .parse()
            .ok()?;

        Some(RateLimitSnapshot {
            remaining: self.config.weight_limit.saturating_sub(used),
            limit: self.config.weight_limit,
            reset_at: next_minute(Utc::now()),
        })
    }

    /// Binance 에러 코드를 분류합니다.
    fn map_error_code(code: i32, msg: &str) -> ExchangeError {
        match code {
            -1001 => ExchangeError::Network(msg.to_string()),
            -1002 | -1022 | -2014 | -2015 => ExchangeError::Authentication(msg.to_string()),
            -1003 => ExchangeError::RateLimit {
                retry_after_ms: 60_000,
            },
            -1007 => ExchangeError::Timeout(msg.to_string()),
            _ => ExchangeError::ExternalApi {
                code: Some(code),
                message: msg.to_string(),
            },
        }
    }

    fn parse_decimal(s: &str) -> ExchangeResult<Decimal> {
        s.parse()
            .map_err(|_| ExchangeError::external(format!("invalid decimal: {}", s)))
    }

    fn millis_to_datetime(ms: i64) -> ExchangeResult<DateTime<Utc>> {
        Utc.timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| ExchangeError::external(format!("invalid timestamp: {}", ms)))
    }

    fn to_candle(kline: BinanceKline) -> ExchangeResult<Candle> {
        Ok(Candle::new(
            Self::millis_to_datetime(kline.0)?,
            Self::parse_decimal(&kline.1)?,
            Self::parse_decimal(&kline.2)?,
            Self::parse_decimal(&kline.3)?,
            Self::parse_decimal(&kline.4)?,
            Self::parse_decimal(&kline.5)?,
        ))
    }
}

fn next_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    let next = (now.timestamp() / 60 + 1) * 60;
    Utc.timestamp_opt(next, 0).single().unwrap_or(now)
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn name(&self) -> &str {
        "binance"
    }

    async fn connect(&self) -> ExchangeResult<()> {
        info!(base_url = %self.config.base_url, "Connecting to Binance");
        self.public_get::<serde_json::Value>("/api/v3/ping", &[]).await?;
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn ping(&self) -> ExchangeResult<ProviderResponse<()>> {
        let response = self
            .public_get::<serde_json::Value>("/api/v3/ping", &[])
            .await?;
        Ok(ProviderResponse {
            data: (),
            rate_limit: response.rate_limit,
        })
    }

    async fn fetch_candles(
        &self,
        pair: &TradingPair,
        timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<ProviderResponse<Vec<Candle>>> {
        let params = [
            ("symbol", pair.exchange_symbol()),
            ("interval", timeframe.as_interval().to_string()),
            ("limit", limit.min(1000).to_string()),
        ];

        let response: ProviderResponse<Vec<BinanceKline>> =
            self.public_get("/api/v3/klines", &params).await?;

        let candles = response
            .data
            .into_iter()
            .map(Self::to_candle)
            .collect::<ExchangeResult<Vec<_>>>()?;

        Ok(ProviderResponse {
            data: candles,
            rate_limit: response.rate_limit,
        })
    }

    async fn fetch_ticker(&self, pair: &TradingPair) -> ExchangeResult<ProviderResponse<Ticker>> {
        let params = [("symbol", pair.exchange_symbol())];
        let response: ProviderResponse<BinanceTicker> =
            self.public_get("/api/v3/ticker/24hr", &params).await?;

        let raw = response.data;
        let ticker = Ticker {
            pair: pair.clone(),
            last: Self::parse_decimal(&raw.last_price)?,
            high_24h: Self::parse_decimal(&raw.high_price)?,
            low_24h: Self::parse_decimal(&raw.low_price)?,
            volume_24h: Self::parse_decimal(&raw.volume)?,
            change_24h_percent: Self::parse_decimal(&raw.price_change_percent)?,
            timestamp: Self::millis_to_datetime(raw.close_time)?,
        };

        Ok(ProviderResponse {
            data: ticker,
            rate_limit: response.rate_limit,
        })
    }

    async fn fetch_markets(&self) -> ExchangeResult<ProviderResponse<Vec<MarketInfo>>> {
        let response: ProviderResponse<BinanceExchangeInfo> =
            self.public_get("/api/v3/exchangeInfo", &[]).await?;

        let markets = response
            .data
            .symbols
            .into_iter()
            .map(|s| MarketInfo {
                pair: TradingPair::new(s.base_asset, s.quote_asset),
                active: s.status == "TRADING",
            })
            .collect();

        Ok(ProviderResponse {
            data: markets,
            rate_limit: response.rate_limit,
        })
    }

    async fn fetch_balance(&self, asset: &str) -> ExchangeResult<ProviderResponse<Balance>> {
        let response: ProviderResponse<BinanceAccountInfo> =
            self.signed_get("/api/v3/account", &[]).await?;

        let asset = asset.to_uppercase();
        let balance = match response.data.balances.into_iter().find(|b| b.asset == asset) {
            Some(b) => Balance {
                asset: b.asset,
                free: Self::parse_decimal(&b.free)?,
                locked: Self::parse_decimal(&b.locked)?,
            },
            None => Balance {
                asset,
                free: Decimal::ZERO,
                locked: Decimal::ZERO,
            },
        };

        Ok(ProviderResponse {
            data: balance,
            rate_limit: response.rate_limit,
        })
    }
}
