//! 거래소 접근 어댑터.
//!
//! 파이프라인이 거래소에 닿는 유일한 경로입니다. 모든 호출은 다음 순서를 거칩니다:
//!
//! 1. 요청 한도 예산으로 권장 대기 시간 계산 (예산 소진 시 즉시 `RateLimit`)
//! 2. 권장 시간만큼 대기 (리셋 시각을 넘지 않음)
//! 3. 설정된 타임아웃 안에서 클라이언트 호출
//! 4. 결과로 헬스 상태 갱신

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use signal_core::{
    Candle, Clock, ExchangeConfig, MarketInfo, SystemClock, Ticker, Timeframe, TradingPair,
};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::error::ExchangeError;
use crate::health::ExchangeHealth;
use crate::traits::{Balance, ExchangeClient, ExchangeResult, ProviderResponse};

/// 어댑터 설정.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// 호출 타임아웃
    pub timeout: Duration,
    /// 이 값 이하로 예산이 남으면 호출 간격을 벌림
    pub low_water_mark: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            low_water_mark: 120,
        }
    }
}

impl From<&ExchangeConfig> for AdapterConfig {
    fn from(config: &ExchangeConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            low_water_mark: config.rate_limit_low_water,
        }
    }
}

/// 거래소 접근 어댑터.
pub struct ExchangeAdapter {
    client: Arc<dyn ExchangeClient>,
    config: AdapterConfig,
    health: RwLock<ExchangeHealth>,
    clock: Arc<dyn Clock>,
}

impl ExchangeAdapter {
    pub fn new(client: Arc<dyn ExchangeClient>, config: AdapterConfig) -> Self {
        Self {
            client,
            config,
            health: RwLock::new(ExchangeHealth::default()),
            clock: Arc::new(SystemClock),
        }
    }

    /// 요청 한도 계산에 쓸 시계를 교체합니다.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn name(&self) -> &str {
        self.client.name()
    }

    /// 현재 헬스 상태 복사본.
    pub fn health(&self) -> ExchangeHealth {
        self.health.read().unwrap().clone()
    }

    pub fn health_score(&self) -> u8 {
        self.health.read().unwrap().score()
    }

    pub fn is_connected(&self) -> bool {
        self.health.read().unwrap().is_connected
    }

    /// 연결합니다. 실패하면 연결 끊김으로 표시됩니다.
    pub async fn connect(&self) -> ExchangeResult<()> {
        let started = Instant::now();
        let result = self
            .with_timeout("connect", async {
                self.client.connect().await.map(ProviderResponse::new)
            })
            .await;

        match result {
            Ok(response) => {
                self.record_success(started.elapsed(), &response);
                info!(exchange = %self.name(), "Exchange connected");
                Ok(())
            }
            Err(e) => {
                self.record_failure("connect", &e, true);
                warn!(exchange = %self.name(), error = %e, "Exchange connection failed");
                Err(e)
            }
        }
    }

    /// 서버 왕복 시간을 잽니다.
    ///
    /// 실패하면 에러 카운터를 올리고 연결 끊김으로 표시한 뒤 에러를 돌려줍니다.
    pub async fn ping(&self) -> ExchangeResult<Duration> {
        self.throttle().await?;

        let started = Instant::now();
        match self.with_timeout("ping", self.client.ping()).await {
            Ok(response) => {
                let latency = started.elapsed();
                self.record_success(latency, &response);
                debug!(exchange = %self.name(), latency_ms = latency.as_millis() as u64, "Ping ok");
                Ok(latency)
            }
            Err(e) => {
                self.record_failure("ping", &e, true);
                warn!(exchange = %self.name(), error = %e, "Ping failed, exchange marked unhealthy");
                Err(e)
            }
        }
    }

    /// 캔들을 조회해 정규화합니다 (오래된 것부터, 중복/비정상 제거, 최근 `limit`개).
    pub async fn get_candles(
        &self,
        pair: &TradingPair,
        timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        let raw = self
            .call("get_candles", || self.client.fetch_candles(pair, timeframe, limit))
            .await?;

        let candles = normalize_candles(raw, limit);
        debug!(
            exchange = %self.name(),
            symbol = %pair,
            timeframe = %timeframe,
            count = candles.len(),
            "Candles fetched"
        );
        Ok(candles)
    }

    pub async fn get_ticker(&self, pair: &TradingPair) -> ExchangeResult<Ticker> {
        self.call("get_ticker", || self.client.fetch_ticker(pair)).await
    }

    pub async fn get_markets(&self) -> ExchangeResult<Vec<MarketInfo>> {
        self.call("get_markets", || self.client.fetch_markets()).await
    }

    pub async fn get_balance(&self, asset: &str) -> ExchangeResult<Balance> {
        self.call("get_balance", || self.client.fetch_balance(asset)).await
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, f: F) -> ExchangeResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ExchangeResult<ProviderResponse<T>>>,
    {
        self.throttle().await?;

        let started = Instant::now();
        match self.with_timeout(operation, f()).await {
            Ok(response) => {
                self.record_success(started.elapsed(), &response);
                Ok(response.data)
            }
            Err(e) => {
                self.record_failure(operation, &e, false);
                warn!(
                    exchange = %self.name(),
                    operation,
                    error = %e,
                    "Exchange call failed"
                );
                Err(e)
            }
        }
    }

    /// 권장 대기 시간만큼 쉽니다. 예산이 소진됐으면 바로 에러.
    async fn throttle(&self) -> ExchangeResult<()> {
        let delay = {
            let health = self.health.read().unwrap();
            health.recommended_delay(self.clock.now(), self.config.low_water_mark)
        };

        match delay {
            Ok(delay) if delay.is_zero() => Ok(()),
            Ok(delay) => {
                debug!(
                    exchange = %self.name(),
                    delay_ms = delay.as_millis() as u64,
                    "Rate budget low, delaying call"
                );
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Err(e) => {
                warn!(exchange = %self.name(), error = %e, "Rate budget exhausted");
                Err(e)
            }
        }
    }

    async fn with_timeout<T, Fut>(&self, operation: &'static str, fut: Fut) -> ExchangeResult<T>
    where
        Fut: Future<Output = ExchangeResult<T>>,
    {
        match tokio::time::timeout(self.config.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout(format!(
                "{} exceeded {}ms",
                operation,
                self.config.timeout.as_millis()
            ))),
        }
    }

    fn record_success<T>(&self, latency: Duration, response: &ProviderResponse<T>) {
        let mut health = self.health.write().unwrap();
        health.record_success(latency, response.rate_limit, self.clock.now());
        health.export_metrics(self.name());
    }

    /// 실패를 헬스에 반영합니다. `disconnect`면 연결 끊김으로 표시.
    fn record_failure(&self, operation: &'static str, error: &ExchangeError, disconnect: bool) {
        let mut health = self.health.write().unwrap();
        health.record_failure(error, self.clock.now());
        if disconnect {
            health.mark_disconnected(error.to_string());
        }
        health.export_metrics(self.name());

        counter!(
            "exchange_call_errors_total",
            "exchange" => self.name().to_string(),
            "operation" => operation,
            "kind" => error.kind()
        )
        .increment(1);
    }
}

/// 캔들을 시간순으로 정렬하고 중복 시각과 비정상 캔들을 제거한 뒤 최근 `limit`개만 남깁니다.
pub fn normalize_candles(mut candles: Vec<Candle>, limit: usize) -> Vec<Candle> {
    let before = candles.len();

    candles.retain(Candle::is_well_formed);
    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);

    if candles.len() > limit {
        candles.drain(..candles.len() - limit);
    }

    let dropped = before.saturating_sub(candles.len());
    if dropped > 0 {
        debug!(dropped, "Dropped malformed, duplicate or excess candles");
    }

    candles
}
