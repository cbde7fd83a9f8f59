//! 시뮬레이션 거래소 클라이언트.
//!
//! 테스트와 드라이런(`--simulated`)에 씁니다. 미리 넣어 둔 캔들을 돌려주거나,
//! 무작위 보행으로 캔들을 만들고 조회할 때마다 새 캔들을 하나씩 덧붙입니다.
//! 실패, 지연, 요청 한도 정보를 주입할 수 있습니다.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signal_core::{Candle, MarketInfo, Ticker, Timeframe, TradingPair};

use crate::error::ExchangeError;
use crate::traits::{Balance, ExchangeClient, ExchangeResult, ProviderResponse, RateLimitSnapshot};

struct Series {
    pair: TradingPair,
    timeframe: Timeframe,
    candles: Vec<Candle>,
}

struct SimState {
    series: HashMap<String, Series>,
    balances: HashMap<String, Balance>,
    failures: VecDeque<ExchangeError>,
    rate_limit: Option<RateLimitSnapshot>,
    rng: StdRng,
    /// 조회마다 새 캔들 생성
    live: bool,
    volatility: f64,
}

/// 시뮬레이션 클라이언트.
pub struct SimulatedClient {
    name: String,
    latency: Duration,
    state: Mutex<SimState>,
    calls: AtomicU64,
}

impl SimulatedClient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency: Duration::ZERO,
            state: Mutex::new(SimState {
                series: HashMap::new(),
                balances: HashMap::new(),
                failures: VecDeque::new(),
                rate_limit: None,
                rng: StdRng::seed_from_u64(7),
                live: false,
                volatility: 0.01,
            }),
            calls: AtomicU64::new(0),
        }
    }

    /// 모든 응답 전에 기다릴 시간.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.state.lock().unwrap().rng = StdRng::seed_from_u64(seed);
        self
    }

    /// 조회할 때마다 무작위 캔들을 하나씩 덧붙입니다.
    pub fn with_live_updates(self, live: bool) -> Self {
        self.state.lock().unwrap().live = live;
        self
    }

    /// 캔들 시계열을 넣습니다.
    pub fn with_candles(self, pair: TradingPair, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        self.set_candles(pair, timeframe, candles);
        self
    }

    pub fn set_candles(&self, pair: TradingPair, timeframe: Timeframe, candles: Vec<Candle>) {
        self.state.lock().unwrap().series.insert(
            pair.exchange_symbol(),
            Series {
                pair,
                timeframe,
                candles,
            },
        );
    }

    /// 무작위 보행 캔들 `count`개를 만들어 넣습니다. 마지막 캔들은 `end` 직전에 끝납니다.
    pub fn with_random_walk(
        self,
        pair: TradingPair,
        timeframe: Timeframe,
        count: usize,
        start_price: Decimal,
        end: DateTime<Utc>,
    ) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let step = chrono::Duration::milliseconds(timeframe.as_millis());
            let mut time = end - step * count as i32;
            let mut price = start_price;
            let mut candles = Vec::with_capacity(count);

            let volatility = state.volatility;
            for _ in 0..count {
                let candle = next_candle(&mut state.rng, volatility, time, price);
                price = candle.close;
                time += step;
                candles.push(candle);
            }

            state.series.insert(
                pair.exchange_symbol(),
                Series {
                    pair,
                    timeframe,
                    candles,
                },
            );
        }
        self
    }

    pub fn with_balance(self, asset: &str, free: Decimal, locked: Decimal) -> Self {
        self.state.lock().unwrap().balances.insert(
            asset.to_uppercase(),
            Balance {
                asset: asset.to_uppercase(),
                free,
                locked,
            },
        );
        self
    }

    /// 다음 호출을 주어진 에러로 실패시킵니다. 여러 번 호출하면 순서대로 소비됩니다.
    pub fn fail_next(&self, error: ExchangeError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    /// 이후 모든 응답에 실을 요청 한도 정보.
    pub fn set_rate_limit(&self, snapshot: Option<RateLimitSnapshot>) {
        self.state.lock().unwrap().rate_limit = snapshot;
    }

    /// 지금까지 받은 호출 수.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn begin(&self) -> ExchangeResult<Option<RateLimitSnapshot>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state.lock().unwrap();
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(state.rate_limit),
        }
    }

    fn respond<T>(data: T, rate_limit: Option<RateLimitSnapshot>) -> ProviderResponse<T> {
        ProviderResponse { data, rate_limit }
    }
}

fn unknown_symbol(pair: &TradingPair) -> ExchangeError {
    ExchangeError::ExternalApi {
        code: Some(-1121),
        message: format!("Invalid symbol: {}", pair.exchange_symbol()),
    }
}

fn next_candle(rng: &mut StdRng, volatility: f64, time: DateTime<Utc>, price: Decimal) -> Candle {
    let to_decimal = |v: f64| Decimal::from_f64_retain(v).unwrap_or_default();

    let change_pct = (rng.gen::<f64>() - 0.5) * 2.0 * volatility;
    let open = price;
    let close = (price + price * to_decimal(change_pct)).round_dp(8);

    let high = open.max(close) + (price * to_decimal(rng.gen::<f64>() * 0.005)).round_dp(8);
    let low = open.min(close) - (price * to_decimal(rng.gen::<f64>() * 0.005)).round_dp(8);
    let volume = to_decimal(rng.gen_range(10.0..1000.0)).round_dp(4);

    Candle::new(time, open, high, low.max(dec!(0.00000001)), close, volume)
}

#[async_trait]
impl ExchangeClient for SimulatedClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> ExchangeResult<()> {
        self.begin().await.map(|_| ())
    }

    async fn ping(&self) -> ExchangeResult<ProviderResponse<()>> {
        let rate_limit = self.begin().await?;
        Ok(Self::respond((), rate_limit))
    }

    async fn fetch_candles(
        &self,
        pair: &TradingPair,
        _timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<ProviderResponse<Vec<Candle>>> {
        let rate_limit = self.begin().await?;

        let mut state = self.state.lock().unwrap();
        let SimState {
            series,
            rng,
            live,
            volatility,
            ..
        } = &mut *state;

        let series = series
            .get_mut(&pair.exchange_symbol())
            .ok_or_else(|| unknown_symbol(pair))?;

        if *live {
            if let Some(last) = series.candles.last() {
                let time =
                    last.timestamp + chrono::Duration::milliseconds(series.timeframe.as_millis());
                let candle = next_candle(rng, *volatility, time, last.close);
                series.candles.push(candle);
            }
        }

        let start = series.candles.len().saturating_sub(limit);
        Ok(Self::respond(series.candles[start..].to_vec(), rate_limit))
    }

    async fn fetch_ticker(&self, pair: &TradingPair) -> ExchangeResult<ProviderResponse<Ticker>> {
        let rate_limit = self.begin().await?;

        let state = self.state.lock().unwrap();
        let series = state
            .series
            .get(&pair.exchange_symbol())
            .ok_or_else(|| unknown_symbol(pair))?;
        let last = series
            .candles
            .last()
            .ok_or_else(|| ExchangeError::external("no market data"))?;

        let window = &series.candles[series.candles.len().saturating_sub(24)..];
        let first_open = window.first().map(|c| c.open).unwrap_or(last.open);
        let change = if first_open.is_zero() {
            Decimal::ZERO
        } else {
            (last.close - first_open) / first_open * dec!(100)
        };

        let ticker = Ticker {
            pair: series.pair.clone(),
            last: last.close,
            high_24h: window.iter().map(|c| c.high).max().unwrap_or(last.high),
            low_24h: window.iter().map(|c| c.low).min().unwrap_or(last.low),
            volume_24h: window.iter().map(|c| c.volume).sum(),
            change_24h_percent: change.round_dp(2),
            timestamp: last.timestamp,
        };
        Ok(Self::respond(ticker, rate_limit))
    }

    async fn fetch_markets(&self) -> ExchangeResult<ProviderResponse<Vec<MarketInfo>>> {
        let rate_limit = self.begin().await?;

        let state = self.state.lock().unwrap();
        let mut markets: Vec<MarketInfo> = state
            .series
            .values()
            .map(|s| MarketInfo {
                pair: s.pair.clone(),
                active: true,
            })
            .collect();
        markets.sort_by_key(|m| m.pair.to_string());
        Ok(Self::respond(markets, rate_limit))
    }

    async fn fetch_balance(&self, asset: &str) -> ExchangeResult<ProviderResponse<Balance>> {
        let rate_limit = self.begin().await?;

        let asset = asset.to_uppercase();
        let state = self.state.lock().unwrap();
        let balance = state.balances.get(&asset).cloned().unwrap_or(Balance {
            asset,
            free: Decimal::ZERO,
            locked: Decimal::ZERO,
        });
        Ok(Self::respond(balance, rate_limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> TradingPair {
        TradingPair::new("BTC", "USDT")
    }

    #[tokio::test]
    async fn test_random_walk_candles_are_well_formed() {
        let client = SimulatedClient::new("sim").with_random_walk(
            pair(),
            Timeframe::H1,
            100,
            dec!(50000),
            Utc::now(),
        );

        let candles = client.fetch_candles(&pair(), Timeframe::H1, 50).await.unwrap().data;
        assert_eq!(candles.len(), 50);
        assert!(candles.iter().all(Candle::is_well_formed));
        assert!(candles.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn test_live_updates_append_candle() {
        let client = SimulatedClient::new("sim")
            .with_random_walk(pair(), Timeframe::M5, 10, dec!(1), Utc::now())
            .with_live_updates(true);

        let first = client.fetch_candles(&pair(), Timeframe::M5, 100).await.unwrap().data;
        let second = client.fetch_candles(&pair(), Timeframe::M5, 100).await.unwrap().data;

        assert_eq!(first.len(), 11);
        assert_eq!(second.len(), 12);
        assert_eq!(second[11].open, second[10].close);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let client = SimulatedClient::new("sim");
        client.fail_next(ExchangeError::Network("down".into()));

        assert!(client.ping().await.is_err());
        assert!(client.ping().await.is_ok());
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_symbol() {
        let client = SimulatedClient::new("sim");
        let err = client
            .fetch_candles(&pair(), Timeframe::H1, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ExternalApi { code: Some(-1121), .. }));
    }
}
