//! ExchangeAdapter 통합 테스트 (시뮬레이션 클라이언트 사용).

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use signal_core::{Candle, ManualClock, Timeframe, TradingPair};
use signal_exchange::{
    AdapterConfig, ExchangeAdapter, ExchangeError, RateLimitSnapshot, SimulatedClient,
};

fn btc() -> TradingPair {
    TradingPair::new("BTC", "USDT")
}

fn start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn adapter_with(client: Arc<SimulatedClient>, clock: ManualClock) -> ExchangeAdapter {
    ExchangeAdapter::new(client, AdapterConfig::default()).with_clock(Arc::new(clock))
}

fn seeded_client() -> SimulatedClient {
    SimulatedClient::new("sim").with_random_walk(btc(), Timeframe::H1, 50, dec!(40000), start())
}

#[tokio::test(start_paused = true)]
async fn test_connect_gives_full_health_score() {
    let client = Arc::new(seeded_client());
    let adapter = adapter_with(client, ManualClock::new(start()));

    assert_eq!(adapter.health_score(), 0);
    adapter.connect().await.unwrap();

    assert!(adapter.is_connected());
    assert_eq!(adapter.health_score(), 100);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_budget_fails_fast_without_calling_exchange() {
    let client = Arc::new(seeded_client());
    client.set_rate_limit(Some(RateLimitSnapshot {
        remaining: 0,
        limit: 1200,
        reset_at: start() + chrono::Duration::seconds(30),
    }));
    let adapter = adapter_with(client.clone(), ManualClock::new(start()));

    // 첫 호출은 한도 정보가 없으므로 그대로 나갑니다.
    adapter.get_candles(&btc(), Timeframe::H1, 10).await.unwrap();
    assert_eq!(client.call_count(), 1);

    let err = adapter.get_candles(&btc(), Timeframe::H1, 10).await.unwrap_err();
    assert_eq!(
        err,
        ExchangeError::RateLimit {
            retry_after_ms: 30_000
        }
    );
    assert_eq!(client.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_budget_restored_after_window_reset() {
    let client = Arc::new(seeded_client());
    client.set_rate_limit(Some(RateLimitSnapshot {
        remaining: 0,
        limit: 1200,
        reset_at: start() + chrono::Duration::seconds(30),
    }));
    let clock = ManualClock::new(start());
    let adapter = adapter_with(client.clone(), clock.clone());

    adapter.get_ticker(&btc()).await.unwrap();
    assert!(adapter.get_ticker(&btc()).await.is_err());

    clock.advance(chrono::Duration::seconds(31));
    client.set_rate_limit(None);

    adapter.get_ticker(&btc()).await.unwrap();
    assert_eq!(client.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_low_budget_spaces_calls() {
    let client = Arc::new(seeded_client());
    client.set_rate_limit(Some(RateLimitSnapshot {
        remaining: 5,
        limit: 1200,
        reset_at: start() + chrono::Duration::seconds(60),
    }));
    let adapter = adapter_with(client.clone(), ManualClock::new(start()));

    adapter.get_markets().await.unwrap();

    let before = tokio::time::Instant::now();
    adapter.get_markets().await.unwrap();
    let waited = before.elapsed();

    // 60초 / (5 + 1) = 10초, 리셋 시각을 넘지 않음
    assert!(waited >= Duration::from_secs(10));
    assert!(waited <= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_slow_exchange_times_out() {
    let client = Arc::new(seeded_client().with_latency(Duration::from_secs(5)));
    let adapter = ExchangeAdapter::new(
        client,
        AdapterConfig {
            timeout: Duration::from_secs(1),
            ..Default::default()
        },
    );

    let err = adapter.get_candles(&btc(), Timeframe::H1, 10).await.unwrap_err();
    assert!(matches!(err, ExchangeError::Timeout(_)));
    assert_eq!(adapter.health().error_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_ping_failure_marks_unhealthy() {
    let client = Arc::new(seeded_client());
    let adapter = adapter_with(client.clone(), ManualClock::new(start()));
    adapter.connect().await.unwrap();

    client.fail_next(ExchangeError::external("maintenance"));
    assert!(adapter.ping().await.is_err());

    let health = adapter.health();
    assert!(!health.is_connected);
    assert_eq!(health.error_count, 1);
    assert_eq!(adapter.health_score(), 0);

    // 다시 성공하면 연결 상태가 돌아옵니다.
    adapter.ping().await.unwrap();
    assert!(adapter.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_candles_are_normalized() {
    let t = |h: u32| Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap();
    let candle = |h: u32| Candle::new(t(h), dec!(10), dec!(11), dec!(9), dec!(10), dec!(1));
    let mut broken = candle(5);
    broken.low = dec!(0);

    let client = Arc::new(SimulatedClient::new("sim").with_candles(
        btc(),
        Timeframe::H1,
        vec![candle(3), candle(1), candle(2), candle(2), broken, candle(4)],
    ));
    let adapter = adapter_with(client, ManualClock::new(start()));

    let candles = adapter.get_candles(&btc(), Timeframe::H1, 10).await.unwrap();
    let times: Vec<_> = candles.iter().map(|c| c.timestamp).collect();
    assert_eq!(times, vec![t(1), t(2), t(3), t(4)]);
}
