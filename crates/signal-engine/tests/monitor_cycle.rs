//! 모니터 사이클 통합 테스트.
//!
//! 시뮬레이션 거래소, 기록 전송기, 수동 시계로 전체 흐름을 검증합니다.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signal_core::{
    Candle, Clock, Direction, DispatchConfig, EventBusConfig, ManualClock, MonitorConfig,
    SignalStatus, Timeframe, TradingPair,
};
use signal_engine::{
    EngineError, EngineResult, Event, EventBus, EventEnvelope, EventHandler, EventKind,
    ExchangeHealthNotifier,
    InMemoryInstrumentRepository, InMemorySignalRepository, InstrumentOutcome, InstrumentRepository,
    RecordingSleeper, SignalDispatchHandler, SignalMonitor, SignalRepository,
};
use signal_exchange::{AdapterConfig, ExchangeAdapter, ExchangeError, SimulatedClient};
use signal_notification::{NotificationEvent, NotificationManager, RecordingSender};
use tokio_util::sync::CancellationToken;

const KEY: &str = "binance:ETH/USDT:1h";

/// 완만히 하락하다 마지막에 거래량을 동반해 밀린 시계열.
fn falling_candles(count: usize) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let wobble = if i % 3 == 0 { dec!(0.6) } else { dec!(-0.4) };
            let open = dec!(2000) - Decimal::from(i as u64) + wobble;
            let close = open - dec!(1.2);
            let volume = if i + 1 == count { dec!(50) } else { dec!(10) };
            Candle::new(
                start + Duration::hours(i as i64),
                open,
                open + dec!(0.5),
                close - dec!(0.5),
                close,
                volume,
            )
        })
        .collect()
}

struct Harness {
    monitor: SignalMonitor,
    client: Arc<SimulatedClient>,
    sender: RecordingSender,
    clock: ManualClock,
    signals: Arc<InMemorySignalRepository>,
    instruments: Arc<InMemoryInstrumentRepository>,
    bus: Arc<EventBus>,
}

async fn harness() -> Harness {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 2, 6, 0, 0, 0).unwrap());
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

    let client = Arc::new(SimulatedClient::new("binance").with_candles(
        TradingPair::new("ETH", "USDT"),
        Timeframe::H1,
        falling_candles(120),
    ));

    let sender = RecordingSender::new("recording");
    let mut notifier = NotificationManager::new();
    notifier.add_sender(sender.clone());

    let signals = Arc::new(InMemorySignalRepository::new());
    let instruments = Arc::new(InMemoryInstrumentRepository::new());
    let bus = Arc::new(EventBus::new(EventBusConfig::default()).with_clock(shared_clock.clone()));

    bus.subscribe(
        EventKind::ExchangeHealthChanged,
        Arc::new(ExchangeHealthNotifier::new(notifier.clone()).with_clock(shared_clock.clone())),
    );
    let dispatcher = SignalDispatchHandler::new(signals.clone(), notifier, DispatchConfig::default())
        .with_sleeper(Arc::new(RecordingSleeper::new()))
        .with_clock(shared_clock.clone());
    bus.subscribe(EventKind::SignalGenerated, Arc::new(dispatcher));

    let config = MonitorConfig {
        candle_limit: 120,
        ..Default::default()
    };
    let mut monitor = SignalMonitor::new(bus.clone(), signals.clone(), instruments.clone(), config)
        .with_clock(shared_clock);
    monitor.add_exchange(Arc::new(ExchangeAdapter::new(
        client.clone(),
        AdapterConfig::default(),
    )));

    let ctx = monitor.context_for(
        TradingPair::new("ETH", "USDT"),
        "binance",
        Timeframe::H1,
        None,
        Some(3600),
    );
    monitor.add_instrument(ctx).await.unwrap();

    Harness {
        monitor,
        client,
        sender,
        clock,
        signals,
        instruments,
        bus,
    }
}

#[tokio::test]
async fn test_cycle_sends_signal_and_starts_cooldown() {
    let mut h = harness().await;

    let report = h.monitor.run_cycle().await;

    let Some(InstrumentOutcome::Signal { signal_id, status }) = report.outcome(KEY).cloned() else {
        panic!("expected a signal, got {:?}", report);
    };
    assert_eq!(status, SignalStatus::Sent);

    let stored = h.signals.find_signal_by_id(signal_id).await.unwrap().unwrap();
    assert_eq!(stored.direction, Direction::Short);
    assert_eq!(stored.strategy_name, "intraday-major");
    assert!(stored.stop_loss > stored.entry_price);
    assert_eq!(h.sender.sent().len(), 1);

    let ctx = h.instruments.find_instrument_config(KEY).await.unwrap().unwrap();
    assert_eq!(ctx.last_signal_at, Some(h.clock.now()));

    // 같은 시각에 다시 돌면 쿨다운에 막힘
    let report = h.monitor.run_cycle().await;
    assert_eq!(report.outcome(KEY), Some(&InstrumentOutcome::CoolingDown));
    assert_eq!(h.sender.sent().len(), 1);

    // 쿨다운이 지나면 다시 발생
    h.clock.advance(Duration::seconds(3601));
    let report = h.monitor.run_cycle().await;
    assert!(matches!(
        report.outcome(KEY),
        Some(InstrumentOutcome::Signal {
            status: SignalStatus::Sent,
            ..
        })
    ));
    assert_eq!(h.sender.sent().len(), 2);
}

#[tokio::test]
async fn test_failed_delivery_does_not_start_cooldown() {
    let mut h = harness().await;
    h.sender.fail_next("telegram down");

    let report = h.monitor.run_cycle().await;
    assert!(matches!(
        report.outcome(KEY),
        Some(InstrumentOutcome::Signal {
            status: SignalStatus::Failed,
            ..
        })
    ));
    let ctx = h.instruments.find_instrument_config(KEY).await.unwrap().unwrap();
    assert_eq!(ctx.last_signal_at, None);

    let report = h.monitor.run_cycle().await;
    assert!(matches!(
        report.outcome(KEY),
        Some(InstrumentOutcome::Signal {
            status: SignalStatus::Sent,
            ..
        })
    ));
    assert_eq!(h.signals.list_signals(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_inactive_instrument_skipped() {
    let mut h = harness().await;
    h.monitor.deactivate(KEY).await.unwrap();

    let report = h.monitor.run_cycle().await;

    assert_eq!(report.outcome(KEY), Some(&InstrumentOutcome::Inactive));
    assert_eq!(h.client.call_count(), 0);

    h.monitor.activate(KEY).await.unwrap();
    let report = h.monitor.run_cycle().await;
    assert!(matches!(report.outcome(KEY), Some(InstrumentOutcome::Signal { .. })));
}

#[tokio::test]
async fn test_deactivation_in_repository_is_picked_up() {
    let mut h = harness().await;
    let mut stored = h.instruments.find_instrument_config(KEY).await.unwrap().unwrap();
    stored.active = false;
    h.instruments.update_instrument(&stored).await.unwrap();

    let report = h.monitor.run_cycle().await;
    assert_eq!(report.outcome(KEY), Some(&InstrumentOutcome::Inactive));
}

#[tokio::test]
async fn test_one_instrument_failure_does_not_stop_cycle() {
    let mut h = harness().await;
    let unknown = h.monitor.context_for(
        TradingPair::new("XYZ", "USDT"),
        "binance",
        Timeframe::H1,
        None,
        None,
    );
    let unknown_key = unknown.key();
    h.monitor.add_instrument(unknown).await.unwrap();

    let report = h.monitor.run_cycle().await;

    assert_eq!(report.processed(), 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, unknown_key);
    assert!(matches!(report.outcome(KEY), Some(InstrumentOutcome::Signal { .. })));
}

#[tokio::test]
async fn test_unhealthy_exchange_skipped_then_recovers() {
    let mut h = harness().await;
    h.client
        .fail_next(ExchangeError::Network("connection refused".to_string()));

    let report = h.monitor.run_cycle().await;
    assert_eq!(
        report.outcome(KEY),
        Some(&InstrumentOutcome::ExchangeUnhealthy { score: 0 })
    );

    let health_events = h.bus.stored_events(Some(EventKind::ExchangeHealthChanged));
    assert_eq!(health_events.len(), 1);
    assert!(matches!(
        health_events[0].event,
        Event::ExchangeHealthChanged {
            connected: false,
            healthy: false,
            ..
        }
    ));
    let alerts = h.sender.sent();
    assert_eq!(alerts.len(), 1);
    assert!(matches!(
        &alerts[0].event,
        NotificationEvent::ExchangeDegraded { exchange, health_score: 0, .. } if exchange == "binance"
    ));

    let report = h.monitor.run_cycle().await;
    assert!(matches!(report.outcome(KEY), Some(InstrumentOutcome::Signal { .. })));
    assert!(matches!(
        h.sender.sent().last().map(|n| &n.event),
        Some(NotificationEvent::SignalAlert { .. })
    ));
}

#[tokio::test]
async fn test_unknown_exchange_rejected() {
    let mut h = harness().await;
    let ctx = h.monitor.context_for(
        TradingPair::new("BTC", "USDT"),
        "kraken",
        Timeframe::H1,
        None,
        None,
    );

    assert!(matches!(
        h.monitor.add_instrument(ctx).await,
        Err(EngineError::UnknownExchange(name)) if name == "kraken"
    ));
}

struct PanickingHandler;

#[async_trait]
impl EventHandler for PanickingHandler {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn handle(&self, _event: &EventEnvelope) -> EngineResult<()> {
        panic!("observer bug");
    }
}

#[tokio::test]
async fn test_broken_observer_does_not_block_dispatch() {
    let mut h = harness().await;
    h.bus
        .subscribe(EventKind::SignalGenerated, Arc::new(PanickingHandler));

    let report = h.monitor.run_cycle().await;

    assert!(matches!(
        report.outcome(KEY),
        Some(InstrumentOutcome::Signal {
            status: SignalStatus::Sent,
            ..
        })
    ));
    assert_eq!(h.bus.metrics().handler_errors, 1);
}

#[tokio::test]
async fn test_cycle_publishes_dispatch_result() {
    let mut h = harness().await;
    let bus = h.bus.clone();

    let (found, report) = tokio::join!(
        bus.wait_for_event(
            EventKind::SignalDispatched,
            |e| matches!(e.event, Event::SignalDispatched { status: SignalStatus::Sent, .. }),
            StdDuration::from_secs(5),
        ),
        h.monitor.run_cycle()
    );

    let found = found.expect("dispatch event");
    let Event::SignalDispatched { signal_id, .. } = found.event else {
        unreachable!()
    };
    assert_eq!(report.signals(), vec![signal_id]);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown() {
    let mut h = harness().await;
    let bus = h.bus.clone();
    let shutdown = CancellationToken::new();

    let stopper = {
        let shutdown = shutdown.clone();
        async move {
            bus.wait_for_event(EventKind::CycleCompleted, |_| true, StdDuration::from_secs(600))
                .await;
            shutdown.cancel();
        }
    };

    tokio::join!(h.monitor.run(shutdown.clone()), stopper);

    assert!(shutdown.is_cancelled());
    let completed = h
        .bus
        .metrics()
        .events_by_kind
        .get(&EventKind::CycleCompleted)
        .copied()
        .unwrap_or_default();
    assert!(completed >= 1);
}
