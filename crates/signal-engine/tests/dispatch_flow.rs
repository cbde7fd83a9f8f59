//! 이벤트 버스를 거친 발송/체결 확인 흐름 테스트.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use signal_core::{Direction, DispatchConfig, Signal, SignalStatus, Timeframe, TradingPair};
use signal_engine::{
    Event, EventBus, EventKind, ExecutionAckHandler, InMemorySignalRepository, RecordingSleeper,
    SignalDispatchHandler, SignalRepository,
};
use signal_notification::{
    Notification, NotificationEvent, NotificationManager, NotificationResult, NotificationSender,
    RecordingSender,
};

struct Setup {
    bus: Arc<EventBus>,
    repo: Arc<InMemorySignalRepository>,
    sender: RecordingSender,
    sleeper: RecordingSleeper,
}

fn setup() -> Setup {
    let repo = Arc::new(InMemorySignalRepository::new());
    let sender = RecordingSender::new("recording");
    let sleeper = RecordingSleeper::new();

    let mut notifier = NotificationManager::new();
    notifier.add_sender(sender.clone());

    let bus = Arc::new(EventBus::default());
    let dispatcher = SignalDispatchHandler::new(repo.clone(), notifier.clone(), DispatchConfig::default())
        .with_sleeper(Arc::new(sleeper.clone()));
    let ack = ExecutionAckHandler::new(repo.clone(), notifier, DispatchConfig::default())
        .with_sleeper(Arc::new(sleeper.clone()));
    bus.subscribe(EventKind::SignalGenerated, Arc::new(dispatcher));
    bus.subscribe(EventKind::SignalExecuted, Arc::new(ack));

    Setup {
        bus,
        repo,
        sender,
        sleeper,
    }
}

async fn pending_signal(repo: &InMemorySignalRepository) -> Signal {
    let signal = Signal::new(
        TradingPair::new("SOL", "USDT"),
        "binance",
        Direction::Short,
        dec!(150),
        Timeframe::M15,
        Utc::now(),
    )
    .with_stop_loss(dec!(152.25))
    .with_take_profits(vec![dec!(147.75), dec!(145.5)])
    .with_confidence(9.0)
    .with_strategy("intraday-major");
    repo.save_signal(&signal).await.unwrap()
}

#[tokio::test]
async fn test_duplicate_events_dispatch_once() {
    let s = setup();
    let signal = pending_signal(&s.repo).await;
    let saves_before = s.repo.save_count();

    let event = Event::SignalGenerated {
        signal: signal.clone(),
    };
    let (first, second) = tokio::join!(s.bus.publish(event.clone()), s.bus.publish(event));

    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(s.sender.attempts(), 1);
    assert_eq!(s.repo.save_count(), saves_before + 1);

    let stored = s.repo.find_signal_by_id(signal.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SignalStatus::Sent);
    assert!(stored.sent_at.is_some());
}

#[tokio::test]
async fn test_signal_already_sent_is_left_alone() {
    let s = setup();
    let signal = pending_signal(&s.repo).await;
    let mut sent = signal.clone();
    sent.transition_to(SignalStatus::Sent, Utc::now()).unwrap();
    let sent = s.repo.save_signal(&sent).await.unwrap();
    let saves_before = s.repo.save_count();

    let summary = s.bus.publish(Event::SignalGenerated { signal }).await;

    assert!(summary.is_success());
    assert_eq!(s.sender.attempts(), 0);
    assert_eq!(s.repo.save_count(), saves_before);
    assert_eq!(
        s.repo.find_signal_by_id(sent.id).await.unwrap().unwrap(),
        sent
    );
}

#[tokio::test]
async fn test_persistent_conflict_marks_failed_after_backoff() {
    let s = setup();
    let signal = pending_signal(&s.repo).await;
    s.repo.force_conflicts(3);

    let summary = s.bus.publish(Event::SignalGenerated { signal: signal.clone() }).await;

    assert!(!summary.is_success());
    assert_eq!(summary.failed[0].0, "signal-dispatch");
    assert_eq!(
        s.sleeper.delays(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
    assert_eq!(s.sender.attempts(), 1);
    assert_eq!(
        s.repo.find_signal_by_id(signal.id).await.unwrap().unwrap().status,
        SignalStatus::Failed
    );
}

#[tokio::test]
async fn test_execution_ack_closes_signal_and_notifies() {
    let s = setup();
    let signal = pending_signal(&s.repo).await;
    s.bus
        .publish(Event::SignalGenerated {
            signal: signal.clone(),
        })
        .await;

    let summary = s
        .bus
        .publish(Event::SignalExecuted {
            signal_id: signal.id,
            success: true,
            detail: Some("filled at 149.9".to_string()),
        })
        .await;

    assert!(summary.is_success());
    assert_eq!(
        s.repo.find_signal_by_id(signal.id).await.unwrap().unwrap().status,
        SignalStatus::Executed
    );

    let sent = s.sender.sent();
    assert_eq!(sent.len(), 2);
    assert!(matches!(
        sent[1].event,
        NotificationEvent::SignalOutcome {
            status: SignalStatus::Executed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_failed_execution_marks_failed() {
    let s = setup();
    let signal = pending_signal(&s.repo).await;
    s.bus
        .publish(Event::SignalGenerated {
            signal: signal.clone(),
        })
        .await;

    s.bus
        .publish(Event::SignalExecuted {
            signal_id: signal.id,
            success: false,
            detail: None,
        })
        .await;

    assert_eq!(
        s.repo.find_signal_by_id(signal.id).await.unwrap().unwrap().status,
        SignalStatus::Failed
    );
}

#[tokio::test]
async fn test_bus_health_after_dispatches() {
    let s = setup();
    for _ in 0..3 {
        let signal = pending_signal(&s.repo).await;
        s.bus.publish(Event::SignalGenerated { signal }).await;
    }

    let metrics = s.bus.metrics();
    assert_eq!(metrics.events_published, 3);
    assert_eq!(metrics.handler_invocations, 3);
    assert_eq!(metrics.handler_errors, 0);
    assert!(s.bus.health().healthy);
    assert_eq!(s.bus.stored_events(Some(EventKind::SignalGenerated)).len(), 3);
}

/// 전송마다 잠시 멈추는 전송기. 같은 시그널의 발송이 겹치게 만듭니다.
#[derive(Clone, Default)]
struct SlowSender {
    sends: Arc<AtomicUsize>,
}

#[async_trait]
impl NotificationSender for SlowSender {
    async fn send(&self, _notification: &Notification) -> NotificationResult<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "slow"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overlapping_dispatch_of_same_signal_notifies_once() {
    let repo = Arc::new(InMemorySignalRepository::new());
    let sender = SlowSender::default();
    let mut notifier = NotificationManager::new();
    notifier.add_sender(sender.clone());

    let bus = Arc::new(EventBus::default());
    let dispatcher = Arc::new(SignalDispatchHandler::new(
        repo.clone(),
        notifier,
        DispatchConfig::default(),
    ));
    bus.subscribe(EventKind::SignalGenerated, dispatcher.clone());

    let signal = pending_signal(&repo).await;
    let saves_before = repo.save_count();

    let publishes: Vec<_> = (0..2)
        .map(|_| {
            let bus = bus.clone();
            let event = Event::SignalGenerated {
                signal: signal.clone(),
            };
            tokio::spawn(async move { bus.publish(event).await })
        })
        .collect();

    let summaries = tokio::time::timeout(
        Duration::from_secs(5),
        futures::future::join_all(publishes),
    )
    .await
    .expect("overlapping dispatch must not stall");

    for summary in summaries {
        assert!(summary.unwrap().is_success());
    }
    assert_eq!(sender.sends.load(Ordering::SeqCst), 1);
    assert_eq!(repo.save_count(), saves_before + 1);
    assert_eq!(dispatcher.in_flight_count(), 0);
    assert_eq!(
        repo.find_signal_by_id(signal.id).await.unwrap().unwrap().status,
        SignalStatus::Sent
    );

    // 발송이 끝난 뒤에도 핸들러는 다음 시그널을 처리함
    let next = pending_signal(&repo).await;
    let summary = bus.publish(Event::SignalGenerated { signal: next }).await;
    assert!(summary.is_success());
    assert_eq!(sender.sends.load(Ordering::SeqCst), 2);
}
