//! 시그널 발송 핸들러.
//!
//! 시그널 id마다 다음 상태 기계를 따릅니다:
//!
//! ```text
//! PENDING ──(알림 전달)──> 저장 SENT ──> 완료
//!    │                        │
//!    │                        └─ 버전 충돌 → 100ms × 2^attempt 대기 후 재시도
//!    └─ 알림 실패 / 재시도 소진 / 기타 에러 → FAILED
//! ```
//!
//! 같은 id는 동시에 한 번만 처리되고, 알림은 저장 재시도와 무관하게 한 번만
//! 전달됩니다.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use signal_core::{Clock, DispatchConfig, Signal, SignalStatus, SystemClock};
use signal_notification::{Notification, NotificationEvent, NotificationManager};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::event_bus::{Event, EventEnvelope, EventHandler};
use crate::repository::SignalRepository;
use crate::telemetry;

/// 재시도 대기 추상화.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// tokio 타이머로 대기합니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// 대기하지 않고 요청된 시간만 기록합니다.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// 발송을 건너뛴 이유.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// 같은 id를 이미 처리 중
    AlreadyInFlight,
    /// PENDING이 아님
    NotPending(SignalStatus),
    NotFound,
}

/// 발송 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DispatchOutcome {
    /// SENT 저장 완료. `attempts`는 저장 시도 횟수
    Sent { attempts: u32 },
    Skipped(SkipReason),
    /// FAILED로 표시함 (표시 자체는 실패했을 수 있음)
    Failed { reason: String },
}

/// `base × 2^attempt` 밀리초.
fn backoff(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << attempt.min(16)))
}

/// 처리 중 id 집합에서 자기 id를 빼 주는 가드.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<Uuid>>,
    id: Uuid,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<Uuid>>, id: Uuid) -> Option<Self> {
        let inserted = in_flight.lock().unwrap().insert(id);
        inserted.then(|| Self { in_flight, id })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.id);
        }
    }
}

/// `SignalGenerated` 이벤트를 받아 시그널을 발송합니다.
pub struct SignalDispatchHandler {
    signals: Arc<dyn SignalRepository>,
    notifier: NotificationManager,
    config: DispatchConfig,
    in_flight: Mutex<HashSet<Uuid>>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

impl SignalDispatchHandler {
    pub fn new(
        signals: Arc<dyn SignalRepository>,
        notifier: NotificationManager,
        config: DispatchConfig,
    ) -> Self {
        Self {
            signals,
            notifier,
            config,
            in_flight: Mutex::new(HashSet::new()),
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 현재 처리 중인 시그널 수.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    /// 시그널 하나를 발송합니다.
    pub async fn dispatch(&self, signal_id: Uuid) -> DispatchOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, signal_id) else {
            debug!(signal_id = %signal_id, "Dispatch already in flight, duplicate dropped");
            return DispatchOutcome::Skipped(SkipReason::AlreadyInFlight);
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut delivered = false;
        let mut last_error = String::from("retries exhausted");

        for attempt in 0..max_attempts {
            let signal = match self.signals.find_signal_by_id(signal_id).await {
                Ok(Some(signal)) => signal,
                Ok(None) => {
                    warn!(signal_id = %signal_id, "Signal not found for dispatch");
                    return DispatchOutcome::Skipped(SkipReason::NotFound);
                }
                Err(e) => {
                    last_error = e.to_string();
                    break;
                }
            };

            if !signal.is_pending() {
                debug!(
                    signal_id = %signal_id,
                    status = %signal.status,
                    "Signal no longer pending, dispatch skipped"
                );
                return DispatchOutcome::Skipped(SkipReason::NotPending(signal.status));
            }

            if !delivered {
                if let Err(e) = self.notifier.notify_signal(&signal).await.into_result() {
                    let reason = e.to_string();
                    warn!(signal_id = %signal_id, error = %reason, "Signal notification failed");
                    self.mark_failed(signal_id, &reason).await;
                    return DispatchOutcome::Failed { reason };
                }
                delivered = true;
            }

            let mut sent = signal;
            if let Err(e) = sent.transition_to(SignalStatus::Sent, self.clock.now()) {
                last_error = e.to_string();
                break;
            }

            match self.signals.save_signal(&sent).await {
                Ok(saved) => {
                    info!(
                        signal_id = %signal_id,
                        symbol = %saved.pair,
                        direction = %saved.direction,
                        attempts = attempt + 1,
                        "Signal sent"
                    );
                    return DispatchOutcome::Sent {
                        attempts: attempt + 1,
                    };
                }
                Err(e) if e.is_conflict() => {
                    last_error = e.to_string();
                    debug!(signal_id = %signal_id, attempt, error = %e, "Save conflict");
                    if attempt + 1 < max_attempts {
                        self.sleeper
                            .sleep(backoff(self.config.base_backoff_ms, attempt))
                            .await;
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                    break;
                }
            }
        }

        error!(signal_id = %signal_id, error = %last_error, "Signal dispatch failed");
        self.mark_failed(signal_id, &last_error).await;
        DispatchOutcome::Failed { reason: last_error }
    }

    /// 최신 상태를 다시 읽어 FAILED로 표시합니다. 실패는 로그만 남깁니다.
    async fn mark_failed(&self, signal_id: Uuid, reason: &str) {
        match self.try_mark_failed(signal_id).await {
            Ok(()) => warn!(signal_id = %signal_id, reason, "Signal marked FAILED"),
            Err(e) => error!(
                signal_id = %signal_id,
                reason,
                error = %e,
                "Could not mark signal FAILED"
            ),
        }
    }

    async fn try_mark_failed(&self, signal_id: Uuid) -> EngineResult<()> {
        let Some(mut signal) = self.signals.find_signal_by_id(signal_id).await? else {
            return Ok(());
        };
        if !signal.status.can_transition_to(SignalStatus::Failed) {
            return Ok(());
        }
        signal.transition_to(SignalStatus::Failed, self.clock.now())?;
        self.signals.save_signal(&signal).await?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for SignalDispatchHandler {
    fn name(&self) -> &str {
        "signal-dispatch"
    }

    fn can_handle(&self, event: &EventEnvelope) -> bool {
        matches!(event.event, Event::SignalGenerated { .. })
    }

    async fn handle(&self, event: &EventEnvelope) -> EngineResult<()> {
        let Event::SignalGenerated { signal } = &event.event else {
            return Ok(());
        };

        let outcome = self.dispatch(signal.id).await;
        telemetry::record_dispatch(&outcome);

        match outcome {
            DispatchOutcome::Failed { reason } => Err(EngineError::DispatchFailed {
                signal_id: signal.id,
                reason,
            }),
            _ => Ok(()),
        }
    }
}

/// 체결 확인(`SignalExecuted`)을 받아 SENT 시그널을 EXECUTED 또는 FAILED로 옮깁니다.
pub struct ExecutionAckHandler {
    signals: Arc<dyn SignalRepository>,
    notifier: NotificationManager,
    config: DispatchConfig,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

impl ExecutionAckHandler {
    pub fn new(
        signals: Arc<dyn SignalRepository>,
        notifier: NotificationManager,
        config: DispatchConfig,
    ) -> Self {
        Self {
            signals,
            notifier,
            config,
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 결과를 반영합니다. SENT가 아닌 시그널은 그대로 두고 `None`을 돌려줍니다.
    pub async fn acknowledge(
        &self,
        signal_id: Uuid,
        success: bool,
    ) -> EngineResult<Option<Signal>> {
        let next = if success {
            SignalStatus::Executed
        } else {
            SignalStatus::Failed
        };
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 0..max_attempts {
            let Some(mut signal) = self.signals.find_signal_by_id(signal_id).await? else {
                warn!(signal_id = %signal_id, "Execution ack for unknown signal");
                return Ok(None);
            };

            if signal.status != SignalStatus::Sent {
                debug!(
                    signal_id = %signal_id,
                    status = %signal.status,
                    "Execution ack ignored, signal not SENT"
                );
                return Ok(None);
            }

            signal.transition_to(next, self.clock.now())?;
            match self.signals.save_signal(&signal).await {
                Ok(saved) => {
                    info!(signal_id = %signal_id, status = %saved.status, "Execution acknowledged");
                    return Ok(Some(saved));
                }
                Err(e) if e.is_conflict() && attempt + 1 < max_attempts => {
                    self.sleeper
                        .sleep(backoff(self.config.base_backoff_ms, attempt))
                        .await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl EventHandler for ExecutionAckHandler {
    fn name(&self) -> &str {
        "execution-ack"
    }

    fn can_handle(&self, event: &EventEnvelope) -> bool {
        matches!(event.event, Event::SignalExecuted { .. })
    }

    async fn handle(&self, event: &EventEnvelope) -> EngineResult<()> {
        let Event::SignalExecuted {
            signal_id,
            success,
            detail,
        } = &event.event
        else {
            return Ok(());
        };

        let Some(signal) = self.acknowledge(*signal_id, *success).await? else {
            return Ok(());
        };

        if let Some(detail) = detail {
            debug!(signal_id = %signal_id, detail = %detail, "Execution detail");
        }

        let outcome = Notification::new(NotificationEvent::SignalOutcome {
            signal_id: signal.id,
            pair: signal.pair.clone(),
            status: signal.status,
        })
        .at(self.clock.now());

        let report = self.notifier.notify(&outcome).await;
        if !report.is_delivered() {
            warn!(signal_id = %signal_id, "Execution outcome notification not delivered");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemorySignalRepository;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use signal_core::{Direction, Timeframe, TradingPair};
    use signal_notification::RecordingSender;

    struct Fixture {
        repo: Arc<InMemorySignalRepository>,
        sender: RecordingSender,
        sleeper: RecordingSleeper,
        handler: SignalDispatchHandler,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemorySignalRepository::new());
        let sender = RecordingSender::new("recording");
        let sleeper = RecordingSleeper::new();

        let mut notifier = NotificationManager::new();
        notifier.add_sender(sender.clone());

        let handler = SignalDispatchHandler::new(repo.clone(), notifier, DispatchConfig::default())
            .with_sleeper(Arc::new(sleeper.clone()));

        Fixture {
            repo,
            sender,
            sleeper,
            handler,
        }
    }

    async fn pending(repo: &InMemorySignalRepository) -> Signal {
        let signal = Signal::new(
            TradingPair::new("ETH", "USDT"),
            "binance",
            Direction::Long,
            dec!(2000),
            Timeframe::H1,
            Utc::now(),
        )
        .with_stop_loss(dec!(1970))
        .with_take_profits(vec![dec!(2030)])
        .with_confidence(6.0);
        repo.save_signal(&signal).await.unwrap()
    }

    async fn status_of(repo: &InMemorySignalRepository, id: Uuid) -> SignalStatus {
        repo.find_signal_by_id(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_pending_signal_is_sent() {
        let f = fixture();
        let signal = pending(&f.repo).await;

        let outcome = f.handler.dispatch(signal.id).await;

        assert_eq!(outcome, DispatchOutcome::Sent { attempts: 1 });
        assert_eq!(status_of(&f.repo, signal.id).await, SignalStatus::Sent);
        assert_eq!(f.sender.sent().len(), 1);
        assert_eq!(f.handler.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_non_pending_signal_untouched() {
        let f = fixture();
        let signal = pending(&f.repo).await;
        let mut sent = signal.clone();
        sent.transition_to(SignalStatus::Sent, Utc::now()).unwrap();
        f.repo.save_signal(&sent).await.unwrap();
        let saves = f.repo.save_count();

        let outcome = f.handler.dispatch(signal.id).await;

        assert_eq!(
            outcome,
            DispatchOutcome::Skipped(SkipReason::NotPending(SignalStatus::Sent))
        );
        assert_eq!(f.sender.attempts(), 0);
        assert_eq!(f.repo.save_count(), saves);
    }

    #[tokio::test]
    async fn test_conflicts_back_off_then_fail() {
        let f = fixture();
        let signal = pending(&f.repo).await;
        f.repo.force_conflicts(3);

        let outcome = f.handler.dispatch(signal.id).await;

        assert!(matches!(outcome, DispatchOutcome::Failed { .. }));
        assert_eq!(
            f.sleeper.delays(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
        assert_eq!(f.sender.attempts(), 1);
        assert_eq!(status_of(&f.repo, signal.id).await, SignalStatus::Failed);
        assert_eq!(f.handler.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_conflict_then_success_notifies_once() {
        let f = fixture();
        let signal = pending(&f.repo).await;
        f.repo.force_conflicts(1);

        let outcome = f.handler.dispatch(signal.id).await;

        assert_eq!(outcome, DispatchOutcome::Sent { attempts: 2 });
        assert_eq!(f.sender.attempts(), 1);
        assert_eq!(f.sleeper.delays(), vec![Duration::from_millis(100)]);
    }

    #[tokio::test]
    async fn test_notification_failure_marks_failed() {
        let f = fixture();
        let signal = pending(&f.repo).await;
        f.sender.fail_next("telegram down");

        let outcome = f.handler.dispatch(signal.id).await;

        match outcome {
            DispatchOutcome::Failed { reason } => assert!(reason.contains("telegram down")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(status_of(&f.repo, signal.id).await, SignalStatus::Failed);
    }

    #[tokio::test]
    async fn test_no_channels_marks_failed() {
        let repo = Arc::new(InMemorySignalRepository::new());
        let handler =
            SignalDispatchHandler::new(repo.clone(), NotificationManager::new(), DispatchConfig::default());
        let signal = pending(&repo).await;

        assert!(matches!(
            handler.dispatch(signal.id).await,
            DispatchOutcome::Failed { .. }
        ));
        assert_eq!(status_of(&repo, signal.id).await, SignalStatus::Failed);
    }

    #[tokio::test]
    async fn test_in_flight_duplicate_dropped() {
        let f = fixture();
        let signal = pending(&f.repo).await;

        let held = InFlightGuard::acquire(&f.handler.in_flight, signal.id).unwrap();
        assert!(InFlightGuard::acquire(&f.handler.in_flight, signal.id).is_none());
        assert_eq!(
            f.handler.dispatch(signal.id).await,
            DispatchOutcome::Skipped(SkipReason::AlreadyInFlight)
        );
        assert_eq!(f.sender.attempts(), 0);
        assert_eq!(f.handler.in_flight_count(), 1);

        // 거절된 중복이 잡고 있던 id를 풀면 안 됨
        drop(held);
        assert_eq!(f.handler.in_flight_count(), 0);
        assert_eq!(
            f.handler.dispatch(signal.id).await,
            DispatchOutcome::Sent { attempts: 1 }
        );
    }

    #[tokio::test]
    async fn test_ack_moves_sent_to_executed() {
        let f = fixture();
        let signal = pending(&f.repo).await;
        f.handler.dispatch(signal.id).await;

        let mut notifier = NotificationManager::new();
        notifier.add_sender(f.sender.clone());
        let ack = ExecutionAckHandler::new(f.repo.clone(), notifier, DispatchConfig::default());

        let updated = ack.acknowledge(signal.id, true).await.unwrap().unwrap();
        assert_eq!(updated.status, SignalStatus::Executed);

        // 이미 종료된 시그널은 그대로
        assert!(ack.acknowledge(signal.id, false).await.unwrap().is_none());
        assert_eq!(status_of(&f.repo, signal.id).await, SignalStatus::Executed);
    }

    #[tokio::test]
    async fn test_ack_ignores_pending() {
        let f = fixture();
        let signal = pending(&f.repo).await;
        let ack = ExecutionAckHandler::new(
            f.repo.clone(),
            NotificationManager::new(),
            DispatchConfig::default(),
        );

        assert!(ack.acknowledge(signal.id, true).await.unwrap().is_none());
        assert_eq!(status_of(&f.repo, signal.id).await, SignalStatus::Pending);
    }
}
