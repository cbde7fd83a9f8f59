//! 이벤트 버스.
//!
//! 이벤트 종류별로 핸들러를 등록하고, 발행 시 구독 핸들러 전체를 동시에
//! 실행한 뒤 모두 끝나면 돌아옵니다. 한 핸들러의 에러나 패닉은 다른 핸들러와
//! 발행자에게 번지지 않습니다.
//!
//! ```text
//! publish(event)
//!   ├─ id / timestamp 부여
//!   ├─ 이벤트 저장소에 추가 (설정 시, 용량 초과분은 오래된 것부터 버림)
//!   ├─ can_handle 통과한 핸들러 동시 실행 → 에러/패닉 격리
//!   ├─ 지연 시간/에러 지표 갱신
//!   └─ wait_for_event 대기자에게 전달
//! ```

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use signal_core::{Clock, EventBusConfig, Signal, SignalStatus, SystemClock};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::telemetry;

/// 평균 지연 계산에 쓰는 최근 처리 건수.
const LATENCY_WINDOW: usize = 100;
/// 이 비율을 넘는 핸들러 에러율은 비정상.
const MAX_HEALTHY_ERROR_RATE: f64 = 0.1;
/// 에러율을 판단하기 위한 최소 처리 건수.
const MIN_INVOCATIONS_FOR_ERROR_RATE: u64 = 10;
const MAX_HEALTHY_LATENCY: Duration = Duration::from_secs(1);
/// 한 이벤트 종류에 이보다 많은 핸들러가 붙으면 등록 누수로 봅니다.
const MAX_HANDLERS_PER_KIND: usize = 32;

/// 이벤트 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SignalGenerated,
    SignalExecuted,
    SignalDispatched,
    ExchangeHealthChanged,
    CycleCompleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::SignalGenerated => "signal_generated",
            EventKind::SignalExecuted => "signal_executed",
            EventKind::SignalDispatched => "signal_dispatched",
            EventKind::ExchangeHealthChanged => "exchange_health_changed",
            EventKind::CycleCompleted => "cycle_completed",
        };
        f.write_str(s)
    }
}

/// 파이프라인 이벤트.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// 새 PENDING 시그널이 저장됨
    SignalGenerated { signal: Signal },
    /// 실행 측 결과 통지
    SignalExecuted {
        signal_id: Uuid,
        success: bool,
        detail: Option<String>,
    },
    /// 발송 처리 결과
    SignalDispatched {
        signal_id: Uuid,
        status: SignalStatus,
    },
    ExchangeHealthChanged {
        exchange: String,
        score: u8,
        connected: bool,
        /// 모니터의 최소 점수 기준을 넘는지
        healthy: bool,
    },
    CycleCompleted {
        processed: usize,
        signals: usize,
        errors: usize,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::SignalGenerated { .. } => EventKind::SignalGenerated,
            Event::SignalExecuted { .. } => EventKind::SignalExecuted,
            Event::SignalDispatched { .. } => EventKind::SignalDispatched,
            Event::ExchangeHealthChanged { .. } => EventKind::ExchangeHealthChanged,
            Event::CycleCompleted { .. } => EventKind::CycleCompleted,
        }
    }
}

/// id와 시각이 붙은 이벤트.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl EventEnvelope {
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

/// 이벤트 핸들러.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 지표와 로그에 쓰는 이름. 구독 해제 키이기도 합니다.
    fn name(&self) -> &str;

    /// 이 이벤트를 처리할지 여부. 기본은 전부 처리.
    fn can_handle(&self, _event: &EventEnvelope) -> bool {
        true
    }

    async fn handle(&self, event: &EventEnvelope) -> EngineResult<()>;
}

/// 발행 한 건의 처리 요약.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishSummary {
    pub event_id: Uuid,
    pub kind: EventKind,
    /// 성공한 핸들러 이름
    pub handled: Vec<String>,
    /// `can_handle`로 건너뛴 핸들러 이름
    pub skipped: Vec<String>,
    /// (핸들러 이름, 에러)
    pub failed: Vec<(String, String)>,
}

impl PublishSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 버스 지표 스냅샷.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventBusMetrics {
    pub events_published: u64,
    pub handler_invocations: u64,
    pub handler_errors: u64,
    /// 최근 처리 건의 평균 핸들러 지연
    pub average_latency: Duration,
    pub events_by_kind: HashMap<EventKind, u64>,
    pub stored_events: usize,
}

impl EventBusMetrics {
    pub fn error_rate(&self) -> f64 {
        if self.handler_invocations == 0 {
            0.0
        } else {
            self.handler_errors as f64 / self.handler_invocations as f64
        }
    }
}

/// 버스 헬스 판정.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventBusHealth {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub handler_count: usize,
}

#[derive(Default)]
struct MetricsState {
    published: u64,
    invocations: u64,
    errors: u64,
    latencies: VecDeque<Duration>,
    by_kind: HashMap<EventKind, u64>,
}

impl MetricsState {
    fn record_latency(&mut self, latency: Duration) {
        if self.latencies.len() == LATENCY_WINDOW {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency);
    }

    fn average_latency(&self) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        self.latencies.iter().sum::<Duration>() / self.latencies.len() as u32
    }
}

type HandlerMap = HashMap<EventKind, Vec<Arc<dyn EventHandler>>>;

/// 이벤트 버스.
pub struct EventBus {
    config: EventBusConfig,
    handlers: RwLock<HandlerMap>,
    store: Mutex<VecDeque<EventEnvelope>>,
    metrics: Mutex<MetricsState>,
    waiters: broadcast::Sender<EventEnvelope>,
    clock: Arc<dyn Clock>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let (waiters, _) = broadcast::channel(config.waiter_capacity.max(1));
        Self {
            config,
            handlers: RwLock::new(HashMap::new()),
            store: Mutex::new(VecDeque::new()),
            metrics: Mutex::new(MetricsState::default()),
            waiters,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 핸들러를 이벤트 종류에 등록합니다.
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        debug!(kind = %kind, handler = handler.name(), "Handler subscribed");
        self.handlers
            .write()
            .unwrap()
            .entry(kind)
            .or_default()
            .push(handler);
    }

    /// 이름으로 핸들러 등록을 해제합니다. 해제했으면 true.
    pub fn unsubscribe(&self, kind: EventKind, name: &str) -> bool {
        let mut handlers = self.handlers.write().unwrap();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };

        let before = list.len();
        list.retain(|h| h.name() != name);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(&kind);
        }
        removed
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap()
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// 이벤트를 발행하고 구독 핸들러가 모두 끝날 때까지 기다립니다.
    pub async fn publish(&self, event: Event) -> PublishSummary {
        let envelope = EventEnvelope {
            id: Uuid::new_v4(),
            timestamp: self.clock.now(),
            event,
        };
        let kind = envelope.kind();

        self.store_event(&envelope);

        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let (eligible, skipped): (Vec<_>, Vec<_>) =
            handlers.into_iter().partition(|h| h.can_handle(&envelope));

        let runs = eligible.iter().map(|handler| {
            let envelope = &envelope;
            async move {
                let started = Instant::now();
                let result = AssertUnwindSafe(handler.handle(envelope))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(EngineError::HandlerPanicked(panic_message(&*panic)))
                    });
                (handler.name().to_string(), result, started.elapsed())
            }
        });
        let results = join_all(runs).await;

        let mut summary = PublishSummary {
            event_id: envelope.id,
            kind,
            handled: Vec::new(),
            skipped: skipped.iter().map(|h| h.name().to_string()).collect(),
            failed: Vec::new(),
        };

        {
            let mut metrics = self.metrics.lock().unwrap();
            metrics.published += 1;
            *metrics.by_kind.entry(kind).or_default() += 1;
            telemetry::record_event_published(kind);

            for (name, result, latency) in results {
                metrics.invocations += 1;
                metrics.record_latency(latency);
                telemetry::record_handler_invocation(kind, &name, latency, result.is_ok());

                match result {
                    Ok(()) => summary.handled.push(name),
                    Err(e) => {
                        metrics.errors += 1;
                        error!(
                            event_id = %envelope.id,
                            kind = %kind,
                            handler = %name,
                            error = %e,
                            "Event handler failed"
                        );
                        summary.failed.push((name, e.to_string()));
                    }
                }
            }
        }

        if summary.handled.is_empty() && summary.failed.is_empty() {
            debug!(event_id = %envelope.id, kind = %kind, "No handler processed event");
        }

        // 대기자가 없으면 에러지만 무시해도 됨
        let _ = self.waiters.send(envelope);

        summary
    }

    fn store_event(&self, envelope: &EventEnvelope) {
        if !self.config.store_events || self.config.store_capacity == 0 {
            return;
        }

        match self.store.lock() {
            Ok(mut store) => {
                if store.len() >= self.config.store_capacity {
                    store.pop_front();
                }
                store.push_back(envelope.clone());
            }
            Err(_) => warn!(event_id = %envelope.id, "Event store unavailable, event not stored"),
        }
    }

    /// 저장된 이벤트 (오래된 것부터). 종류를 주면 그 종류만.
    pub fn stored_events(&self, kind: Option<EventKind>) -> Vec<EventEnvelope> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind() == k))
            .cloned()
            .collect()
    }

    pub fn metrics(&self) -> EventBusMetrics {
        let metrics = self.metrics.lock().unwrap();
        EventBusMetrics {
            events_published: metrics.published,
            handler_invocations: metrics.invocations,
            handler_errors: metrics.errors,
            average_latency: metrics.average_latency(),
            events_by_kind: metrics.by_kind.clone(),
            stored_events: self.store.lock().unwrap().len(),
        }
    }

    /// 에러율, 평균 지연, 핸들러 수로 상태를 판정합니다.
    pub fn health(&self) -> EventBusHealth {
        let metrics = self.metrics();
        let handlers = self.handlers.read().unwrap();
        let handler_count: usize = handlers.values().map(Vec::len).sum();
        let mut issues = Vec::new();

        if metrics.handler_invocations >= MIN_INVOCATIONS_FOR_ERROR_RATE
            && metrics.error_rate() > MAX_HEALTHY_ERROR_RATE
        {
            issues.push(format!(
                "handler error rate {:.1}%",
                metrics.error_rate() * 100.0
            ));
        }
        if metrics.average_latency > MAX_HEALTHY_LATENCY {
            issues.push(format!(
                "average handler latency {}ms",
                metrics.average_latency.as_millis()
            ));
        }
        if handler_count == 0 {
            issues.push("no handlers registered".to_string());
        }
        for (kind, list) in handlers.iter() {
            if list.len() > MAX_HANDLERS_PER_KIND {
                issues.push(format!("{} handlers registered for {}", list.len(), kind));
            }
        }

        EventBusHealth {
            healthy: issues.is_empty(),
            issues,
            handler_count,
        }
    }

    /// 조건에 맞는 이벤트가 발행될 때까지 기다립니다. 시간 초과면 `None`.
    ///
    /// 처음 poll된 이후 발행된 이벤트만 봅니다.
    pub async fn wait_for_event<F>(
        &self,
        kind: EventKind,
        predicate: F,
        timeout: Duration,
    ) -> Option<EventEnvelope>
    where
        F: Fn(&EventEnvelope) -> bool,
    {
        let mut rx = self.waiters.subscribe();

        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(envelope) if envelope.kind() == kind && predicate(&envelope) => {
                        return Some(envelope)
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event waiter lagged behind");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
