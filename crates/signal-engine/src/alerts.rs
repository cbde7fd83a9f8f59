//! 거래소 상태 알림 핸들러.
//!
//! `ExchangeHealthChanged`를 받아 거래소가 정상에서 비정상으로 바뀔 때 한 번만
//! `ExchangeDegraded` 알림을 보냅니다. 비정상이 이어지는 동안은 다시 보내지
//! 않고, 회복되면 상태만 되돌립니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use signal_core::{Clock, SystemClock};
use signal_notification::{
    Notification, NotificationEvent, NotificationManager, NotificationPriority,
};
use tracing::{info, warn};

use crate::error::EngineResult;
use crate::event_bus::{Event, EventEnvelope, EventHandler};

pub struct ExchangeHealthNotifier {
    notifier: NotificationManager,
    /// 거래소별 마지막으로 본 정상 여부
    last_healthy: Mutex<HashMap<String, bool>>,
    clock: Arc<dyn Clock>,
}

impl ExchangeHealthNotifier {
    pub fn new(notifier: NotificationManager) -> Self {
        Self {
            notifier,
            last_healthy: Mutex::new(HashMap::new()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 상태를 기록하고, 새로 비정상이 되었으면 `true`.
    fn record(&self, exchange: &str, healthy: bool) -> bool {
        let previous = self
            .last_healthy
            .lock()
            .unwrap()
            .insert(exchange.to_string(), healthy);
        !healthy && previous != Some(false)
    }
}

#[async_trait]
impl EventHandler for ExchangeHealthNotifier {
    fn name(&self) -> &str {
        "exchange-health-alert"
    }

    fn can_handle(&self, event: &EventEnvelope) -> bool {
        matches!(event.event, Event::ExchangeHealthChanged { .. })
    }

    async fn handle(&self, event: &EventEnvelope) -> EngineResult<()> {
        let Event::ExchangeHealthChanged {
            exchange,
            score,
            connected,
            healthy,
        } = &event.event
        else {
            return Ok(());
        };

        if !self.record(exchange, *healthy) {
            if *healthy {
                info!(exchange = %exchange, score, "Exchange healthy");
            }
            return Ok(());
        }

        let reason = if *connected {
            format!("health score {score} below threshold")
        } else {
            "connection lost".to_string()
        };
        let priority = if *connected {
            NotificationPriority::High
        } else {
            NotificationPriority::Critical
        };
        let alert = Notification::new(NotificationEvent::ExchangeDegraded {
            exchange: exchange.clone(),
            health_score: *score,
            reason,
        })
        .with_priority(priority)
        .at(self.clock.now());

        let report = self.notifier.notify(&alert).await;
        if !report.is_delivered() {
            warn!(exchange = %exchange, "Exchange degraded alert not delivered");
        }
        Ok(())
    }
}
