//! 로그 채널. 알림을 tracing 이벤트로 남깁니다.

use async_trait::async_trait;
use tracing::info;

use crate::types::{Notification, NotificationEvent, NotificationResult, NotificationSender};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        match &notification.event {
            NotificationEvent::SignalAlert {
                signal_id,
                pair,
                exchange,
                direction,
                entry,
                stop_loss,
                confidence,
                ..
            } => info!(
                signal_id = %signal_id,
                symbol = %pair,
                exchange = %exchange,
                direction = %direction,
                entry = %entry,
                stop_loss = %stop_loss,
                confidence,
                "Signal notification"
            ),
            event => {
                let payload = serde_json::to_string(event)?;
                info!(notification_id = %notification.id, %payload, "Notification");
            }
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "log"
    }
}
