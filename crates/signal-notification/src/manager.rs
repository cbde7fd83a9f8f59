//! 여러 채널을 묶는 알림 관리자.

use std::sync::Arc;

use serde::Serialize;
use signal_core::{NotificationConfig, Signal};
use tracing::{error, warn};

use crate::log_sender::LogSender;
use crate::telegram::TelegramSender;
use crate::types::{Notification, NotificationError, NotificationResult, NotificationSender};

/// 채널 하나의 전송 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelOutcome {
    pub channel: String,
    /// 실패 시 에러 메시지
    pub error: Option<String>,
}

impl ChannelOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// 알림 한 건에 대한 채널별 결과.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub outcomes: Vec<ChannelOutcome>,
}

impl DeliveryReport {
    /// 한 채널이라도 성공했으면 전달된 것으로 봅니다. 시도한 채널이 없으면 실패.
    pub fn is_delivered(&self) -> bool {
        self.outcomes.iter().any(ChannelOutcome::is_success)
    }

    pub fn failed_channels(&self) -> impl Iterator<Item = &ChannelOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// 전달 실패를 에러로 바꿉니다.
    pub fn into_result(self) -> NotificationResult<Self> {
        if self.is_delivered() {
            return Ok(self);
        }
        if self.outcomes.is_empty() {
            return Err(NotificationError::NoChannels);
        }

        let reasons = self
            .outcomes
            .iter()
            .map(|o| format!("{}: {}", o.channel, o.error.as_deref().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("; ");
        Err(NotificationError::SendFailed(reasons))
    }
}

/// 여러 전송기를 관리하는 알림 관리자.
#[derive(Clone, Default)]
pub struct NotificationManager {
    senders: Vec<Arc<dyn NotificationSender>>,
}

impl NotificationManager {
    /// 새 알림 관리자를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정에 따라 로그/텔레그램 채널을 구성합니다.
    pub fn from_config(config: &NotificationConfig) -> Self {
        let mut manager = Self::new();
        if config.log_channel {
            manager.add_sender(LogSender);
        }
        if config.telegram.enabled {
            let telegram = TelegramSender::from_config(&config.telegram);
            if telegram.is_enabled() {
                manager.add_sender(telegram);
            } else {
                warn!("Telegram enabled but bot token or chat id missing, channel skipped");
            }
        }
        manager
    }

    /// 알림 전송기를 추가합니다.
    pub fn add_sender<S: NotificationSender + 'static>(&mut self, sender: S) {
        self.senders.push(Arc::new(sender));
    }

    pub fn add_shared(&mut self, sender: Arc<dyn NotificationSender>) {
        self.senders.push(sender);
    }

    /// 활성 채널 이름.
    pub fn channels(&self) -> Vec<&str> {
        self.senders
            .iter()
            .filter(|s| s.is_enabled())
            .map(|s| s.name())
            .collect()
    }

    /// 활성화된 모든 전송기로 한 번씩 전송합니다.
    pub async fn notify(&self, notification: &Notification) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for sender in self.senders.iter().filter(|s| s.is_enabled()) {
            let error = match sender.send(notification).await {
                Ok(()) => None,
                Err(e) => {
                    error!(
                        channel = sender.name(),
                        notification_id = %notification.id,
                        error = %e,
                        "Failed to send notification"
                    );
                    Some(e.to_string())
                }
            };
            report.outcomes.push(ChannelOutcome {
                channel: sender.name().to_string(),
                error,
            });
        }

        if report.outcomes.is_empty() {
            warn!(notification_id = %notification.id, "No enabled notification channels");
        }
        report
    }

    /// 시그널 알림을 전송합니다.
    pub async fn notify_signal(&self, signal: &Signal) -> DeliveryReport {
        self.notify(&Notification::for_signal(signal)).await
    }
}
