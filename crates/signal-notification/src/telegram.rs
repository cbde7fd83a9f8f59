//! 텔레그램 알림 서비스.
//!
//! Telegram Bot API로 시그널 알림을 전송합니다.

use async_trait::async_trait;
use serde::Deserialize;
use signal_core::{Direction, SignalStatus, TelegramConfig};
use tracing::{debug, error, info, warn};

use crate::types::{
    Notification, NotificationError, NotificationEvent, NotificationPriority, NotificationResult,
    NotificationSender,
};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
/// 429 응답에 재시도 시간이 없을 때 쓰는 값 (초).
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct TelegramErrorBody {
    #[serde(default)]
    description: String,
    parameters: Option<TelegramErrorParameters>,
}

#[derive(Debug, Deserialize)]
struct TelegramErrorParameters {
    retry_after: Option<u64>,
}

/// 텔레그램 알림 전송기.
pub struct TelegramSender {
    bot_token: String,
    chat_id: String,
    enabled: bool,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramSender {
    /// 새 텔레그램 전송기를 생성합니다.
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            enabled: true,
            api_base: TELEGRAM_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// 설정에서 전송기를 생성합니다.
    pub fn from_config(config: &TelegramConfig) -> Self {
        let mut sender = Self::new(config.bot_token.clone(), config.chat_id.clone());
        sender.enabled = config.enabled;
        sender
    }

    /// API 기본 URL을 바꿉니다 (테스트용).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// 알림을 텔레그램 HTML 메시지로 포맷합니다.
    pub fn format_message(&self, notification: &Notification) -> String {
        let priority_emoji = match notification.priority {
            NotificationPriority::Low => "ℹ️",
            NotificationPriority::Normal => "📊",
            NotificationPriority::High => "🔥",
            NotificationPriority::Critical => "🚨",
        };

        let content = match &notification.event {
            NotificationEvent::SignalAlert {
                signal_id,
                pair,
                exchange,
                direction,
                entry,
                stop_loss,
                targets,
                confidence,
                strategy,
                timeframe,
                reasoning,
            } => {
                let direction_emoji = match direction {
                    Direction::Long => "🟢",
                    Direction::Short => "🔴",
                };
                let targets_text = targets
                    .iter()
                    .enumerate()
                    .map(|(i, tp)| format!("TP{}: {}", i + 1, tp))
                    .collect::<Vec<_>>()
                    .join("\n");
                let reasons = reasoning
                    .iter()
                    .map(|r| format!("• {}", escape_html(r)))
                    .collect::<Vec<_>>()
                    .join("\n");

                format!(
                    "{direction_emoji} <b>{direction} 시그널</b> {priority_emoji}\n\n\
                     심볼: <code>{pair}</code> ({exchange}, {timeframe})\n\
                     진입가: {entry}\n\
                     손절가: {stop_loss}\n\
                     {targets_text}\n\
                     신뢰도: {confidence:.1}/10\n\
                     전략: {strategy}\n\n\
                     {reasons}\n\n\
                     ID: <code>{signal_id}</code>"
                )
            }

            NotificationEvent::SignalOutcome {
                signal_id,
                pair,
                status,
            } => {
                let emoji = match status {
                    SignalStatus::Executed => "✅",
                    SignalStatus::Failed => "❌",
                    _ => "📍",
                };
                format!(
                    "{emoji} <b>시그널 {status}</b>\n\n\
                     심볼: <code>{pair}</code>\n\
                     ID: <code>{signal_id}</code>"
                )
            }

            NotificationEvent::ExchangeDegraded {
                exchange,
                health_score,
                reason,
            } => {
                let reason = escape_html(reason);
                format!(
                    "⚠️ <b>거래소 상태 저하</b>\n\n\
                     거래소: {exchange}\n\
                     헬스 점수: {health_score}\n\
                     사유: {reason}"
                )
            }

            NotificationEvent::Custom { title, message } => {
                let title = escape_html(title);
                let message = escape_html(message);
                format!("{priority_emoji} <b>{title}</b>\n\n{message}")
            }
        };

        let timestamp = notification.timestamp.format("%Y-%m-%d %H:%M:%S UTC");
        format!("{content}\n\n<i>🕐 {timestamp}</i>")
    }

    /// 텔레그램에 원시 메시지를 전송합니다.
    async fn send_message(&self, text: &str) -> NotificationResult<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let params = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        debug!(chat_id = %self.chat_id, "Sending Telegram message");

        let response = self.client.post(&url).json(&params).send().await?;

        let status = response.status();
        if status.is_success() {
            info!("Telegram notification sent successfully");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<TelegramErrorBody>(&body).ok();

        if status.as_u16() == 429 {
            let retry_after = parsed
                .and_then(|b| b.parameters)
                .and_then(|p| p.retry_after)
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            warn!(retry_after, "Telegram rate limited");
            return Err(NotificationError::RateLimited(retry_after));
        }

        let description = parsed.map(|b| b.description).unwrap_or(body);
        error!(%status, %description, "Failed to send Telegram message");
        Err(NotificationError::SendFailed(format!(
            "HTTP {}: {}",
            status, description
        )))
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        if !self.is_enabled() {
            return Err(NotificationError::InvalidConfig(
                "telegram sender is disabled".to_string(),
            ));
        }

        let message = self.format_message(notification);
        self.send_message(&message).await
    }

    fn is_enabled(&self) -> bool {
        self.enabled && !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }

    fn name(&self) -> &str {
        "telegram"
    }
}
