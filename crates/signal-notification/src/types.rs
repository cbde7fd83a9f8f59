//! 알림 타입 및 trait 정의.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use signal_core::{Direction, Signal, SignalError, SignalStatus, Timeframe, TradingPair};
use uuid::Uuid;

/// 알림 우선순위 레벨.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    /// 낮은 우선순위 (정보성)
    Low,
    /// 일반 우선순위
    #[default]
    Normal,
    /// 높은 우선순위 (강한 시그널)
    High,
    /// 긴급 우선순위 (즉시 대응 필요)
    Critical,
}

/// 알림 이벤트 타입.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// 새 트레이딩 시그널
    SignalAlert {
        signal_id: Uuid,
        pair: TradingPair,
        exchange: String,
        direction: Direction,
        entry: Decimal,
        stop_loss: Decimal,
        targets: Vec<Decimal>,
        confidence: f64,
        strategy: String,
        timeframe: Timeframe,
        reasoning: Vec<String>,
    },
    /// 시그널 체결/실패 결과
    SignalOutcome {
        signal_id: Uuid,
        pair: TradingPair,
        status: SignalStatus,
    },
    /// 거래소 상태 저하
    ExchangeDegraded {
        exchange: String,
        health_score: u8,
        reason: String,
    },
    /// 사용자 정의 알림
    Custom { title: String, message: String },
}

/// 알림 메시지.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// 고유 알림 ID
    pub id: String,
    pub event: NotificationEvent,
    pub priority: NotificationPriority,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// 새 알림을 생성합니다.
    pub fn new(event: NotificationEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event,
            priority: NotificationPriority::Normal,
            timestamp: Utc::now(),
        }
    }

    /// 시그널 알림. 신뢰도 7.5 이상이면 높은 우선순위입니다.
    pub fn for_signal(signal: &Signal) -> Self {
        let priority = if signal.confidence >= 7.5 {
            NotificationPriority::High
        } else {
            NotificationPriority::Normal
        };

        Self::new(NotificationEvent::SignalAlert {
            signal_id: signal.id,
            pair: signal.pair.clone(),
            exchange: signal.exchange.clone(),
            direction: signal.direction,
            entry: signal.entry_price,
            stop_loss: signal.stop_loss,
            targets: signal.take_profits.clone(),
            confidence: signal.confidence,
            strategy: signal.strategy_name.clone(),
            timeframe: signal.timeframe,
            reasoning: signal.reasoning.clone(),
        })
        .with_priority(priority)
        .at(signal.created_at)
    }

    /// 우선순위 레벨을 설정합니다.
    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 이 알림이 가리키는 시그널 ID.
    pub fn signal_id(&self) -> Option<Uuid> {
        match &self.event {
            NotificationEvent::SignalAlert { signal_id, .. }
            | NotificationEvent::SignalOutcome { signal_id, .. } => Some(*signal_id),
            _ => None,
        }
    }
}

/// 알림 작업용 Result 타입.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// 알림 에러.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("알림 전송 실패: {0}")]
    SendFailed(String),

    #[error("잘못된 설정: {0}")]
    InvalidConfig(String),

    #[error("요청 한도 초과: {0}초 후 재시도")]
    RateLimited(u64),

    #[error("활성화된 알림 채널 없음")]
    NoChannels,

    #[error("네트워크 에러: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("직렬화 에러: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<NotificationError> for SignalError {
    fn from(err: NotificationError) -> Self {
        SignalError::NotificationDelivery(err.to_string())
    }
}

/// 알림 전송기 trait.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 알림을 전송합니다.
    async fn send(&self, notification: &Notification) -> NotificationResult<()>;

    /// 시그널 알림을 전송합니다.
    async fn send_signal_notification(&self, signal: &Signal) -> NotificationResult<()> {
        self.send(&Notification::for_signal(signal)).await
    }

    /// 전송기가 활성화되어 있는지 확인합니다.
    fn is_enabled(&self) -> bool;

    /// 전송기 이름을 반환합니다.
    fn name(&self) -> &str;
}
