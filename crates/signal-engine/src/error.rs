//! 엔진 에러 타입.

use signal_analytics::IndicatorError;
use signal_core::SignalError;
use signal_exchange::ExchangeError;
use signal_notification::NotificationError;
use thiserror::Error;
use uuid::Uuid;

use crate::repository::RepositoryError;

/// 엔진 작업 Result 타입.
pub type EngineResult<T> = Result<T, EngineError>;

/// 모니터, 디스패처, 이벤트 핸들러 에러.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("거래소 에러: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("저장소 에러: {0}")]
    Repository(#[from] RepositoryError),

    #[error("지표 계산 에러: {0}")]
    Indicator(#[from] IndicatorError),

    #[error("알림 에러: {0}")]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error("등록되지 않은 거래소: {0}")]
    UnknownExchange(String),

    #[error("잘못된 종목 설정: {0}")]
    InvalidInstrument(String),

    #[error("시그널 발송 실패: {signal_id} ({reason})")]
    DispatchFailed { signal_id: Uuid, reason: String },

    #[error("핸들러 패닉: {0}")]
    HandlerPanicked(String),
}
