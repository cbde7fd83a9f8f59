//! 파이프라인 공통 에러 타입.
//!
//! 거래소, 저장소, 알림 계층의 에러는 각 크레이트에서 정의하되,
//! 모니터가 로그와 재시도 판단에 쓰는 분류는 여기로 모입니다.

use thiserror::Error;
use uuid::Uuid;

/// 파이프라인 핵심 에러.
#[derive(Debug, Error)]
pub enum SignalError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 요청 타임아웃
    #[error("요청 타임아웃: {0}")]
    Timeout(String),

    /// 인증 에러
    #[error("인증 에러: {0}")]
    Authentication(String),

    /// 요청 한도 초과
    #[error("요청 한도 초과, {retry_after_ms}ms 후 재시도")]
    RateLimit { retry_after_ms: u64 },

    /// 외부 API 에러
    #[error("외부 API 에러: {0}")]
    ExternalApi(String),

    /// 낙관적 잠금 충돌
    #[error("저장 충돌: {0}")]
    PersistenceConflict(String),

    /// 저장소 에러
    #[error("저장소 에러: {0}")]
    Persistence(String),

    /// 알림 전송 실패
    #[error("알림 전송 실패: {0}")]
    NotificationDelivery(String),

    /// 잘못된 상태 전이
    #[error("잘못된 상태 전이: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// 시그널을 찾을 수 없음
    #[error("시그널을 찾을 수 없음: {0}")]
    SignalNotFound(Uuid),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 파이프라인 작업을 위한 Result 타입.
pub type SignalResult<T> = Result<T, SignalError>;

impl SignalError {
    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SignalError::Network(_)
                | SignalError::Timeout(_)
                | SignalError::RateLimit { .. }
                | SignalError::PersistenceConflict(_)
        )
    }

    /// 해당 거래소를 계속 폴링하면 안 되는 에러인지 확인합니다.
    pub fn is_critical(&self) -> bool {
        matches!(self, SignalError::Authentication(_) | SignalError::Config(_))
    }
}

impl From<serde_json::Error> for SignalError {
    fn from(err: serde_json::Error) -> Self {
        SignalError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for SignalError {
    fn from(err: config::ConfigError) -> Self {
        SignalError::Config(err.to_string())
    }
}
