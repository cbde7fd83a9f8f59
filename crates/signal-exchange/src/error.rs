//! 거래소 에러 타입.
//!
//! 모든 전송 계층 에러는 다섯 가지로 정규화됩니다.

use signal_core::SignalError;
use thiserror::Error;

/// 거래소 관련 에러.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 요청 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 인증/권한 에러
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimit { retry_after_ms: u64 },

    /// 거래소가 돌려준 기타 에러 (응답 파싱 실패 포함)
    #[error("External API error {code:?}: {message}")]
    ExternalApi { code: Option<i32>, message: String },
}

impl ExchangeError {
    /// 코드 없는 외부 API 에러.
    pub fn external(message: impl Into<String>) -> Self {
        ExchangeError::ExternalApi {
            code: None,
            message: message.into(),
        }
    }

    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::Network(_) | ExchangeError::Timeout(_) | ExchangeError::RateLimit { .. }
        )
    }

    /// 메트릭 라벨용 분류 이름.
    pub fn kind(&self) -> &'static str {
        match self {
            ExchangeError::Network(_) => "network",
            ExchangeError::Timeout(_) => "timeout",
            ExchangeError::Authentication(_) => "authentication",
            ExchangeError::RateLimit { .. } => "rate_limit",
            ExchangeError::ExternalApi { .. } => "external_api",
        }
    }

    /// 연결이 끊겼다고 봐야 하는 에러인지 확인.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, ExchangeError::Network(_))
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            ExchangeError::Network(err.to_string())
        } else if err.is_decode() {
            ExchangeError::external(err.to_string())
        } else {
            ExchangeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::external(format!("parse error: {}", err))
    }
}

impl From<ExchangeError> for SignalError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Network(msg) => SignalError::Network(msg),
            ExchangeError::Timeout(msg) => SignalError::Timeout(msg),
            ExchangeError::Authentication(msg) => SignalError::Authentication(msg),
            ExchangeError::RateLimit { retry_after_ms } => SignalError::RateLimit { retry_after_ms },
            ExchangeError::ExternalApi { .. } => SignalError::ExternalApi(err.to_string()),
        }
    }
}
