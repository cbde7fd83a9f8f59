//! 기술적 지표.
//!
//! # 지원 지표
//!
//! - **EMA**: 지수 이동평균 (첫 값으로 시드)
//! - **MACD**: 이동평균 수렴/확산
//! - **RSI**: 상대강도지수 (Wilder 평활)
//! - **Bollinger Bands**: 볼린저 밴드 (모표준편차)
//!
//! 입력이 짧으면 에러 대신 빈 결과를 돌려줍니다. 에러는 파라미터 자체가
//! 잘못된 경우에만 발생합니다.
//!
//! # 사용 예시
//!
//! ```
//! use rust_decimal_macros::dec;
//! use signal_analytics::indicators::{ema, rsi};
//!
//! let prices = vec![dec!(10), dec!(11), dec!(12), dec!(11)];
//! assert_eq!(ema(&prices, 3).len(), 4);
//! assert!(rsi(&prices, 14).is_empty());
//! ```

pub mod momentum;
pub mod trend;
pub mod volatility;

use thiserror::Error;

pub use momentum::rsi;
pub use trend::{ema, macd, MacdSeries};
pub use volatility::{bollinger_bands, BollingerBand};

/// 지표 계산 오류.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndicatorError {
    /// 잘못된 파라미터
    #[error("잘못된 파라미터: {0}")]
    InvalidParameter(String),
}

/// 지표 계산 결과 타입.
pub type IndicatorResult<T> = Result<T, IndicatorError>;
