//! # Signal Analytics
//!
//! 가격 시계열에 대한 기술적 지표 계산과, 폴링 사이클마다 새로 만드는
//! 지표 스냅샷을 제공합니다. 모든 함수는 순수 함수이며 I/O가 없습니다.

pub mod indicators;
pub mod snapshot;

pub use indicators::{
    bollinger_bands, ema, macd, rsi, BollingerBand, IndicatorError, IndicatorResult, MacdSeries,
};
pub use snapshot::{IndicatorSnapshot, VOLUME_AVERAGE_PERIOD};
