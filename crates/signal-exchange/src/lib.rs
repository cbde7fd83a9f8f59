//! 거래소 접근 계층.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - `ExchangeClient` trait: 저수준 거래소 클라이언트 인터페이스
//! - Binance REST 커넥터
//! - 시뮬레이션 클라이언트 (테스트 및 드라이런용)
//! - `ExchangeAdapter`: 요청 한도 추적, 호출 간격 조절, 타임아웃, 헬스 점수,
//!   캔들 정규화를 담당하는 유일한 거래소 진입점

pub mod adapter;
pub mod connector;
pub mod error;
pub mod health;
pub mod simulated;
pub mod traits;

pub use adapter::{AdapterConfig, ExchangeAdapter};
pub use connector::binance::{BinanceClient, BinanceConfig};
pub use error::*;
pub use health::{ExchangeHealth, RateBudget};
pub use simulated::SimulatedClient;
pub use traits::*;
