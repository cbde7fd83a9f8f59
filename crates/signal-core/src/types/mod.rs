//! 기본 타입 정의.

pub mod pair;
pub mod timeframe;

pub use pair::*;
pub use timeframe::*;
