//! 시그널 전략 계층.
//!
//! 이 크레이트가 제공하는 기능:
//! - 타임프레임 분류별 기본 전략 템플릿
//! - 종목 카테고리에 따른 전략 조정 (순수 함수)
//! - 지표 스냅샷을 LONG/SHORT 조건 점수로 평가하는 시그널 스코어러
//! - 종목별 쿨다운 게이트
//!
//! # 예제
//!
//! ```rust,ignore
//! use signal_core::{InstrumentCategory, Timeframe};
//! use signal_strategy::StrategyAdapter;
//!
//! let adapter = StrategyAdapter::default();
//! let adapted = adapter.adapt_for(Timeframe::H4, InstrumentCategory::Meme);
//! assert_eq!(adapted.min_signal_strength, 5);
//! ```

pub mod adaptation;
pub mod cooldown;
pub mod scorer;
pub mod templates;

pub use adaptation::{adapt, CategoryProfile, StrategyAdapter};
pub use cooldown::{record_signal, should_signal};
pub use scorer::{
    confidence_for, evaluate, generate_signal, risk_levels, score_direction, ConditionCheck,
    Evaluation,
};
pub use templates::base_template;
