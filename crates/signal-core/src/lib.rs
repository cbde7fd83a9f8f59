//! # Signal Core
//!
//! 시그널 파이프라인의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 파이프라인 전반에서 사용되는 기본 타입을 제공합니다:
//! - 캔들/시세 데이터 구조체
//! - 시그널과 상태 전이 규칙
//! - 전략 파라미터와 종목 카테고리
//! - 타임프레임 및 거래쌍 정의
//! - 설정 관리
//! - 로깅 인프라
//! - 테스트 가능한 시계 추상화

pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
