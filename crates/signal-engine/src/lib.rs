//! # Signal Engine
//!
//! 감시 루프와 시그널 발송 파이프라인.
//!
//! - `SignalMonitor`: 종목별 헬스 확인 → 캔들 → 지표 → 점수 → 쿨다운 → 저장/발행
//! - `EventBus`: 종류별 핸들러 등록, 동시 실행, 장애 격리, 지표/헬스
//! - `SignalDispatchHandler`: PENDING → SENT/FAILED 상태 기계
//! - `ExecutionAckHandler`: SENT → EXECUTED/FAILED
//! - `ExchangeHealthNotifier`: 거래소 상태 저하 알림
//! - 저장소 trait과 메모리 구현
//! - `PipelineBuilder`: 설정에서 전체 파이프라인 조립
//! - `telemetry`: Prometheus 메트릭

pub mod alerts;
pub mod bootstrap;
pub mod dispatch;
pub mod error;
pub mod event_bus;
pub mod monitor;
pub mod repository;
pub mod telemetry;

pub use alerts::ExchangeHealthNotifier;
pub use bootstrap::{Pipeline, PipelineBuilder};
pub use dispatch::{
    DispatchOutcome, ExecutionAckHandler, RecordingSleeper, SignalDispatchHandler, SkipReason,
    Sleeper, TokioSleeper,
};
pub use error::{EngineError, EngineResult};
pub use event_bus::{
    Event, EventBus, EventBusHealth, EventBusMetrics, EventEnvelope, EventHandler, EventKind,
    PublishSummary,
};
pub use monitor::{CycleReport, InstrumentOutcome, SignalMonitor};
pub use repository::{
    InMemoryInstrumentRepository, InMemorySignalRepository, InstrumentRepository,
    RepositoryError, RepositoryResult, SignalRepository,
};
