//! 시그널/종목 저장소.
//!
//! 시그널 저장은 낙관적 잠금을 씁니다. 저장 요청의 `version`이 저장된 값과
//! 다르면 `RepositoryError::Conflict`를 돌려주고, 성공하면 버전을 1 올립니다.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use signal_core::{InstrumentContext, Signal, SignalError, SignalStatus};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// 저장소 Result 타입.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// 저장소 에러.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// 다른 쓰기가 먼저 반영됨
    #[error("버전 충돌: {id} (기대 {expected}, 실제 {actual})")]
    Conflict {
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("레코드를 찾을 수 없음: {0}")]
    NotFound(String),

    #[error("저장소 에러: {0}")]
    Storage(String),
}

impl RepositoryError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, RepositoryError::Conflict { .. })
    }
}

impl From<RepositoryError> for SignalError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict { .. } => SignalError::PersistenceConflict(err.to_string()),
            other => SignalError::Persistence(other.to_string()),
        }
    }
}

/// 시그널 저장소.
#[async_trait]
pub trait SignalRepository: Send + Sync {
    async fn find_signal_by_id(&self, id: Uuid) -> RepositoryResult<Option<Signal>>;

    /// 시그널을 저장하고 새 버전이 반영된 복사본을 돌려줍니다.
    async fn save_signal(&self, signal: &Signal) -> RepositoryResult<Signal>;

    /// 상태로 거른 시그널 목록 (생성 시각 순).
    async fn list_signals(&self, status: Option<SignalStatus>) -> RepositoryResult<Vec<Signal>>;
}

/// 종목 설정 저장소.
#[async_trait]
pub trait InstrumentRepository: Send + Sync {
    async fn find_instrument_config(&self, key: &str) -> RepositoryResult<Option<InstrumentContext>>;

    /// 종목 상태를 저장합니다 (없으면 추가).
    async fn update_instrument(&self, ctx: &InstrumentContext) -> RepositoryResult<()>;

    async fn list_instruments(&self) -> RepositoryResult<Vec<InstrumentContext>>;
}

/// 메모리 시그널 저장소.
#[derive(Default)]
pub struct InMemorySignalRepository {
    signals: RwLock<HashMap<Uuid, Signal>>,
    saves: AtomicUsize,
    forced_conflicts: AtomicUsize,
}

impl InMemorySignalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 성공한 저장 횟수.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// 다음 `n`번의 저장을 충돌로 실패시킵니다.
    pub fn force_conflicts(&self, n: usize) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SignalRepository for InMemorySignalRepository {
    async fn find_signal_by_id(&self, id: Uuid) -> RepositoryResult<Option<Signal>> {
        Ok(self.signals.read().unwrap().get(&id).cloned())
    }

    async fn save_signal(&self, signal: &Signal) -> RepositoryResult<Signal> {
        let mut signals = self.signals.write().unwrap();
        let current = signals.get(&signal.id).map(|s| s.version).unwrap_or(0);

        if self.take_forced_conflict() {
            return Err(RepositoryError::Conflict {
                id: signal.id.to_string(),
                expected: signal.version,
                actual: current + 1,
            });
        }

        if current != signal.version {
            return Err(RepositoryError::Conflict {
                id: signal.id.to_string(),
                expected: signal.version,
                actual: current,
            });
        }

        let mut stored = signal.clone();
        stored.version = current + 1;
        signals.insert(stored.id, stored.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);

        debug!(
            signal_id = %stored.id,
            status = %stored.status,
            version = stored.version,
            "Signal saved"
        );
        Ok(stored)
    }

    async fn list_signals(&self, status: Option<SignalStatus>) -> RepositoryResult<Vec<Signal>> {
        let mut signals: Vec<Signal> = self
            .signals
            .read()
            .unwrap()
            .values()
            .filter(|s| status.map_or(true, |st| s.status == st))
            .cloned()
            .collect();
        signals.sort_by_key(|s| s.created_at);
        Ok(signals)
    }
}

/// 메모리 종목 저장소.
#[derive(Default)]
pub struct InMemoryInstrumentRepository {
    instruments: RwLock<BTreeMap<String, InstrumentContext>>,
}

impl InMemoryInstrumentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstrumentRepository for InMemoryInstrumentRepository {
    async fn find_instrument_config(&self, key: &str) -> RepositoryResult<Option<InstrumentContext>> {
        Ok(self.instruments.read().unwrap().get(key).cloned())
    }

    async fn update_instrument(&self, ctx: &InstrumentContext) -> RepositoryResult<()> {
        self.instruments
            .write()
            .unwrap()
            .insert(ctx.key(), ctx.clone());
        Ok(())
    }

    async fn list_instruments(&self) -> RepositoryResult<Vec<InstrumentContext>> {
        Ok(self.instruments.read().unwrap().values().cloned().collect())
    }
}
