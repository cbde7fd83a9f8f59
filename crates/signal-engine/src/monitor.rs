//! 시그널 모니터.
//!
//! 감시 종목 슬롯, 거래소별 어댑터, 전략 어댑터, 이벤트 버스와 저장소를 소유하고
//! 주기마다 한 사이클을 돕니다. 종목 하나의 처리 순서:
//!
//! 1. 저장소에서 활성 여부/쿨다운 상태 갱신
//! 2. 거래소 헬스 확인 (끊겼거나 점수 미달이면 재연결)
//! 3. 캔들 조회 → 지표 스냅샷 → 점수 평가
//! 4. 쿨다운 확인
//! 5. PENDING 저장 → `SignalGenerated` 발행 (발송 핸들러가 처리)
//! 6. 다시 읽어 SENT면 쿨다운 시각을 기록하고 종목 상태 저장
//!
//! 종목 하나의 실패는 로그를 남기고 다음 종목으로 넘어갑니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;
use serde::Serialize;
use signal_analytics::IndicatorSnapshot;
use signal_core::{
    instrument_span, Clock, InstrumentCategory, InstrumentContext, MonitorConfig, SignalStatus,
    SystemClock, Timeframe, TradingPair,
};
use signal_exchange::ExchangeAdapter;
use signal_strategy::{generate_signal, record_signal, should_signal, StrategyAdapter};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::event_bus::{Event, EventBus};
use crate::repository::{InstrumentRepository, SignalRepository};
use crate::telemetry;

/// 종목 하나의 사이클 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstrumentOutcome {
    Inactive,
    /// 재연결 후에도 헬스 점수 미달
    ExchangeUnhealthy { score: u8 },
    /// 지표 계산에 캔들이 부족
    InsufficientData,
    NoSignal,
    CoolingDown,
    /// 시그널 생성. `status`는 발송 처리 후 다시 읽은 상태
    Signal { signal_id: Uuid, status: SignalStatus },
}

/// 사이클 한 번의 결과.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// (종목 키, 결과)
    pub outcomes: Vec<(String, InstrumentOutcome)>,
    /// (종목 키, 에러)
    pub errors: Vec<(String, String)>,
}

impl CycleReport {
    pub fn processed(&self) -> usize {
        self.outcomes.len() + self.errors.len()
    }

    /// 생성된 시그널 id.
    pub fn signals(&self) -> Vec<Uuid> {
        self.outcomes
            .iter()
            .filter_map(|(_, outcome)| match outcome {
                InstrumentOutcome::Signal { signal_id, .. } => Some(*signal_id),
                _ => None,
            })
            .collect()
    }

    pub fn outcome(&self, key: &str) -> Option<&InstrumentOutcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, outcome)| outcome)
    }
}

/// 시그널 모니터.
pub struct SignalMonitor {
    adapters: HashMap<String, Arc<ExchangeAdapter>>,
    strategies: StrategyAdapter,
    instruments: Arc<dyn InstrumentRepository>,
    signals: Arc<dyn SignalRepository>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
    slots: Vec<InstrumentContext>,
}

impl SignalMonitor {
    pub fn new(
        bus: Arc<EventBus>,
        signals: Arc<dyn SignalRepository>,
        instruments: Arc<dyn InstrumentRepository>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            adapters: HashMap::new(),
            strategies: StrategyAdapter::default(),
            instruments,
            signals,
            bus,
            clock: Arc::new(SystemClock),
            config,
            slots: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_strategies(mut self, strategies: StrategyAdapter) -> Self {
        self.strategies = strategies;
        self
    }

    /// 거래소 어댑터를 등록합니다. 같은 이름이면 교체합니다.
    pub fn add_exchange(&mut self, adapter: Arc<ExchangeAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn exchange(&self, name: &str) -> Option<&Arc<ExchangeAdapter>> {
        self.adapters.get(name)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// 현재 종목 슬롯.
    pub fn instruments(&self) -> &[InstrumentContext] {
        &self.slots
    }

    /// 타임프레임/카테고리에 맞는 전략으로 종목 컨텍스트를 만듭니다.
    ///
    /// 카테고리가 없으면 기준 자산으로 추정하고, 쿨다운이 없으면 기본값을 씁니다.
    pub fn context_for(
        &self,
        symbol: TradingPair,
        exchange: &str,
        timeframe: Timeframe,
        category: Option<InstrumentCategory>,
        cooldown_secs: Option<u64>,
    ) -> InstrumentContext {
        let category = category.unwrap_or_else(|| InstrumentCategory::classify(&symbol.base));
        let strategy = self.strategies.adapt_for(timeframe, category);
        let cooldown = cooldown_secs.unwrap_or(self.config.default_cooldown_secs);

        InstrumentContext::new(
            symbol,
            exchange,
            timeframe,
            strategy,
            ChronoDuration::seconds(cooldown as i64),
        )
    }

    /// 종목을 감시 목록에 추가하고 저장합니다. 같은 키가 있으면 교체합니다.
    pub async fn add_instrument(&mut self, ctx: InstrumentContext) -> EngineResult<()> {
        if !self.adapters.contains_key(&ctx.exchange) {
            return Err(EngineError::UnknownExchange(ctx.exchange.clone()));
        }

        self.instruments.update_instrument(&ctx).await?;

        let key = ctx.key();
        info!(
            instrument = %key,
            strategy = %ctx.strategy.strategy.name,
            min_strength = ctx.min_signal_strength,
            cooldown_secs = ctx.cooldown_secs,
            "Instrument added"
        );
        match self.slots.iter_mut().find(|slot| slot.key() == key) {
            Some(slot) => *slot = ctx,
            None => self.slots.push(ctx),
        }
        Ok(())
    }

    pub async fn activate(&mut self, key: &str) -> EngineResult<()> {
        self.set_active(key, true).await
    }

    pub async fn deactivate(&mut self, key: &str) -> EngineResult<()> {
        self.set_active(key, false).await
    }

    async fn set_active(&mut self, key: &str, active: bool) -> EngineResult<()> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.key() == key)
            .ok_or_else(|| EngineError::InvalidInstrument(key.to_string()))?;

        slot.active = active;
        self.instruments.update_instrument(slot).await?;
        info!(instrument = %key, active, "Instrument activation changed");
        Ok(())
    }

    /// 등록된 모든 거래소에 연결합니다. 실패한 거래소는 사이클에서 재연결합니다.
    pub async fn connect_all(&self) {
        for adapter in self.adapters.values() {
            if let Err(e) = adapter.connect().await {
                warn!(exchange = %adapter.name(), error = %e, "Initial connect failed");
            }
        }
    }

    /// 활성 종목을 순서대로 한 번씩 처리합니다.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        for index in 0..self.slots.len() {
            let mut ctx = self.slots[index].clone();
            let key = ctx.key();
            let span = instrument_span!("instrument_cycle", ctx.symbol, ctx.exchange);

            let result = self.process_instrument(&mut ctx).instrument(span).await;
            self.slots[index] = ctx;

            match result {
                Ok(outcome) => {
                    debug!(instrument = %key, outcome = ?outcome, "Instrument processed");
                    report.outcomes.push((key, outcome));
                }
                Err(e) => {
                    warn!(instrument = %key, error = %e, "Instrument cycle failed, skipped");
                    report.errors.push((key, e.to_string()));
                }
            }
        }

        let signals = report.signals().len();
        telemetry::record_cycle(report.processed(), signals, report.errors.len(), started.elapsed());
        self.bus
            .publish(Event::CycleCompleted {
                processed: report.processed(),
                signals,
                errors: report.errors.len(),
            })
            .await;

        info!(
            processed = report.processed(),
            signals,
            errors = report.errors.len(),
            "Monitor cycle completed"
        );
        report
    }

    async fn process_instrument(
        &self,
        ctx: &mut InstrumentContext,
    ) -> EngineResult<InstrumentOutcome> {
        self.refresh(ctx).await?;
        if !ctx.active {
            return Ok(InstrumentOutcome::Inactive);
        }

        let adapter = self
            .adapters
            .get(&ctx.exchange)
            .ok_or_else(|| EngineError::UnknownExchange(ctx.exchange.clone()))?;

        if let Some(score) = self.ensure_healthy(adapter).await {
            warn!(score, "Exchange unhealthy, instrument skipped");
            return Ok(InstrumentOutcome::ExchangeUnhealthy { score });
        }

        let limit = self
            .config
            .candle_limit
            .max(ctx.strategy.strategy.required_candles());
        let candles = adapter.get_candles(&ctx.symbol, ctx.timeframe, limit).await?;

        let Some(snapshot) = IndicatorSnapshot::compute(&candles, &ctx.strategy.strategy)? else {
            debug!(candles = candles.len(), "Not enough data for indicators");
            return Ok(InstrumentOutcome::InsufficientData);
        };
        let Some(latest) = candles.last() else {
            return Ok(InstrumentOutcome::InsufficientData);
        };

        let now = self.clock.now();
        let Some(signal) = generate_signal(ctx, &snapshot, latest, now) else {
            return Ok(InstrumentOutcome::NoSignal);
        };

        if !should_signal(ctx, now) {
            debug!(
                direction = %signal.direction,
                last_signal_at = ?ctx.last_signal_at,
                "Signal suppressed by cooldown"
            );
            return Ok(InstrumentOutcome::CoolingDown);
        }

        let saved = self.signals.save_signal(&signal).await?;
        info!(
            signal_id = %saved.id,
            direction = %saved.direction,
            entry = %saved.entry_price,
            confidence = saved.confidence,
            "Signal generated"
        );

        self.bus
            .publish(Event::SignalGenerated {
                signal: saved.clone(),
            })
            .await;

        let reloaded = self
            .signals
            .find_signal_by_id(saved.id)
            .await?
            .unwrap_or(saved);

        if reloaded.status == SignalStatus::Sent {
            record_signal(ctx, reloaded.sent_at.unwrap_or(now));
            self.instruments.update_instrument(ctx).await?;
        }

        self.bus
            .publish(Event::SignalDispatched {
                signal_id: reloaded.id,
                status: reloaded.status,
            })
            .await;

        Ok(InstrumentOutcome::Signal {
            signal_id: reloaded.id,
            status: reloaded.status,
        })
    }

    /// 저장된 상태에서 활성 여부, 쿨다운, 마지막 시그널 시각을 가져옵니다.
    async fn refresh(&self, ctx: &mut InstrumentContext) -> EngineResult<()> {
        if let Some(stored) = self.instruments.find_instrument_config(&ctx.key()).await? {
            ctx.active = stored.active;
            ctx.cooldown_secs = stored.cooldown_secs;
            if let Some(at) = stored.last_signal_at {
                record_signal(ctx, at);
            }
        }
        Ok(())
    }

    /// 필요하면 재연결합니다. 여전히 점수 미달이면 그 점수를 돌려줍니다.
    async fn ensure_healthy(&self, adapter: &ExchangeAdapter) -> Option<u8> {
        let min_score = self.config.min_health_score;
        let health = adapter.health();
        if health.is_connected && health.score() >= min_score {
            return None;
        }

        info!(
            exchange = %adapter.name(),
            connected = health.is_connected,
            score = health.score(),
            "Reconnecting exchange"
        );
        if let Err(e) = adapter.connect().await {
            warn!(exchange = %adapter.name(), error = %e, "Reconnect failed");
        }

        let health = adapter.health();
        let score = health.score();
        self.bus
            .publish(Event::ExchangeHealthChanged {
                exchange: adapter.name().to_string(),
                score,
                connected: health.is_connected,
                healthy: health.is_healthy(min_score),
            })
            .await;

        (!health.is_healthy(min_score)).then_some(score)
    }

    /// 설정된 주기로 사이클을 반복합니다. 진행 중인 사이클은 끝까지 마칩니다.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let period = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = period.as_secs(),
            instruments = self.slots.len(),
            exchanges = self.adapters.len(),
            "Signal monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, signal monitor stopping");
                    break;
                }
            }
        }
    }
}
