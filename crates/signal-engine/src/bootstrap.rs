//! 설정에서 파이프라인 조립.
//!
//! 거래소 어댑터, 저장소, 알림 관리자, 이벤트 버스와 핸들러를 만들고 설정의
//! 종목을 모니터에 등록합니다.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signal_core::{AppConfig, Clock, InstrumentCategory, InstrumentConfig, SystemClock, Timeframe, TradingPair};
use signal_exchange::{
    AdapterConfig, BinanceClient, BinanceConfig, ExchangeAdapter, ExchangeClient, SimulatedClient,
};
use signal_notification::NotificationManager;
use tracing::{info, warn};

use crate::alerts::ExchangeHealthNotifier;
use crate::dispatch::{ExecutionAckHandler, SignalDispatchHandler, Sleeper, TokioSleeper};
use crate::error::{EngineError, EngineResult};
use crate::event_bus::{EventBus, EventKind};
use crate::monitor::SignalMonitor;
use crate::repository::{InMemoryInstrumentRepository, InMemorySignalRepository};

/// 시뮬레이션 모드에서 종목마다 미리 만들어 두는 캔들 수.
const SIMULATED_HISTORY: usize = 300;

/// 조립된 파이프라인.
pub struct Pipeline {
    pub monitor: SignalMonitor,
    pub bus: Arc<EventBus>,
    pub signals: Arc<InMemorySignalRepository>,
    pub instruments: Arc<InMemoryInstrumentRepository>,
    pub dispatcher: Arc<SignalDispatchHandler>,
}

/// 파이프라인 빌더.
pub struct PipelineBuilder {
    config: AppConfig,
    simulated: bool,
    notifier: Option<NotificationManager>,
    clients: HashMap<String, Arc<dyn ExchangeClient>>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl PipelineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            simulated: false,
            notifier: None,
            clients: HashMap::new(),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// 실제 거래소 대신 무작위 보행 시뮬레이션 클라이언트를 씁니다.
    pub fn simulated(mut self, simulated: bool) -> Self {
        self.simulated = simulated;
        self
    }

    /// 설정 대신 쓸 알림 관리자.
    pub fn with_notifier(mut self, notifier: NotificationManager) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// 거래소 이름에 클라이언트를 직접 지정합니다.
    pub fn with_client(mut self, client: Arc<dyn ExchangeClient>) -> Self {
        self.clients.insert(client.name().to_string(), client);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub async fn build(mut self) -> EngineResult<Pipeline> {
        let config = self.config.clone();

        let bus = Arc::new(EventBus::new(config.event_bus.clone()).with_clock(self.clock.clone()));
        let signals = Arc::new(InMemorySignalRepository::new());
        let instruments = Arc::new(InMemoryInstrumentRepository::new());
        let notifier = self
            .notifier
            .take()
            .unwrap_or_else(|| NotificationManager::from_config(&config.notifications));

        if notifier.channels().is_empty() {
            warn!("No notification channels enabled, every signal will be marked FAILED");
        }

        let dispatcher = Arc::new(
            SignalDispatchHandler::new(signals.clone(), notifier.clone(), config.dispatch.clone())
                .with_sleeper(self.sleeper.clone())
                .with_clock(self.clock.clone()),
        );
        bus.subscribe(EventKind::SignalGenerated, dispatcher.clone());

        let alerts = ExchangeHealthNotifier::new(notifier.clone()).with_clock(self.clock.clone());
        bus.subscribe(EventKind::ExchangeHealthChanged, Arc::new(alerts));

        let ack = ExecutionAckHandler::new(signals.clone(), notifier, config.dispatch.clone())
            .with_sleeper(self.sleeper.clone())
            .with_clock(self.clock.clone());
        bus.subscribe(EventKind::SignalExecuted, Arc::new(ack));

        let mut monitor = SignalMonitor::new(
            bus.clone(),
            signals.clone(),
            instruments.clone(),
            config.monitor.clone(),
        )
        .with_clock(self.clock.clone());

        let parsed = config
            .instruments
            .iter()
            .map(parse_instrument)
            .collect::<EngineResult<Vec<_>>>()?;

        let exchanges: BTreeSet<&str> = parsed.iter().map(|p| p.exchange.as_str()).collect();
        for name in exchanges {
            let settings = config.exchange(name);
            if !settings.enabled {
                warn!(exchange = name, "Exchange disabled, its instruments are skipped");
                continue;
            }

            let client = match self.clients.remove(name) {
                Some(client) => client,
                None if self.simulated => self.simulated_client(name, &parsed),
                None => live_client(name, &settings)?,
            };
            let adapter = ExchangeAdapter::new(client, AdapterConfig::from(&settings))
                .with_clock(self.clock.clone());
            monitor.add_exchange(Arc::new(adapter));
        }

        for instrument in parsed {
            if monitor.exchange(&instrument.exchange).is_none() {
                continue;
            }
            let mut ctx = monitor.context_for(
                instrument.pair,
                &instrument.exchange,
                instrument.timeframe,
                instrument.category,
                instrument.cooldown_secs,
            );
            ctx.active = instrument.active;
            monitor.add_instrument(ctx).await?;
        }

        info!(
            instruments = monitor.instruments().len(),
            simulated = self.simulated,
            "Pipeline assembled"
        );

        Ok(Pipeline {
            monitor,
            bus,
            signals,
            instruments,
            dispatcher,
        })
    }

    fn simulated_client(&self, name: &str, instruments: &[ParsedInstrument]) -> Arc<dyn ExchangeClient> {
        let now = self.clock.now();
        let client = instruments
            .iter()
            .filter(|i| i.exchange == name)
            .fold(
                SimulatedClient::new(name).with_live_updates(true),
                |client, i| {
                    client.with_random_walk(
                        i.pair.clone(),
                        i.timeframe,
                        SIMULATED_HISTORY,
                        simulated_start_price(&i.pair),
                        now,
                    )
                },
            );
        Arc::new(client)
    }
}

fn live_client(
    name: &str,
    settings: &signal_core::ExchangeConfig,
) -> EngineResult<Arc<dyn ExchangeClient>> {
    match name {
        "binance" => Ok(Arc::new(BinanceClient::new(BinanceConfig::from_settings(settings))?)),
        other => Err(EngineError::UnknownExchange(other.to_string())),
    }
}

fn simulated_start_price(pair: &TradingPair) -> Decimal {
    match pair.base.as_str() {
        "BTC" => dec!(60000),
        "ETH" => dec!(3000),
        "BNB" => dec!(550),
        "SOL" => dec!(150),
        _ => dec!(1),
    }
}

/// 검증된 종목 설정.
#[derive(Debug, Clone, PartialEq)]
struct ParsedInstrument {
    pair: TradingPair,
    exchange: String,
    timeframe: Timeframe,
    category: Option<InstrumentCategory>,
    cooldown_secs: Option<u64>,
    active: bool,
}

fn parse_instrument(config: &InstrumentConfig) -> EngineResult<ParsedInstrument> {
    let pair = TradingPair::parse(&config.symbol)
        .ok_or_else(|| EngineError::InvalidInstrument(format!("symbol {}", config.symbol)))?;
    let timeframe = config
        .timeframe
        .parse::<Timeframe>()
        .map_err(|e| EngineError::InvalidInstrument(format!("{}: {}", config.symbol, e)))?;
    let category = config
        .category
        .as_deref()
        .map(str::parse::<InstrumentCategory>)
        .transpose()
        .map_err(|e| EngineError::InvalidInstrument(format!("{}: {}", config.symbol, e)))?;

    Ok(ParsedInstrument {
        pair,
        exchange: config.exchange.to_lowercase(),
        timeframe,
        category,
        cooldown_secs: config.cooldown_secs,
        active: config.active,
    })
}
