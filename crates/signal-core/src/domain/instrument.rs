//! 감시 종목 컨텍스트.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::strategy::{AdaptedStrategy, InstrumentCategory};
use crate::types::{Timeframe, TradingPair};

/// 종목 하나를 감시하기 위한 상태.
///
/// `last_signal_at`은 쿨다운 게이트만, `active`는 설정 변경만 수정합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentContext {
    pub symbol: TradingPair,
    pub exchange: String,
    pub timeframe: Timeframe,
    pub strategy: AdaptedStrategy,
    pub min_signal_strength: u8,
    pub category: InstrumentCategory,
    /// 마지막으로 발송 성공한 시그널 시각
    pub last_signal_at: Option<DateTime<Utc>>,
    /// 시그널 간 최소 간격 (초)
    pub cooldown_secs: u64,
    pub active: bool,
}

impl InstrumentContext {
    pub fn new(
        symbol: TradingPair,
        exchange: impl Into<String>,
        timeframe: Timeframe,
        strategy: AdaptedStrategy,
        cooldown: Duration,
    ) -> Self {
        Self {
            symbol,
            exchange: exchange.into(),
            timeframe,
            min_signal_strength: strategy.min_signal_strength,
            category: strategy.category,
            strategy,
            last_signal_at: None,
            cooldown_secs: cooldown.num_seconds().max(0) as u64,
            active: true,
        }
    }

    /// 저장소 키 ("binance:BTC/USDT:1h").
    pub fn key(&self) -> String {
        instrument_key(&self.exchange, &self.symbol, self.timeframe)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_secs as i64)
    }
}

/// 거래소/거래쌍/타임프레임으로 종목 키를 만듭니다.
pub fn instrument_key(exchange: &str, symbol: &TradingPair, timeframe: Timeframe) -> String {
    format!("{}:{}:{}", exchange, symbol, timeframe)
}
