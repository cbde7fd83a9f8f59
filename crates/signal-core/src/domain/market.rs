//! 시장 데이터 타입.
//!
//! - `Candle` - OHLCV 캔들 (오래된 것부터 정렬해 사용)
//! - `Ticker` - 24시간 시세 요약
//! - `MarketInfo` - 거래소에 상장된 거래쌍 정보

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::TradingPair;

/// OHLCV 캔들.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// 캔들 시작 시각
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// 거래량 (기준 자산 단위)
    pub volume: Decimal,
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// 양봉(종가 > 시가)인지 확인합니다.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// 음봉(종가 < 시가)인지 확인합니다.
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// 캔들 범위(고가 - 저가).
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// 가격 관계가 일관되고 거래량이 음수가 아닌지 확인합니다.
    pub fn is_well_formed(&self) -> bool {
        let body_high = self.open.max(self.close);
        let body_low = self.open.min(self.close);

        self.low > Decimal::ZERO
            && self.high >= self.low
            && self.high >= body_high
            && self.low <= body_low
            && !self.volume.is_sign_negative()
    }
}

/// 24시간 시세 요약.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub pair: TradingPair,
    /// 최근 체결가
    pub last: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    /// 24시간 거래량
    pub volume_24h: Decimal,
    /// 24시간 변동률(%)
    pub change_24h_percent: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// 상장 거래쌍 정보.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub pair: TradingPair,
    /// 현재 거래 가능 여부
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle::new(Utc::now(), open, high, low, close, dec!(10))
    }

    #[test]
    fn test_candle_direction() {
        assert!(candle(dec!(100), dec!(110), dec!(95), dec!(105)).is_bullish());
        assert!(candle(dec!(100), dec!(110), dec!(95), dec!(97)).is_bearish());

        let doji = candle(dec!(100), dec!(101), dec!(99), dec!(100));
        assert!(!doji.is_bullish());
        assert!(!doji.is_bearish());
    }

    #[test]
    fn test_candle_well_formed() {
        assert!(candle(dec!(100), dec!(110), dec!(95), dec!(105)).is_well_formed());
        // 고가 < 저가
        assert!(!candle(dec!(100), dec!(90), dec!(95), dec!(92)).is_well_formed());
        // 종가가 고가 위
        assert!(!candle(dec!(100), dec!(105), dec!(95), dec!(106)).is_well_formed());

        let mut negative_volume = candle(dec!(100), dec!(110), dec!(95), dec!(105));
        negative_volume.volume = dec!(-1);
        assert!(!negative_volume.is_well_formed());
    }
}
