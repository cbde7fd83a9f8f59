//! 전략 파라미터와 종목 카테고리.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// EMA 기간 (단기/중기/장기).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmaPeriods {
    pub short: usize,
    pub medium: usize,
    pub long: usize,
}

/// RSI 파라미터.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsiSettings {
    pub period: usize,
    /// 과매도 기준
    pub oversold: Decimal,
    /// 과매수 기준
    pub overbought: Decimal,
}

/// MACD 파라미터.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacdSettings {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

/// 볼린저 밴드 파라미터.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BollingerSettings {
    pub period: usize,
    pub std_dev: Decimal,
}

/// 거래량 조건.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSettings {
    /// 20기간 평균 대비 현재 거래량 배수 기준
    pub threshold: Decimal,
}

/// 손절/익절 비율 (진입가 대비, 0.02 = 2%).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSettings {
    pub stop_loss_pct: Decimal,
    pub take_profit_pcts: Vec<Decimal>,
}

/// 전략 정의.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub ema: EmaPeriods,
    pub rsi: RsiSettings,
    pub macd: MacdSettings,
    pub bollinger: BollingerSettings,
    pub volume: VolumeSettings,
    pub risk: RiskSettings,
}

impl Strategy {
    /// 지표 계산에 필요한 최소 캔들 수.
    pub fn required_candles(&self) -> usize {
        [
            self.ema.long,
            self.rsi.period + 2,
            self.macd.slow + self.macd.signal,
            self.bollinger.period,
            20,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// 종목 카테고리.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentCategory {
    /// 대형 코인
    Major,
    /// 기타 알트코인
    Alt,
    /// DeFi 토큰
    Defi,
    /// 밈 코인
    Meme,
    /// 스테이블코인
    Stablecoin,
}

const MAJOR_ASSETS: &[&str] = &["BTC", "ETH", "BNB", "SOL", "XRP", "ADA"];
const DEFI_ASSETS: &[&str] = &[
    "UNI", "AAVE", "COMP", "MKR", "SUSHI", "CRV", "SNX", "YFI", "1INCH", "LDO", "DYDX", "GMX",
    "CAKE",
];
const MEME_ASSETS: &[&str] = &[
    "DOGE", "SHIB", "PEPE", "FLOKI", "BONK", "WIF", "MEME", "BOME",
];
const STABLE_ASSETS: &[&str] = &["USDT", "USDC", "BUSD", "DAI", "TUSD", "FDUSD", "USDP"];

impl InstrumentCategory {
    /// 기준 자산으로 카테고리를 추정합니다. 목록에 없으면 `Alt`.
    pub fn classify(base_asset: &str) -> Self {
        let base = base_asset.to_uppercase();
        let base = base.as_str();

        if MAJOR_ASSETS.contains(&base) {
            Self::Major
        } else if STABLE_ASSETS.contains(&base) {
            Self::Stablecoin
        } else if MEME_ASSETS.contains(&base) {
            Self::Meme
        } else if DEFI_ASSETS.contains(&base) {
            Self::Defi
        } else {
            Self::Alt
        }
    }
}

impl fmt::Display for InstrumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Major => "major",
            Self::Alt => "alt",
            Self::Defi => "defi",
            Self::Meme => "meme",
            Self::Stablecoin => "stablecoin",
        };
        f.write_str(s)
    }
}

impl FromStr for InstrumentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "major" => Ok(Self::Major),
            "alt" => Ok(Self::Alt),
            "defi" => Ok(Self::Defi),
            "meme" => Ok(Self::Meme),
            "stablecoin" | "stable" => Ok(Self::Stablecoin),
            _ => Err(format!("Unknown instrument category: {}", s)),
        }
    }
}

/// 카테고리에 맞게 조정된 전략.
///
/// 한 사이클 동안은 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptedStrategy {
    pub strategy: Strategy,
    pub category: InstrumentCategory,
    /// 시그널 발생에 필요한 최소 충족 조건 수
    pub min_signal_strength: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(InstrumentCategory::classify("btc"), InstrumentCategory::Major);
        assert_eq!(InstrumentCategory::classify("AAVE"), InstrumentCategory::Defi);
        assert_eq!(InstrumentCategory::classify("PEPE"), InstrumentCategory::Meme);
        assert_eq!(InstrumentCategory::classify("USDC"), InstrumentCategory::Stablecoin);
        assert_eq!(InstrumentCategory::classify("NEAR"), InstrumentCategory::Alt);
    }

    #[test]
    fn test_category_parse_and_display() {
        for category in [
            InstrumentCategory::Major,
            InstrumentCategory::Alt,
            InstrumentCategory::Defi,
            InstrumentCategory::Meme,
            InstrumentCategory::Stablecoin,
        ] {
            assert_eq!(category.to_string().parse::<InstrumentCategory>(), Ok(category));
        }
        assert!("bluechip".parse::<InstrumentCategory>().is_err());
    }
}
