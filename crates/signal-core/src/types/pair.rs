//! 거래쌍 정의.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 구분자 없는 심볼("BTCUSDT")을 나눌 때 시도하는 호가 자산. 긴 것부터 검사합니다.
const KNOWN_QUOTES: [&str; 7] = ["FDUSD", "USDT", "USDC", "BUSD", "BTC", "ETH", "BNB"];

/// 기준 자산/호가 자산 쌍.
///
/// 문자열로는 "BASE/QUOTE"로 직렬화됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradingPair {
    /// 기준 자산 (예: BTC)
    pub base: String,
    /// 호가 자산 (예: USDT)
    pub quote: String,
}

impl TradingPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// 거래소 요청용 심볼 ("BTCUSDT").
    pub fn exchange_symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// "BTC/USDT", "BTC-USDT", "BTCUSDT" 형식을 모두 받습니다.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_uppercase();
        if let Some((base, quote)) = s.split_once(['/', '-']) {
            if base.is_empty() || quote.is_empty() {
                return None;
            }
            return Some(Self::new(base, quote));
        }

        KNOWN_QUOTES.iter().find_map(|quote| {
            s.strip_suffix(quote)
                .filter(|base| !base.is_empty())
                .map(|base| Self::new(base, *quote))
        })
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for TradingPair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid trading pair: {}", s))
    }
}

impl TryFrom<String> for TradingPair {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TradingPair> for String {
    fn from(pair: TradingPair) -> Self {
        pair.to_string()
    }
}
