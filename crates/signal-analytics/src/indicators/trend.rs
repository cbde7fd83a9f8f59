//! 추세 지표 (EMA, MACD).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{IndicatorError, IndicatorResult};

/// 지수 이동평균.
///
/// 첫 값은 `data[0]` 그대로이고, 이후 `v = price * k + prev * (1 - k)`,
/// `k = 2 / (period + 1)`. 출력 길이는 입력 길이와 같습니다.
/// `period == 0`이거나 `data.len() < period`이면 빈 벡터를 반환합니다.
pub fn ema(data: &[Decimal], period: usize) -> Vec<Decimal> {
    if period == 0 || data.len() < period {
        return Vec::new();
    }

    let k = Decimal::TWO / Decimal::from(period + 1);
    let one_minus_k = Decimal::ONE - k;

    let mut result = Vec::with_capacity(data.len());
    let mut prev = data[0];
    result.push(prev);

    for price in &data[1..] {
        prev = *price * k + prev * one_minus_k;
        result.push(prev);
    }

    result
}

/// MACD 계산 결과. 세 벡터는 모두 입력과 같은 길이입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacdSeries {
    /// EMA(fast) - EMA(slow)
    pub macd: Vec<Decimal>,
    /// EMA(macd, signal). MACD 라인이 signal 기간보다 짧으면 비어 있음
    pub signal: Vec<Decimal>,
    /// macd - signal. signal 값이 없는 인덱스는 0으로 간주
    pub histogram: Vec<Decimal>,
}

impl MacdSeries {
    pub fn is_empty(&self) -> bool {
        self.macd.is_empty()
    }

    /// 마지막 (macd, signal, histogram).
    pub fn last(&self) -> Option<(Decimal, Decimal, Decimal)> {
        Some((
            *self.macd.last()?,
            *self.signal.last()?,
            *self.histogram.last()?,
        ))
    }
}

/// MACD.
///
/// `fast >= slow`이면 파라미터 에러입니다.
pub fn macd(
    data: &[Decimal],
    fast: usize,
    slow: usize,
    signal: usize,
) -> IndicatorResult<MacdSeries> {
    if fast == 0 || signal == 0 || fast >= slow {
        return Err(IndicatorError::InvalidParameter(format!(
            "MACD 기간이 잘못되었습니다: fast={}, slow={}, signal={}",
            fast, slow, signal
        )));
    }

    let fast_ema = ema(data, fast);
    let slow_ema = ema(data, slow);
    if fast_ema.is_empty() || slow_ema.is_empty() {
        return Ok(MacdSeries::default());
    }

    let macd_line: Vec<Decimal> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();

    let signal_line = ema(&macd_line, signal);

    let histogram = macd_line
        .iter()
        .enumerate()
        .map(|(i, m)| m - signal_line.get(i).copied().unwrap_or(Decimal::ZERO))
        .collect();

    Ok(MacdSeries {
        macd: macd_line,
        signal: signal_line,
        histogram,
    })
}
