//! 지표 스냅샷.
//!
//! 사이클마다 최근 캔들에서 새로 계산되고 저장되지 않습니다.

use rust_decimal::Decimal;
use serde::Serialize;
use signal_core::{Candle, Strategy};
use tracing::debug;

use crate::indicators::{bollinger_bands, ema, macd, rsi, IndicatorResult};

/// 평균 거래량 계산 구간.
pub const VOLUME_AVERAGE_PERIOD: usize = 20;

/// 마지막 캔들 시점의 지표 값 묶음.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndicatorSnapshot {
    /// 마지막 종가
    pub price: Decimal,
    pub ema_short: Decimal,
    pub ema_medium: Decimal,
    pub ema_long: Decimal,
    pub rsi: Decimal,
    pub macd: Decimal,
    pub macd_signal: Decimal,
    pub macd_histogram: Decimal,
    pub bb_upper: Decimal,
    pub bb_middle: Decimal,
    pub bb_lower: Decimal,
    /// 최근 20개 캔들 평균 거래량
    pub average_volume: Decimal,
    /// 마지막 캔들 거래량 / 평균 거래량 (평균이 0이면 0)
    pub volume_ratio: Decimal,
}

impl IndicatorSnapshot {
    /// 캔들(오래된 것부터)과 전략 파라미터로 스냅샷을 계산합니다.
    ///
    /// 어느 지표든 값이 부족하면 `Ok(None)`입니다.
    pub fn compute(candles: &[Candle], strategy: &Strategy) -> IndicatorResult<Option<Self>> {
        let Some(latest) = candles.last() else {
            return Ok(None);
        };
        if candles.len() < VOLUME_AVERAGE_PERIOD {
            debug!(candles = candles.len(), "Not enough candles for volume average");
            return Ok(None);
        }

        let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();

        let macd_series = macd(
            &closes,
            strategy.macd.fast,
            strategy.macd.slow,
            strategy.macd.signal,
        )?;
        let bands = bollinger_bands(&closes, strategy.bollinger.period, strategy.bollinger.std_dev)?;

        let (
            Some(ema_short),
            Some(ema_medium),
            Some(ema_long),
            Some(rsi_value),
            Some((macd_value, macd_signal, macd_histogram)),
            Some(band),
        ) = (
            ema(&closes, strategy.ema.short).last().copied(),
            ema(&closes, strategy.ema.medium).last().copied(),
            ema(&closes, strategy.ema.long).last().copied(),
            rsi(&closes, strategy.rsi.period).last().copied(),
            macd_series.last(),
            bands.last().copied(),
        )
        else {
            debug!(
                candles = candles.len(),
                required = strategy.required_candles(),
                "Indicator history too short"
            );
            return Ok(None);
        };

        let average_volume = candles[candles.len() - VOLUME_AVERAGE_PERIOD..]
            .iter()
            .map(|c| c.volume)
            .sum::<Decimal>()
            / Decimal::from(VOLUME_AVERAGE_PERIOD);

        let volume_ratio = if average_volume.is_zero() {
            Decimal::ZERO
        } else {
            latest.volume / average_volume
        };

        Ok(Some(Self {
            price: latest.close,
            ema_short,
            ema_medium,
            ema_long,
            rsi: rsi_value,
            macd: macd_value,
            macd_signal,
            macd_histogram,
            bb_upper: band.upper,
            bb_middle: band.middle,
            bb_lower: band.lower,
            average_volume,
            volume_ratio,
        }))
    }
}
