//! 지표 불변식과 스냅샷 통합 테스트.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use proptest::strategy::Strategy as _;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signal_analytics::{bollinger_bands, ema, macd, rsi, IndicatorSnapshot};
use signal_core::{
    BollingerSettings, Candle, EmaPeriods, MacdSettings, RiskSettings, RsiSettings, Strategy,
    VolumeSettings,
};

fn prices_strategy() -> impl proptest::strategy::Strategy<Value = Vec<Decimal>> {
    prop::collection::vec(1u32..100_000, 0..80)
        .prop_map(|raw| raw.into_iter().map(|v| Decimal::new(v as i64, 2)).collect())
}

proptest! {
    #[test]
    fn ema_length_matches_input(prices in prices_strategy(), period in 1usize..30) {
        let result = ema(&prices, period);
        if prices.len() < period {
            prop_assert!(result.is_empty());
        } else {
            prop_assert_eq!(result.len(), prices.len());
        }
    }

    #[test]
    fn rsi_stays_in_range(prices in prices_strategy(), period in 2usize..20) {
        let result = rsi(&prices, period);
        prop_assert_eq!(result.len(), prices.len().saturating_sub(period + 1));
        for value in result {
            prop_assert!(value >= Decimal::ZERO && value <= dec!(100));
        }
    }

    #[test]
    fn bollinger_bands_are_ordered(prices in prices_strategy(), period in 1usize..25, k in 0u32..40) {
        let multiplier = Decimal::new(k as i64, 1);
        let bands = bollinger_bands(&prices, period, multiplier).unwrap();
        for band in bands {
            prop_assert!(band.upper >= band.middle);
            prop_assert!(band.middle >= band.lower);
        }
    }

    #[test]
    fn macd_histogram_identity(prices in prices_strategy()) {
        let series = macd(&prices, 5, 13, 4).unwrap();
        for (i, hist) in series.histogram.iter().enumerate() {
            let signal = series.signal.get(i).copied().unwrap_or(Decimal::ZERO);
            prop_assert_eq!(*hist, series.macd[i] - signal);
        }
    }
}

fn test_strategy() -> Strategy {
    Strategy {
        name: "test".to_string(),
        ema: EmaPeriods {
            short: 9,
            medium: 21,
            long: 50,
        },
        rsi: RsiSettings {
            period: 14,
            oversold: dec!(30),
            overbought: dec!(70),
        },
        macd: MacdSettings {
            fast: 12,
            slow: 26,
            signal: 9,
        },
        bollinger: BollingerSettings {
            period: 20,
            std_dev: dec!(2),
        },
        volume: VolumeSettings {
            threshold: dec!(1.5),
        },
        risk: RiskSettings {
            stop_loss_pct: dec!(0.02),
            take_profit_pcts: vec![dec!(0.03)],
        },
    }
}

fn candles(count: usize) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let close = dec!(100) + Decimal::from(i % 7);
            let volume = if i + 1 == count { dec!(30) } else { dec!(10) };
            Candle::new(
                start + Duration::hours(i as i64),
                close - dec!(0.5),
                close + dec!(1),
                close - dec!(1),
                close,
                volume,
            )
        })
        .collect()
}

#[test]
fn test_snapshot_uses_latest_values() {
    let data = candles(60);
    let snapshot = IndicatorSnapshot::compute(&data, &test_strategy())
        .unwrap()
        .expect("enough history");

    assert_eq!(snapshot.price, data[59].close);
    assert!(snapshot.bb_upper >= snapshot.bb_middle);
    assert!(snapshot.bb_middle >= snapshot.bb_lower);
    // 평균 = (19 * 10 + 30) / 20 = 11
    assert_eq!(snapshot.average_volume, dec!(11));
    assert_eq!(snapshot.volume_ratio, dec!(30) / dec!(11));
}

#[test]
fn test_snapshot_short_history_is_none() {
    let strategy = test_strategy();

    assert!(IndicatorSnapshot::compute(&[], &strategy).unwrap().is_none());
    assert!(IndicatorSnapshot::compute(&candles(40), &strategy)
        .unwrap()
        .is_none());
}
