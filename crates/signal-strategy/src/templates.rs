//! 타임프레임 분류별 기본 전략 템플릿.

use rust_decimal_macros::dec;
use signal_core::{
    BollingerSettings, EmaPeriods, MacdSettings, RiskSettings, RsiSettings, Strategy,
    StrategyClass, VolumeSettings,
};

/// 분류에 맞는 기본 전략을 돌려줍니다.
///
/// | 분류 | EMA | RSI | MACD | 손절 | 익절 |
/// |------|-----|-----|------|------|------|
/// | scalping | 5/13/34 | 7 (25/75) | 6/13/5 | 0.5% | 0.5/1/1.5% |
/// | intraday | 9/21/50 | 14 (30/70) | 12/26/9 | 1.5% | 1.5/3/4.5% |
/// | swing | 20/50/100 | 14 (30/70) | 12/26/9 | 2% | 3/6/10% |
/// | position | 20/50/200 | 21 (30/70) | 12/26/9 | 5% | 10/20/30% |
pub fn base_template(class: StrategyClass) -> Strategy {
    match class {
        StrategyClass::Scalping => Strategy {
            name: "scalping".to_string(),
            ema: EmaPeriods {
                short: 5,
                medium: 13,
                long: 34,
            },
            rsi: RsiSettings {
                period: 7,
                oversold: dec!(25),
                overbought: dec!(75),
            },
            macd: MacdSettings {
                fast: 6,
                slow: 13,
                signal: 5,
            },
            bollinger: BollingerSettings {
                period: 20,
                std_dev: dec!(2),
            },
            volume: VolumeSettings {
                threshold: dec!(1.8),
            },
            risk: RiskSettings {
                stop_loss_pct: dec!(0.005),
                take_profit_pcts: vec![dec!(0.005), dec!(0.01), dec!(0.015)],
            },
        },
        StrategyClass::Intraday => Strategy {
            name: "intraday".to_string(),
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
                stop_loss_pct: dec!(0.015),
                take_profit_pcts: vec![dec!(0.015), dec!(0.03), dec!(0.045)],
            },
        },
        StrategyClass::Swing => Strategy {
            name: "swing".to_string(),
            ema: EmaPeriods {
                short: 20,
                medium: 50,
                long: 100,
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
                threshold: dec!(1.3),
            },
            risk: RiskSettings {
                stop_loss_pct: dec!(0.02),
                take_profit_pcts: vec![dec!(0.03), dec!(0.06), dec!(0.10)],
            },
        },
        StrategyClass::Position => Strategy {
            name: "position".to_string(),
            ema: EmaPeriods {
                short: 20,
                medium: 50,
                long: 200,
            },
            rsi: RsiSettings {
                period: 21,
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
                std_dev: dec!(2.5),
            },
            volume: VolumeSettings {
                threshold: dec!(1.2),
            },
            risk: RiskSettings {
                stop_loss_pct: dec!(0.05),
                take_profit_pcts: vec![dec!(0.10), dec!(0.20), dec!(0.30)],
            },
        },
    }
}
