//! 종목 카테고리별 전략 조정.
//!
//! 변동성이 큰 카테고리일수록 손절/익절 폭과 거래량 기준을 넓히고,
//! 시그널 발생에 필요한 최소 조건 수를 올립니다.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use signal_core::{AdaptedStrategy, InstrumentCategory, Strategy, StrategyClass, Timeframe};
use tracing::debug;

use crate::templates::base_template;

/// RSI 기준을 넓히는 변동성 문턱.
const WIDE_RSI_VOLATILITY: Decimal = dec!(1.2);
/// 고변동성 카테고리에서 RSI 기준을 넓히는 폭.
const RSI_WIDENING: Decimal = dec!(5);

/// 카테고리별 조정 배수.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryProfile {
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub volume_weight: Decimal,
    pub volatility: Decimal,
    pub min_signal_strength: u8,
}

impl CategoryProfile {
    pub fn for_category(category: InstrumentCategory) -> Self {
        let (stop_loss, take_profit, volume_weight, volatility, min_signal_strength) =
            match category {
                InstrumentCategory::Major => (dec!(1.0), dec!(1.0), dec!(1.0), dec!(1.0), 4),
                InstrumentCategory::Alt => (dec!(1.2), dec!(1.2), dec!(1.1), dec!(1.15), 4),
                InstrumentCategory::Defi => (dec!(1.3), dec!(1.3), dec!(1.2), dec!(1.3), 5),
                InstrumentCategory::Meme => (dec!(1.5), dec!(1.8), dec!(1.5), dec!(2.0), 5),
                InstrumentCategory::Stablecoin => (dec!(0.5), dec!(0.5), dec!(0.8), dec!(0.3), 6),
            };

        Self {
            stop_loss,
            take_profit,
            volume_weight,
            volatility,
            min_signal_strength,
        }
    }
}

/// 기본 전략을 카테고리에 맞게 조정합니다.
///
/// 입력을 바꾸지 않고 새 값을 돌려주므로 같은 입력이면 항상 같은 결과입니다.
pub fn adapt(base: &Strategy, category: InstrumentCategory) -> AdaptedStrategy {
    let profile = CategoryProfile::for_category(category);
    let mut strategy = base.clone();

    strategy.name = format!("{}-{}", base.name, category);
    strategy.risk.stop_loss_pct = base.risk.stop_loss_pct * profile.stop_loss;
    strategy.risk.take_profit_pcts = base
        .risk
        .take_profit_pcts
        .iter()
        .map(|tp| *tp * profile.take_profit)
        .collect();
    strategy.volume.threshold = base.volume.threshold * profile.volume_weight;

    if profile.volatility > WIDE_RSI_VOLATILITY {
        strategy.rsi.oversold = base.rsi.oversold - RSI_WIDENING;
        strategy.rsi.overbought = base.rsi.overbought + RSI_WIDENING;
    }

    AdaptedStrategy {
        strategy,
        category,
        min_signal_strength: profile.min_signal_strength,
    }
}

/// 분류별 기본 템플릿을 들고 있다가 종목마다 조정된 전략을 만들어 줍니다.
#[derive(Debug, Clone)]
pub struct StrategyAdapter {
    templates: HashMap<StrategyClass, Strategy>,
}

impl Default for StrategyAdapter {
    fn default() -> Self {
        let templates = [
            StrategyClass::Scalping,
            StrategyClass::Intraday,
            StrategyClass::Swing,
            StrategyClass::Position,
        ]
        .into_iter()
        .map(|class| (class, base_template(class)))
        .collect();

        Self { templates }
    }
}

impl StrategyAdapter {
    /// 분류의 기본 템플릿을 교체합니다.
    pub fn with_template(mut self, class: StrategyClass, strategy: Strategy) -> Self {
        self.templates.insert(class, strategy);
        self
    }

    pub fn template(&self, class: StrategyClass) -> Strategy {
        self.templates
            .get(&class)
            .cloned()
            .unwrap_or_else(|| base_template(class))
    }

    /// 타임프레임과 카테고리에 맞는 전략.
    pub fn adapt_for(&self, timeframe: Timeframe, category: InstrumentCategory) -> AdaptedStrategy {
        let class = timeframe.strategy_class();
        let adapted = adapt(&self.template(class), category);

        debug!(
            timeframe = %timeframe,
            category = %category,
            strategy = %adapted.strategy.name,
            min_strength = adapted.min_signal_strength,
            "Strategy adapted"
        );
        adapted
    }
}
