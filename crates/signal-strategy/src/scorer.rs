//! 시그널 스코어러.
//!
//! 방향마다 고정된 7개 조건을 평가해 충족된 개수를 점수로 씁니다.
//!
//! | 조건 | SHORT | LONG |
//! |------|-------|------|
//! | `price_vs_ema_short` | 가격 < 단기 EMA | 가격 > 단기 EMA |
//! | `ema_alignment` | 단기 EMA < 중기 EMA | 단기 EMA > 중기 EMA |
//! | `macd_vs_signal` | MACD < 시그널 | MACD > 시그널 |
//! | `rsi_momentum_band` | 과매도 < RSI < 50 | 50 < RSI < 과매수 |
//! | `volume_spike` | 거래량 배수 ≥ 기준 | 거래량 배수 ≥ 기준 |
//! | `price_vs_bb_middle` | 가격 < 볼린저 중심선 | 가격 > 볼린저 중심선 |
//! | `candle_body` | 음봉 | 양봉 |
//!
//! SHORT를 먼저 보고 점수가 최소 강도 이상이면 SHORT, 아니면 LONG이
//! 최소 강도 - 1 이상일 때 LONG입니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use signal_analytics::IndicatorSnapshot;
use signal_core::{AdaptedStrategy, Candle, Direction, InstrumentContext, Signal, MAX_CONFIDENCE};
use tracing::debug;

const RSI_MIDLINE: Decimal = dec!(50);
const CONFIDENCE_PER_POINT: f64 = 1.5;
const PRICE_SCALE: u32 = 8;

/// 조건 하나의 평가 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// 시그널로 이어진 평가 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub direction: Direction,
    pub score: u8,
    pub confidence: f64,
    pub conditions: Vec<ConditionCheck>,
}

impl Evaluation {
    /// 충족된 조건. `"조건 이름: 설명"` 형식이라 앞부분으로 조건을 식별할 수 있습니다.
    pub fn reasoning(&self) -> Vec<String> {
        self.conditions
            .iter()
            .filter(|c| c.passed)
            .map(|c| format!("{}: {}", c.name, c.detail))
            .collect()
    }
}

fn check(name: &'static str, passed: bool, detail: String) -> ConditionCheck {
    ConditionCheck {
        name,
        passed,
        detail,
    }
}

/// 한 방향의 조건들을 평가합니다.
pub fn score_direction(
    direction: Direction,
    snapshot: &IndicatorSnapshot,
    candle: &Candle,
    strategy: &AdaptedStrategy,
) -> Vec<ConditionCheck> {
    let s = snapshot;
    let rsi = &strategy.strategy.rsi;
    let volume_threshold = strategy.strategy.volume.threshold;

    let volume_spike = check(
        "volume_spike",
        s.volume_ratio >= volume_threshold,
        format!(
            "Volume {}x average (threshold {}x)",
            s.volume_ratio.round_dp(2),
            volume_threshold.round_dp(2)
        ),
    );

    match direction {
        Direction::Short => vec![
            check(
                "price_vs_ema_short",
                s.price < s.ema_short,
                format!("Price {} below EMA short {}", s.price, s.ema_short.round_dp(4)),
            ),
            check(
                "ema_alignment",
                s.ema_short < s.ema_medium,
                "EMA short below EMA medium".to_string(),
            ),
            check(
                "macd_vs_signal",
                s.macd < s.macd_signal,
                "MACD below signal line".to_string(),
            ),
            check(
                "rsi_momentum_band",
                s.rsi > rsi.oversold && s.rsi < RSI_MIDLINE,
                format!("RSI {} in bearish band", s.rsi.round_dp(2)),
            ),
            volume_spike,
            check(
                "price_vs_bb_middle",
                s.price < s.bb_middle,
                "Price below Bollinger middle band".to_string(),
            ),
            check("candle_body", candle.is_bearish(), "Bearish candle".to_string()),
        ],
        Direction::Long => vec![
            check(
                "price_vs_ema_short",
                s.price > s.ema_short,
                format!("Price {} above EMA short {}", s.price, s.ema_short.round_dp(4)),
            ),
            check(
                "ema_alignment",
                s.ema_short > s.ema_medium,
                "EMA short above EMA medium".to_string(),
            ),
            check(
                "macd_vs_signal",
                s.macd > s.macd_signal,
                "MACD above signal line".to_string(),
            ),
            check(
                "rsi_momentum_band",
                s.rsi > RSI_MIDLINE && s.rsi < rsi.overbought,
                format!("RSI {} in bullish band", s.rsi.round_dp(2)),
            ),
            volume_spike,
            check(
                "price_vs_bb_middle",
                s.price > s.bb_middle,
                "Price above Bollinger middle band".to_string(),
            ),
            check("candle_body", candle.is_bullish(), "Bullish candle".to_string()),
        ],
    }
}

fn passed_count(conditions: &[ConditionCheck]) -> u8 {
    conditions.iter().filter(|c| c.passed).count() as u8
}

/// 점수당 1.5, 최대 10.
pub fn confidence_for(score: u8) -> f64 {
    (score as f64 * CONFIDENCE_PER_POINT).min(MAX_CONFIDENCE)
}

/// 스냅샷을 평가해 시그널 방향을 정합니다. 조건이 모자라면 `None`.
pub fn evaluate(
    snapshot: &IndicatorSnapshot,
    candle: &Candle,
    strategy: &AdaptedStrategy,
    min_strength: u8,
) -> Option<Evaluation> {
    let short = score_direction(Direction::Short, snapshot, candle, strategy);
    let short_score = passed_count(&short);

    if short_score >= min_strength {
        return Some(Evaluation {
            direction: Direction::Short,
            score: short_score,
            confidence: confidence_for(short_score),
            conditions: short,
        });
    }

    let long = score_direction(Direction::Long, snapshot, candle, strategy);
    let long_score = passed_count(&long);

    if long_score >= min_strength.saturating_sub(1) {
        return Some(Evaluation {
            direction: Direction::Long,
            score: long_score,
            confidence: confidence_for(long_score),
            conditions: long,
        });
    }

    debug!(
        short_score,
        long_score, min_strength, "No direction reached minimum strength"
    );
    None
}

/// 진입가 기준 손절가와 목표가. 방향에 따라 부호가 뒤집힙니다.
pub fn risk_levels(
    direction: Direction,
    entry: Decimal,
    strategy: &AdaptedStrategy,
) -> (Decimal, Vec<Decimal>) {
    let risk = &strategy.strategy.risk;
    let sign = match direction {
        Direction::Long => Decimal::ONE,
        Direction::Short => -Decimal::ONE,
    };

    let stop_loss = (entry * (Decimal::ONE - sign * risk.stop_loss_pct)).round_dp(PRICE_SCALE);
    let targets = risk
        .take_profit_pcts
        .iter()
        .map(|tp| (entry * (Decimal::ONE + sign * *tp)).round_dp(PRICE_SCALE))
        .collect();

    (stop_loss, targets)
}

/// 종목 컨텍스트와 스냅샷으로 PENDING 시그널을 만듭니다.
pub fn generate_signal(
    ctx: &InstrumentContext,
    snapshot: &IndicatorSnapshot,
    candle: &Candle,
    now: DateTime<Utc>,
) -> Option<Signal> {
    let evaluation = evaluate(snapshot, candle, &ctx.strategy, ctx.min_signal_strength)?;
    let entry = snapshot.price;
    let (stop_loss, targets) = risk_levels(evaluation.direction, entry, &ctx.strategy);

    debug!(
        symbol = %ctx.symbol,
        direction = %evaluation.direction,
        score = evaluation.score,
        confidence = evaluation.confidence,
        "Signal conditions met"
    );

    Some(
        Signal::new(
            ctx.symbol.clone(),
            ctx.exchange.clone(),
            evaluation.direction,
            entry,
            ctx.timeframe,
            now,
        )
        .with_stop_loss(stop_loss)
        .with_take_profits(targets)
        .with_confidence(evaluation.confidence)
        .with_reasoning(evaluation.reasoning())
        .with_strategy(ctx.strategy.strategy.name.clone()),
    )
}
