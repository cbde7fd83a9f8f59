//! 트레이딩 시그널과 상태 전이.
//!
//! - `Direction` - 시그널 방향 (LONG/SHORT)
//! - `SignalStatus` - 생명주기 상태
//! - `Signal` - 알림 대상 시그널 레코드
//!
//! 상태는 단조적으로만 움직입니다:
//! `PENDING -> SENT -> {EXECUTED | FAILED}`, 그리고 발송 실패 시 `PENDING -> FAILED`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{SignalError, SignalResult};
use crate::types::{Timeframe, TradingPair};

/// 시그널 신뢰도 상한.
pub const MAX_CONFIDENCE: f64 = 10.0;

/// 시그널 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// 시그널 생명주기 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    /// 생성됨, 아직 발송 전
    Pending,
    /// 알림 채널로 발송 완료
    Sent,
    /// 사용자가 체결을 확인함
    Executed,
    /// 발송 또는 체결 실패
    Failed,
}

impl SignalStatus {
    /// `self -> next` 전이가 허용되는지 확인합니다.
    pub fn can_transition_to(&self, next: SignalStatus) -> bool {
        use SignalStatus::*;
        matches!(
            (self, next),
            (Pending, Sent) | (Pending, Failed) | (Sent, Executed) | (Sent, Failed)
        )
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalStatus::Pending => "PENDING",
            SignalStatus::Sent => "SENT",
            SignalStatus::Executed => "EXECUTED",
            SignalStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// 시그널 레코드.
///
/// JSON 형태: `{id, pair, exchange, direction, entry, stopLoss, targets[],
/// confidence, reasoning[], strategy, timeframe, createdAt, status}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: Uuid,
    pub pair: TradingPair,
    pub exchange: String,
    pub direction: Direction,
    /// 진입가
    #[serde(rename = "entry")]
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    /// 익절 목표가 (가까운 것부터)
    #[serde(rename = "targets")]
    pub take_profits: Vec<Decimal>,
    /// 0 ~ 10
    pub confidence: f64,
    /// 충족된 조건 설명
    pub reasoning: Vec<String>,
    #[serde(rename = "strategy")]
    pub strategy_name: String,
    pub timeframe: Timeframe,
    pub created_at: DateTime<Utc>,
    pub status: SignalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    /// 낙관적 잠금 버전. 저장소가 저장 시 증가시킵니다.
    #[serde(skip)]
    pub version: u64,
}

impl Signal {
    /// PENDING 상태의 새 시그널을 생성합니다.
    pub fn new(
        pair: TradingPair,
        exchange: impl Into<String>,
        direction: Direction,
        entry_price: Decimal,
        timeframe: Timeframe,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pair,
            exchange: exchange.into(),
            direction,
            entry_price,
            stop_loss: entry_price,
            take_profits: Vec::new(),
            confidence: 0.0,
            reasoning: Vec::new(),
            strategy_name: String::new(),
            timeframe,
            created_at,
            status: SignalStatus::Pending,
            sent_at: None,
            version: 0,
        }
    }

    pub fn with_stop_loss(mut self, stop_loss: Decimal) -> Self {
        self.stop_loss = stop_loss;
        self
    }

    pub fn with_take_profits(mut self, take_profits: Vec<Decimal>) -> Self {
        self.take_profits = take_profits;
        self
    }

    /// 신뢰도를 설정합니다 (0 ~ 10으로 제한).
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, MAX_CONFIDENCE);
        self
    }

    pub fn with_reasoning(mut self, reasoning: Vec<String>) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn with_strategy(mut self, name: impl Into<String>) -> Self {
        self.strategy_name = name.into();
        self
    }

    /// 상태를 전이합니다. SENT로 갈 때 `sent_at`을 기록합니다.
    pub fn transition_to(&mut self, next: SignalStatus, at: DateTime<Utc>) -> SignalResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(SignalError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        if next == SignalStatus::Sent {
            self.sent_at = Some(at);
        }
        self.status = next;
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.status == SignalStatus::Pending
    }

    /// 첫 번째 목표가 기준 손익비.
    pub fn risk_reward_ratio(&self) -> Option<Decimal> {
        let target = self.take_profits.first()?;
        let risk = (self.entry_price - self.stop_loss).abs();
        if risk.is_zero() {
            return None;
        }
        Some((*target - self.entry_price).abs() / risk)
    }
}
