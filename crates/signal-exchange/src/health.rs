//! 거래소 연결 상태와 요청 한도 예산.
//!
//! 헬스 점수는 저장하지 않고 매번 카운터에서 계산합니다.
//!
//! ```text
//! score = 성공률 × 60 + 지연 점수(0 ~ 40), 연결 끊김이면 0
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::gauge;
use serde::Serialize;

use crate::error::ExchangeError;
use crate::traits::RateLimitSnapshot;

const RELIABILITY_WEIGHT: f64 = 60.0;

/// 요청 한도 예산. 가장 최근 응답의 한도 정보로 갱신됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateBudget {
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateBudget {
    /// 다음 호출 전에 쉬어야 할 시간.
    ///
    /// - 창이 이미 리셋됐으면 0
    /// - 남은 예산이 0이면 리셋까지 남은 시간을 담은 `RateLimit` 에러
    /// - 남은 예산이 `low_water` 이하면 남은 호출을 리셋 시각까지 고르게 나눈 간격
    pub fn recommended_delay(
        &self,
        now: DateTime<Utc>,
        low_water: u32,
    ) -> Result<Duration, ExchangeError> {
        let until_reset = (self.reset_at - now).to_std().unwrap_or(Duration::ZERO);
        if until_reset.is_zero() {
            return Ok(Duration::ZERO);
        }

        if self.remaining == 0 {
            return Err(ExchangeError::RateLimit {
                retry_after_ms: until_reset.as_millis() as u64,
            });
        }

        if self.remaining <= low_water {
            return Ok(until_reset / (self.remaining + 1));
        }

        Ok(Duration::ZERO)
    }
}

impl From<RateLimitSnapshot> for RateBudget {
    fn from(snapshot: RateLimitSnapshot) -> Self {
        Self {
            remaining: snapshot.remaining,
            limit: snapshot.limit,
            reset_at: snapshot.reset_at,
        }
    }
}

/// 거래소 연결 상태.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExchangeHealth {
    pub is_connected: bool,
    /// 마지막 성공 호출의 지연 시간
    pub latency: Option<Duration>,
    pub error_count: u64,
    pub success_count: u64,
    pub rate_limit: Option<RateBudget>,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl ExchangeHealth {
    /// 0 ~ 100 헬스 점수.
    pub fn score(&self) -> u8 {
        if !self.is_connected {
            return 0;
        }

        let total = self.success_count + self.error_count;
        let success_rate = if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        };

        let reliability = (success_rate * RELIABILITY_WEIGHT).round() as u8;
        reliability + Self::latency_points(self.latency)
    }

    fn latency_points(latency: Option<Duration>) -> u8 {
        match latency.map(|l| l.as_millis()) {
            None => 20,
            Some(ms) if ms <= 200 => 40,
            Some(ms) if ms <= 500 => 30,
            Some(ms) if ms <= 1000 => 20,
            Some(ms) if ms <= 3000 => 10,
            Some(_) => 0,
        }
    }

    pub fn is_healthy(&self, min_score: u8) -> bool {
        self.score() >= min_score
    }

    pub fn error_rate(&self) -> f64 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            0.0
        } else {
            self.error_count as f64 / total as f64
        }
    }

    pub fn record_success(
        &mut self,
        latency: Duration,
        rate_limit: Option<RateLimitSnapshot>,
        now: DateTime<Utc>,
    ) {
        self.is_connected = true;
        self.success_count += 1;
        self.latency = Some(latency);
        self.last_success_at = Some(now);
        if let Some(snapshot) = rate_limit {
            self.rate_limit = Some(snapshot.into());
        }
    }

    pub fn record_failure(&mut self, error: &ExchangeError, now: DateTime<Utc>) {
        self.error_count += 1;
        self.last_error = Some(error.to_string());

        match error {
            ExchangeError::RateLimit { retry_after_ms } => {
                let limit = self.rate_limit.map(|b| b.limit).unwrap_or_default();
                self.rate_limit = Some(RateBudget {
                    remaining: 0,
                    limit,
                    reset_at: now + chrono::Duration::milliseconds(*retry_after_ms as i64),
                });
            }
            e if e.is_connection_loss() => self.is_connected = false,
            _ => {}
        }
    }

    /// 현재 상태를 `exchange` 라벨을 붙여 게이지로 내보냅니다.
    pub fn export_metrics(&self, exchange: &str) {
        let exchange = exchange.to_string();
        gauge!("exchange_health_score", "exchange" => exchange.clone()).set(self.score() as f64);
        gauge!("exchange_connected", "exchange" => exchange.clone())
            .set(if self.is_connected { 1.0 } else { 0.0 });
        gauge!("exchange_error_count", "exchange" => exchange.clone()).set(self.error_count as f64);
        gauge!("exchange_success_count", "exchange" => exchange.clone())
            .set(self.success_count as f64);
        if let Some(latency) = self.latency {
            gauge!("exchange_latency_seconds", "exchange" => exchange.clone())
                .set(latency.as_secs_f64());
        }
        if let Some(budget) = self.rate_limit {
            gauge!("exchange_rate_limit_remaining", "exchange" => exchange)
                .set(budget.remaining as f64);
        }
    }

    pub fn mark_disconnected(&mut self, reason: impl Into<String>) {
        self.is_connected = false;
        self.last_error = Some(reason.into());
    }

    /// 다음 호출 전 권장 대기 시간. 한도 정보가 없으면 0.
    pub fn recommended_delay(
        &self,
        now: DateTime<Utc>,
        low_water: u32,
    ) -> Result<Duration, ExchangeError> {
        match &self.rate_limit {
            Some(budget) => budget.recommended_delay(now, low_water),
            None => Ok(Duration::ZERO),
        }
    }
}
