//! 저수준 거래소 클라이언트 인터페이스.
//!
//! 구현체는 거래소 API를 그대로 호출하고 결과와 함께 응답에 실린 요청 한도
//! 정보를 돌려줍니다. 한도 관리, 타임아웃, 헬스 추적은 `ExchangeAdapter`의 몫입니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use signal_core::{Candle, MarketInfo, Ticker, Timeframe, TradingPair};

use crate::error::ExchangeError;

/// 거래소 작업 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 응답 시점의 요청 한도 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    /// 현재 창에서 남은 요청 수 (가중치)
    pub remaining: u32,
    /// 창당 전체 한도
    pub limit: u32,
    /// 한도가 다시 채워지는 시각
    pub reset_at: DateTime<Utc>,
}

/// 거래소 응답과 한도 정보.
#[derive(Debug, Clone)]
pub struct ProviderResponse<T> {
    pub data: T,
    pub rate_limit: Option<RateLimitSnapshot>,
}

impl<T> ProviderResponse<T> {
    /// 한도 정보 없는 응답.
    pub fn new(data: T) -> Self {
        Self {
            data,
            rate_limit: None,
        }
    }

    pub fn with_rate_limit(mut self, snapshot: RateLimitSnapshot) -> Self {
        self.rate_limit = Some(snapshot);
        self
    }
}

/// 자산 잔고.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    /// 사용 가능 수량
    pub free: Decimal,
    /// 주문에 묶인 수량
    pub locked: Decimal,
}

impl Balance {
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// 저수준 거래소 클라이언트.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// 거래소 이름 ("binance" 등).
    fn name(&self) -> &str;

    /// 연결을 확인합니다 (REST 거래소는 서버 응답 확인).
    async fn connect(&self) -> ExchangeResult<()>;

    /// 서버 왕복 확인.
    async fn ping(&self) -> ExchangeResult<ProviderResponse<()>>;

    /// 캔들 조회. 순서나 중복은 보장하지 않습니다.
    async fn fetch_candles(
        &self,
        pair: &TradingPair,
        timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<ProviderResponse<Vec<Candle>>>;

    /// 24시간 시세 조회.
    async fn fetch_ticker(&self, pair: &TradingPair) -> ExchangeResult<ProviderResponse<Ticker>>;

    /// 상장 거래쌍 목록.
    async fn fetch_markets(&self) -> ExchangeResult<ProviderResponse<Vec<MarketInfo>>>;

    /// 자산 잔고 (인증 필요).
    async fn fetch_balance(&self, asset: &str) -> ExchangeResult<ProviderResponse<Balance>>;
}
