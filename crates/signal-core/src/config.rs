//! 설정 관리.
//!
//! TOML 파일을 읽고 `SIGNAL__` 접두사 환경 변수로 덮어씁니다.
//! 예: `SIGNAL__MONITOR__POLL_INTERVAL_SECS=30`,
//! `SIGNAL__EXCHANGES__BINANCE__API_KEY=...`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// 폴링 루프 설정
    pub monitor: MonitorConfig,
    /// 시그널 발송 재시도 설정
    pub dispatch: DispatchConfig,
    /// 이벤트 버스 설정
    pub event_bus: EventBusConfig,
    /// 거래소 설정 (이름 -> 설정)
    pub exchanges: HashMap<String, ExchangeConfig>,
    /// 감시 종목 목록
    pub instruments: Vec<InstrumentConfig>,
    /// 알림 설정
    pub notifications: NotificationConfig,
    /// Prometheus 메트릭 노출
    pub metrics: MetricsConfig,
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
    /// span 진입/종료 이벤트 출력
    pub span_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            span_events: false,
        }
    }
}

/// 폴링 루프 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 사이클 간격 (초)
    pub poll_interval_secs: u64,
    /// 사이클마다 가져올 캔들 수
    pub candle_limit: usize,
    /// 종목별 설정이 없을 때의 쿨다운 (초)
    pub default_cooldown_secs: u64,
    /// 이 점수 미만이면 재연결을 시도하고 해당 거래소를 건너뜀
    pub min_health_score: u8,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            candle_limit: 200,
            default_cooldown_secs: 3600,
            min_health_score: 50,
        }
    }
}

/// 발송 재시도 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 최대 시도 횟수
    pub max_attempts: u32,
    /// 백오프 기본값 (밀리초). 실제 대기는 `base * 2^attempt`.
    pub base_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 100,
        }
    }
}

/// 이벤트 버스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// 발행 이벤트 보관 여부
    pub store_events: bool,
    /// 보관할 최대 이벤트 수
    pub store_capacity: usize,
    /// 대기자 알림 채널 크기
    pub waiter_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            store_events: true,
            store_capacity: 1000,
            waiter_capacity: 256,
        }
    }
}

/// 메트릭 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "0.0.0.0:9100".to_string(),
        }
    }
}

/// 거래소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub enabled: bool,
    /// 테스트넷 사용
    pub testnet: bool,
    /// REST 기본 URL 재정의
    pub rest_base_url: Option<String>,
    /// 호출 타임아웃 (밀리초)
    pub timeout_ms: u64,
    /// 분당 요청 가중치 한도
    pub rate_limit_per_minute: u32,
    /// 남은 요청 수가 이 값 이하로 내려가면 호출 간격을 벌림
    pub rate_limit_low_water: u32,
    /// API 키 (서명 요청에만 필요)
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            testnet: false,
            rest_base_url: None,
            timeout_ms: 10_000,
            rate_limit_per_minute: 1200,
            rate_limit_low_water: 120,
            api_key: None,
            api_secret: None,
        }
    }
}

/// 감시 종목 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstrumentConfig {
    /// 거래쌍 ("BTC/USDT" 또는 "BTCUSDT")
    pub symbol: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    /// 카테고리 재정의. 없으면 기준 자산으로 추정
    #[serde(default)]
    pub category: Option<String>,
    /// 쿨다운 재정의 (초)
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_exchange() -> String {
    "binance".to_string()
}

fn default_timeframe() -> String {
    "1h".to_string()
}

fn default_true() -> bool {
    true
}

/// 알림 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// 로그 채널 사용 여부
    pub log_channel: bool,
    /// 텔레그램 설정
    pub telegram: TelegramConfig,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            log_channel: true,
            telegram: TelegramConfig::default(),
        }
    }
}

/// 텔레그램 알림 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다. 파일이 없으면 기본값에서 시작합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("SIGNAL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }

    /// TOML 문자열에서 설정을 로드합니다 (환경 변수 무시).
    pub fn from_toml_str(s: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(s, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// 현재 설정을 TOML 문자열로 직렬화합니다.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// 이름으로 거래소 설정을 찾습니다. 없으면 기본값.
    pub fn exchange(&self, name: &str) -> ExchangeConfig {
        self.exchanges.get(name).cloned().unwrap_or_default()
    }
}
