//! # Signal Notification
//!
//! 트레이딩 시그널 알림 서비스.
//!
//! 지원 채널:
//! - Telegram (Bot API, HTML 메시지)
//! - 로그 (tracing 이벤트, 드라이런용)
//!
//! `NotificationManager`는 활성 채널마다 한 번씩 전송을 시도하고 채널별
//! 결과를 `DeliveryReport`로 돌려줍니다.

pub mod log_sender;
pub mod manager;
pub mod recording;
pub mod telegram;
pub mod types;

pub use log_sender::LogSender;
pub use manager::{ChannelOutcome, DeliveryReport, NotificationManager};
pub use recording::RecordingSender;
pub use telegram::*;
pub use types::*;
