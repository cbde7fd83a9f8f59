//! 메모리 기록 전송기.
//!
//! 보낸 알림을 저장하고, 실패를 주입할 수 있습니다. 드라이런과 테스트에서
//! 실제 채널 대신 씁니다.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::types::{Notification, NotificationError, NotificationResult, NotificationSender};

#[derive(Default)]
struct RecordingState {
    sent: Vec<Notification>,
    attempts: usize,
    failures: VecDeque<String>,
    fail_always: Option<String>,
}

/// 보낸 알림을 기록하는 전송기. 복제본은 같은 기록을 공유합니다.
#[derive(Clone)]
pub struct RecordingSender {
    name: String,
    enabled: bool,
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingSender {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            state: Arc::new(Mutex::new(RecordingState::default())),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// 다음 전송 한 번을 실패시킵니다.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.state.lock().unwrap().failures.push_back(reason.into());
    }

    /// 이후 모든 전송을 실패시킵니다.
    pub fn fail_always(&self, reason: impl Into<String>) {
        self.state.lock().unwrap().fail_always = Some(reason.into());
    }

    /// 성공적으로 보낸 알림.
    pub fn sent(&self) -> Vec<Notification> {
        self.state.lock().unwrap().sent.clone()
    }

    /// 실패 포함 전송 시도 횟수.
    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;

        if let Some(reason) = state.failures.pop_front().or_else(|| state.fail_always.clone()) {
            return Err(NotificationError::SendFailed(reason));
        }

        state.sent.push(notification.clone());
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn name(&self) -> &str {
        &self.name
    }
}
