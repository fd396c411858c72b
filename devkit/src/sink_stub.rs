/*!
Recording notification sink

Keeps every message the operator would have received. Can be switched into
a failing mode to simulate an unreachable chat API.
*/

use async_trait::async_trait;
use hostkeeper_agent::error::{MonitorError, MonitorResult};
use hostkeeper_agent::notifier::{MessageFormat, NotificationSink, OperatorId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub operator: OperatorId,
    pub text: String,
    pub format: MessageFormat,
}

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.text).collect()
    }

    /// Delivery attempts, including failed ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, operator: OperatorId, text: &str, format: MessageFormat) -> MonitorResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            log::warn!("📪 [STUB] Dropping message: {}", text);
            return Err(MonitorError::NotificationDelivery("sink is failing".to_string()));
        }

        log::info!("📨 [STUB] {}", text);
        self.sent.lock().unwrap().push(SentMessage {
            operator,
            text: text.to_string(),
            format,
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
