//! Per-chat typing indicators
//!
//! Channels show "typing" while the agent works on a message: the indicator
//! starts when the inbound message arrives and stops when the reply is sent.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type TypingCallback = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Background tasks that refresh a typing indicator per chat
pub struct TypingIndicators {
    interval: Duration,
    notify: TypingCallback,
    root: CancellationToken,
    tasks: parking_lot::Mutex<HashMap<String, CancellationToken>>,
}

impl TypingIndicators {
    /// Create indicators that call `notify(chat_id)` right away and then every `interval`
    pub fn new<F, Fut>(interval: Duration, notify: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            interval,
            notify: Arc::new(move |chat_id| Box::pin(notify(chat_id))),
            root: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Start (or restart) the indicator for `chat_id`. Must run inside a Tokio runtime.
    pub fn start(&self, chat_id: &str) {
        let token = self.root.child_token();
        if let Some(previous) = self.tasks.lock().insert(chat_id.to_string(), token.clone()) {
            previous.cancel();
        }

        let notify = self.notify.clone();
        let interval = self.interval;
        let chat_id = chat_id.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = notify(chat_id.clone()) => {}
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });
    }

    /// Stop the indicator for `chat_id`, if one is running
    pub fn stop(&self, chat_id: &str) {
        if let Some(token) = self.tasks.lock().remove(chat_id) {
            token.cancel();
        }
    }

    /// Stop every indicator
    pub fn stop_all(&self) {
        for (_, token) in self.tasks.lock().drain() {
            token.cancel();
        }
    }

    /// Whether an indicator is running for `chat_id`
    pub fn is_active(&self, chat_id: &str) -> bool {
        self.tasks.lock().contains_key(chat_id)
    }
}

impl Drop for TypingIndicators {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
