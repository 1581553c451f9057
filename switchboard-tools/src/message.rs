//! Message sending tool

use crate::base::{Result, Tool, ToolError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use switchboard_core::bus::{MessageBus, OutboundMessage};
use tokio::sync::Mutex;

#[derive(Debug, Default, Clone)]
struct TurnContext {
    channel: String,
    chat_id: String,
    reply_to: Option<String>,
}

/// Message tool for sending messages to users.
///
/// Goes through [`MessageBus::send_direct`] so a failed delivery is reported
/// back to the caller instead of being lost in the dispatcher.
pub struct MessageTool {
    bus: MessageBus,
    context: Mutex<TurnContext>,
    sent_in_turn: AtomicBool,
}

impl MessageTool {
    /// Create a new message tool
    pub fn new(bus: MessageBus) -> Self {
        Self {
            bus,
            context: Mutex::new(TurnContext::default()),
            sent_in_turn: AtomicBool::new(false),
        }
    }

    /// Create with default context
    pub fn with_context(bus: MessageBus, channel: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bus,
            context: Mutex::new(TurnContext {
                channel: channel.into(),
                chat_id: chat_id.into(),
                reply_to: None,
            }),
            sent_in_turn: AtomicBool::new(false),
        }
    }

    /// Set the current message context and start a new turn
    pub async fn set_context(
        &self,
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        reply_to: Option<String>,
    ) {
        *self.context.lock().await = TurnContext {
            channel: channel.into(),
            chat_id: chat_id.into(),
            reply_to,
        };
        self.sent_in_turn.store(false, Ordering::SeqCst);
    }

    /// Whether a message was delivered since the last `set_context`
    pub fn sent_in_turn(&self) -> bool {
        self.sent_in_turn.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to the user. Use this when you want to communicate something."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The message content to send"
                },
                "channel": {
                    "type": "string",
                    "description": "Optional: target channel (console, discord, etc.)"
                },
                "chat_id": {
                    "type": "string",
                    "description": "Optional: target chat/user ID"
                },
                "media": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional: list of file paths to attach"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let content = params
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("Missing 'content' parameter".to_string()))?
            .to_string();

        let context = self.context.lock().await.clone();
        let channel = params
            .get("channel")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| context.channel.clone());
        let chat_id = params
            .get("chat_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| context.chat_id.clone());
        let media: Vec<String> = params
            .get("media")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        if channel.is_empty() || chat_id.is_empty() {
            return Ok("Error: No target channel/chat specified".to_string());
        }

        let mut msg = OutboundMessage::new(channel.clone(), chat_id.clone(), content);
        msg.media = media.clone();
        // Only thread the reply when talking to the chat the turn came from
        if channel == context.channel && chat_id == context.chat_id {
            if let Some(reply_to) = context.reply_to {
                msg = msg.reply_to(reply_to);
            }
        }

        match self.bus.send_direct(msg).await {
            Ok(()) => {
                self.sent_in_turn.store(true, Ordering::SeqCst);
                let media_info = if media.is_empty() {
                    String::new()
                } else {
                    format!(" with {} attachments", media.len())
                };
                Ok(format!("Message sent to {}:{}{}", channel, chat_id, media_info))
            }
            Err(e) => {
                tracing::warn!("Message tool delivery to {}:{} failed: {}", channel, chat_id, e);
                Ok(format!("Error sending message: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use switchboard_core::bus::ChannelSender;
    use switchboard_core::DeliveryError;

    #[derive(Default)]
    struct Recorder {
        sent: std::sync::Mutex<Vec<OutboundMessage>>,
        reject: bool,
    }

    #[async_trait]
    impl ChannelSender for Recorder {
        async fn send(&self, msg: OutboundMessage) -> std::result::Result<(), DeliveryError> {
            if self.reject {
                return Err(DeliveryError::Rejected("content too long".to_string()));
            }
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }
    }

    async fn bus_with(name: &str, recorder: Arc<Recorder>) -> MessageBus {
        let bus = MessageBus::new();
        let mut channels: HashMap<String, Arc<dyn ChannelSender>> = HashMap::new();
        channels.insert(name.to_string(), recorder);
        bus.register_channels(channels).await;
        bus
    }

    #[tokio::test]
    async fn test_sends_to_context_with_reply() {
        let recorder = Arc::new(Recorder::default());
        let bus = bus_with("discord", recorder.clone()).await;
        let tool = MessageTool::new(bus);
        tool.set_context("discord", "42", Some("m-9".to_string())).await;

        let result = tool
            .execute(json!({"content": "Hello", "media": ["/tmp/a.png"]}))
            .await
            .unwrap();

        assert_eq!(result, "Message sent to discord:42 with 1 attachments");
        assert!(tool.sent_in_turn());
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent[0].reply_to.as_deref(), Some("m-9"));
        assert_eq!(sent[0].media, vec!["/tmp/a.png"]);
    }

    #[tokio::test]
    async fn test_explicit_target_drops_reply() {
        let recorder = Arc::new(Recorder::default());
        let bus = bus_with("discord", recorder.clone()).await;
        let tool = MessageTool::with_context(bus, "discord", "42");
        tool.set_context("discord", "42", Some("m-9".to_string())).await;

        tool.execute(json!({"content": "psst", "chat_id": "7"}))
            .await
            .unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent[0].chat_id, "7");
        assert_eq!(sent[0].reply_to, None);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_reported_as_text() {
        let recorder = Arc::new(Recorder {
            reject: true,
            ..Recorder::default()
        });
        let bus = bus_with("discord", recorder).await;
        let tool = MessageTool::with_context(bus.clone(), "discord", "42");

        let result = tool.execute(json!({"content": "Hello"})).await.unwrap();

        assert_eq!(result, "Error sending message: Message rejected: content too long");
        assert!(!tool.sent_in_turn());
        assert_eq!(bus.outbound_size(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_channel_falls_back_to_queue() {
        let bus = MessageBus::new();
        let tool = MessageTool::with_context(bus.clone(), "slack", "c1");

        let result = tool.execute(json!({"content": "Hello"})).await.unwrap();

        assert_eq!(result, "Message sent to slack:c1");
        assert_eq!(bus.outbound_size(), 1);
    }

    #[tokio::test]
    async fn test_no_context() {
        let tool = MessageTool::new(MessageBus::new());
        let result = tool.execute(json!({"content": "Hello"})).await.unwrap();
        assert!(result.contains("No target channel/chat"));

        assert!(tool.execute(json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_set_context_starts_new_turn() {
        let bus = MessageBus::new();
        let tool = MessageTool::with_context(bus, "console", "direct");
        tool.execute(json!({"content": "one"})).await.unwrap();
        assert!(tool.sent_in_turn());

        tool.set_context("console", "direct", None).await;
        assert!(!tool.sent_in_turn());
    }
}
