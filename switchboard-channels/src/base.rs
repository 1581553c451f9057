//! Base trait for channel handlers

use async_trait::async_trait;
use std::sync::Arc;
use switchboard_core::bus::{ChannelSender, InboundMessage, MessageBus, OutboundMessage};
use switchboard_core::DeliveryError;

/// Trait for channel handlers
///
/// Delivery comes from [`ChannelSender::send`]; everything else here is the
/// handler's lifecycle and ingestion policy.
#[async_trait]
pub trait ChannelHandler: ChannelSender {
    /// Get the channel name
    fn name(&self) -> &str;

    /// Check if the channel is running
    fn is_running(&self) -> bool;

    /// Start ingestion in the background and return
    async fn start(&self) -> Result<()>;

    /// Stop ingestion and any per-chat background tasks
    async fn stop(&self) -> Result<()>;

    /// Check if a sender is allowed
    fn is_allowed(&self, sender_id: &str) -> bool;
}

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel error: {0}")]
    Error(String),

    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Channel not running: {0}")]
    NotRunning(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Access denied for sender: {0}")]
    AccessDenied(String),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Base channel implementation with common functionality
#[derive(Clone)]
pub struct BaseChannel {
    /// Channel name
    pub name: String,
    /// Allowed senders list (empty = allow all)
    pub allow_from: Vec<String>,
    /// Bus that receives inbound messages
    bus: MessageBus,
}

impl BaseChannel {
    /// Create a new base channel
    pub fn new(name: impl Into<String>, allow_from: Vec<String>, bus: MessageBus) -> Self {
        Self {
            name: name.into(),
            allow_from,
            bus,
        }
    }

    /// The bus this channel publishes to
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Check if a sender is allowed
    pub fn is_allowed(&self, sender_id: &str) -> bool {
        // If no allow list, allow everyone
        if self.allow_from.is_empty() {
            return true;
        }

        if self.allow_from.iter().any(|allowed| allowed == sender_id) {
            return true;
        }

        // Handle compound IDs (e.g., "12345|username")
        if sender_id.contains('|') {
            return sender_id
                .split('|')
                .any(|part| !part.is_empty() && self.allow_from.iter().any(|a| a == part));
        }

        false
    }

    /// Handle an incoming message
    pub fn handle_message(
        &self,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
        media: Vec<String>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<()> {
        let sender_id = sender_id.into();

        // Check permissions
        if !self.is_allowed(&sender_id) {
            tracing::warn!(
                "Access denied for sender {} on channel {}. Add them to allow_from in config to grant access.",
                sender_id,
                self.name
            );
            return Err(ChannelError::AccessDenied(sender_id));
        }

        let mut msg = InboundMessage::new(self.name.clone(), sender_id, chat_id, content);

        for m in media {
            msg = msg.with_media(m);
        }

        if let Some(meta) = metadata {
            for (key, value) in meta {
                msg = msg.with_metadata(key, value);
            }
        }

        self.bus.publish_inbound(msg);
        Ok(())
    }
}

/// Shared channel handler type
pub type ChannelHandlerPtr = Arc<dyn ChannelHandler>;

/// Exposes a handler to the bus as a direct-send adapter
pub(crate) struct HandlerSender(pub(crate) ChannelHandlerPtr);

#[async_trait]
impl ChannelSender for HandlerSender {
    async fn send(&self, msg: OutboundMessage) -> std::result::Result<(), DeliveryError> {
        self.0.send(msg).await
    }
}
