//! Channel manager

use crate::base::{ChannelError, ChannelHandlerPtr, HandlerSender, Result};
use crate::console::ConsoleHandler;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use switchboard_core::bus::{ChannelSender, MessageBus, OutboundMessage};
use switchboard_core::config::schema::Config;
use tokio::sync::{Mutex, RwLock};

/// Channel manager that coordinates all channel handlers
pub struct ChannelManager {
    /// Configuration
    config: Config,
    /// Bus the channels publish to and receive from
    bus: MessageBus,
    /// Channel handlers
    handlers: RwLock<HashMap<String, ChannelHandlerPtr>>,
    /// Channels already subscribed to the outbound dispatcher
    subscribed: Mutex<HashSet<String>>,
}

impl ChannelManager {
    /// Create a new channel manager
    pub fn new(config: Config, bus: MessageBus) -> Self {
        Self {
            config,
            bus,
            handlers: RwLock::new(HashMap::new()),
            subscribed: Mutex::new(HashSet::new()),
        }
    }

    /// Initialize channels based on configuration
    pub async fn initialize(&self) -> Result<()> {
        let console = &self.config.channels.console;
        if console.enabled {
            if console.sender_id.is_empty() || console.chat_id.is_empty() {
                tracing::warn!("Console channel enabled but sender_id/chat_id not configured");
            } else {
                let handler = ConsoleHandler::new(
                    console,
                    self.bus.clone(),
                    self.config.agent.max_message_length,
                );
                self.add_handler(Arc::new(handler)).await;
                tracing::info!("Console channel initialized");
            }
        }

        Ok(())
    }

    /// Add a handler, replacing any handler with the same name
    pub async fn add_handler(&self, handler: ChannelHandlerPtr) {
        let name = handler.name().to_string();
        let mut handlers = self.handlers.write().await;
        if handlers.insert(name.clone(), handler).is_some() {
            tracing::warn!("Replacing existing {} channel handler", name);
        }
    }

    /// Expose the handlers to the bus.
    ///
    /// Registers every handler for direct send and subscribes it to the
    /// dispatcher. A channel is subscribed at most once.
    pub async fn register_with_bus(&self) {
        let handlers = self.handlers.read().await;

        let adapters: HashMap<String, Arc<dyn ChannelSender>> = handlers
            .iter()
            .map(|(name, handler)| {
                let sender: Arc<dyn ChannelSender> = Arc::new(HandlerSender(handler.clone()));
                (name.clone(), sender)
            })
            .collect();
        self.bus.register_channels(adapters).await;

        let mut subscribed = self.subscribed.lock().await;
        for (name, handler) in handlers.iter() {
            if !subscribed.insert(name.clone()) {
                continue;
            }
            let handler = handler.clone();
            self.bus
                .subscribe_outbound(name.clone(), move |msg| {
                    let handler = handler.clone();
                    async move { handler.send(msg).await }
                })
                .await;
            tracing::debug!("Subscribed {} channel to outbound dispatch", name);
        }
    }

    /// Start all channel handlers
    pub async fn start_all(&self) -> Result<()> {
        let handlers = self.handlers.read().await;

        for (name, handler) in handlers.iter() {
            tracing::info!("Starting {} channel...", name);
            if let Err(e) = handler.start().await {
                tracing::error!("Failed to start {} channel: {}", name, e);
            }
        }

        Ok(())
    }

    /// Stop all channel handlers and withdraw them from direct send
    pub async fn stop_all(&self) -> Result<()> {
        self.bus.register_channels(HashMap::new()).await;

        let handlers = self.handlers.read().await;
        for (name, handler) in handlers.iter() {
            tracing::info!("Stopping {} channel...", name);
            if let Err(e) = handler.stop().await {
                tracing::error!("Failed to stop {} channel: {}", name, e);
            }
        }

        Ok(())
    }

    /// Get a channel handler by name
    pub async fn get_handler(&self, name: &str) -> Option<ChannelHandlerPtr> {
        let handlers = self.handlers.read().await;
        handlers.get(name).cloned()
    }

    /// Send a message through a specific channel
    pub async fn send(&self, channel: &str, message: OutboundMessage) -> Result<()> {
        let handler = self
            .get_handler(channel)
            .await
            .ok_or_else(|| ChannelError::NotConfigured(format!("Channel {} not found", channel)))?;

        handler.send(message).await?;
        Ok(())
    }

    /// Check if a channel is running
    pub async fn is_channel_running(&self, name: &str) -> bool {
        let handlers = self.handlers.read().await;
        handlers
            .get(name)
            .map(|handler| handler.is_running())
            .unwrap_or(false)
    }

    /// Get list of configured channels
    pub async fn list_channels(&self) -> Vec<String> {
        let handlers = self.handlers.read().await;
        let mut names: Vec<String> = handlers.keys().cloned().collect();
        names.sort();
        names
    }
}
