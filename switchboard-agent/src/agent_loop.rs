//! Agent loop: consumes inbound messages and delivers replies

use crate::responder::Responder;
use std::sync::Arc;
use switchboard_core::bus::{InboundMessage, MessageBus, OutboundMessage};
use switchboard_core::config::schema::{AgentConfig, DeliveryMode};
use switchboard_tools::{MessageTool, Tool, ToolRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The agent loop is the consumer side of the inbound queue
pub struct AgentLoop {
    bus: MessageBus,
    responder: Arc<dyn Responder>,
    tools: ToolRegistry,
    message_tool: Arc<MessageTool>,
    delivery: DeliveryMode,
}

impl AgentLoop {
    /// Create a new agent loop with the message tool registered
    pub fn new(bus: MessageBus, responder: Arc<dyn Responder>, config: &AgentConfig) -> Self {
        let message_tool = Arc::new(MessageTool::new(bus.clone()));
        let mut tools = ToolRegistry::new();
        tools.register(message_tool.clone());

        Self {
            bus,
            responder,
            tools,
            message_tool,
            delivery: config.delivery,
        }
    }

    /// Register an additional tool
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        self.tools.register(tool);
    }

    /// Tools available to the responder
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Agent loop started ({:?} delivery)", self.delivery);

        loop {
            let msg = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                msg = self.bus.consume_inbound() => msg,
            };

            debug!("Received message from {}:{}", msg.channel, msg.chat_id);
            match self.process_inbound_message(msg).await {
                Ok(Some(response)) => self.deliver(response).await,
                Ok(None) => debug!("No response needed"),
                Err(e) => error!("Error processing message: {:#}", e),
            }
        }

        info!("Agent loop stopped");
    }

    /// Produce the reply to a single inbound message
    pub async fn process_inbound_message(
        &self,
        msg: InboundMessage,
    ) -> anyhow::Result<Option<OutboundMessage>> {
        let preview: String = msg.content.chars().take(80).collect();
        info!(
            "Processing message from {}:{}: {}",
            msg.channel, msg.sender_id, preview
        );

        self.message_tool
            .set_context(
                msg.channel.clone(),
                msg.chat_id.clone(),
                msg.message_id().map(str::to_string),
            )
            .await;

        let reply = self.responder.respond(&msg, &self.tools).await?;

        if self.message_tool.sent_in_turn() {
            debug!("Reply already sent through the message tool");
            return Ok(None);
        }

        Ok(reply.map(|content| OutboundMessage::reply(&msg, content)))
    }

    /// Hand a reply to the bus according to the configured delivery mode
    pub async fn deliver(&self, response: OutboundMessage) {
        match self.delivery {
            DeliveryMode::Direct => {
                let target = format!("{}:{}", response.channel, response.chat_id);
                if let Err(e) = self.bus.send_direct(response).await {
                    warn!("Failed to deliver reply to {}: {}", target, e);
                }
            }
            DeliveryMode::Queued => self.bus.publish_outbound(response),
        }
    }
}
