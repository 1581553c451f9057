//! Reply generation

use async_trait::async_trait;
use switchboard_core::bus::InboundMessage;
use switchboard_tools::ToolRegistry;

/// Produces the agent's reply to one inbound message.
///
/// Implementations wrap a language model or any other backend and may call
/// tools from `tools` while working. `None` means no reply is needed.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(
        &self,
        msg: &InboundMessage,
        tools: &ToolRegistry,
    ) -> anyhow::Result<Option<String>>;
}

/// Replies with the inbound text. Blank messages get no reply.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoResponder;

#[async_trait]
impl Responder for EchoResponder {
    async fn respond(
        &self,
        msg: &InboundMessage,
        _tools: &ToolRegistry,
    ) -> anyhow::Result<Option<String>> {
        let content = msg.content.trim();
        if content.is_empty() {
            return Ok(None);
        }
        Ok(Some(content.to_string()))
    }
}
