//! Message bus for decoupled communication
//!
//! The message bus provides a dual-queue system for inbound and outbound
//! messages, decoupling chat channels from the agent core. A third,
//! direct path hands outbound messages straight to a registered channel
//! adapter so the caller learns whether delivery failed.

pub mod events;
pub mod queue;

pub use events::{InboundMessage, OutboundMessage};
pub use queue::{ChannelSender, MessageBus, DEFAULT_DISPATCH_INTERVAL};
