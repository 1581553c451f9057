//! Agent logic for switchboard
//!
//! This crate provides the agent loop that consumes inbound messages from the
//! bus and delivers replies back to the channels.

pub mod agent_loop;
pub mod responder;

pub use agent_loop::AgentLoop;
pub use responder::{EchoResponder, Responder};
