//! Agent tools for switchboard
//!
//! This crate provides the tool registry and the message tool.

pub mod base;
pub mod message;
pub mod registry;

pub use base::{Tool, ToolError};
pub use message::MessageTool;
pub use registry::ToolRegistry;
