//! Channel adapters for switchboard
//!
//! This crate provides the channel handler trait, the local console channel
//! and the manager that connects handlers to the message bus.

pub mod base;
pub mod common;
pub mod console;
pub mod manager;
pub mod typing;

pub use base::{BaseChannel, ChannelError, ChannelHandler, ChannelHandlerPtr, Result};
pub use common::split_message;
pub use console::ConsoleHandler;
pub use manager::ChannelManager;
pub use typing::TypingIndicators;
