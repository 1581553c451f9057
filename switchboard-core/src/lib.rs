//! Core types for switchboard
//!
//! This crate provides the message bus that sits between chat channels and
//! the agent, the message model it carries, and the configuration and
//! logging shared by every other switchboard component.

pub mod bus;
pub mod config;
pub mod error;
pub mod logging;

pub use error::{DeliveryError, Error, Result};
