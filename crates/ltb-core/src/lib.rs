//! Core domain + application logic for the Lightning Telegram bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the Lightning node
//! RPC live behind ports (traits) implemented in adapter crates.

pub mod access;
pub mod classifier;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod lightning;
pub mod logging;
pub mod messaging;
pub mod notifier;
pub mod operator;
pub mod reports;
pub mod trades;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
