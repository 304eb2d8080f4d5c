//! Shared types, configuration, and utilities for the Pilot controller.
//!
//! Pilot is an autonomous operations controller for a content-operations
//! platform. This crate holds the pieces every service crate needs:
//! - Unified error type with HTTP status mapping
//! - Configuration loading from `~/.pilot/config.json`
//! - Structured logging initialization

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{Error, Result};
