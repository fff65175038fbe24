//! Gmail Mail Tools Library
//!
//! A Model Context Protocol (MCP) server exposing two Gmail tools:
//! sending an email (with an optional attachment) and listing recent messages.

pub mod config;
pub mod error;
pub mod gmail;
pub mod mcp;

pub use config::Config;
pub use error::{GmailMcpError, Result};
