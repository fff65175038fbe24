//! Gmail API module
//!
//! Contains credential management, the API client, and the send/list operations.

pub mod auth;
pub mod client;
pub mod consent;
pub mod lister;
pub mod message;
pub mod sender;
pub mod types;
