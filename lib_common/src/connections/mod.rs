//! # Connections Module
//!
//! This module handles persistent connections to external services.

/// The reconnecting WebSocket link to the backend service.
pub mod backend_wss;

pub use backend_wss::{
    BackendLink, LinkAction, LinkEvent, LinkHandle, LinkMachine, LinkState, PushLink, ReconnectPolicy,
    SendOutcome,
};
