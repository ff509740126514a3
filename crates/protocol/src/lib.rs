//! Parlance Protocol
//!
//! Shared types for communication between the Parlance runtime and the chat server.
//! Requests are JSON bodies; responses are JSON or a `text/event-stream` of frames.

use uuid::Uuid;

// Re-exports
pub mod client;
pub mod server;
pub mod types;

pub use client::*;
pub use server::*;
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
