// src/tracking/connection.rs - Tracking Connection Seam
//! Transport abstraction the session loop runs over
//!
//! The WebSocket adapter lives in the transport layer; tests drive sessions
//! through an in-process channel implementation.

use async_trait::async_trait;

use crate::{tracking::messages::TrackingMessage, ServiceResult};

/// Bidirectional text channel for one tracking connection
#[async_trait]
pub trait TrackingTransport: Send {
    /// Serialize and send one message
    async fn send(&mut self, message: &TrackingMessage) -> ServiceResult<()>;

    /// Next inbound text frame. `None` once the peer has closed.
    ///
    /// Must be cancel-safe: it is raced against the outbound queue and the
    /// idle tick.
    async fn recv(&mut self) -> Option<ServiceResult<String>>;
}
