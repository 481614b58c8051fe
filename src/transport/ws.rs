// src/transport/ws.rs - WebSocket Tracking Adapter
//! Runs tracking sessions over an axum WebSocket

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};

use crate::{
    tracking::{TrackingMessage, TrackingTransport},
    ServiceError, ServiceResult,
};

/// Tracking transport backed by an upgraded WebSocket
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    /// Wrap an upgraded socket
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl TrackingTransport for WsTransport {
    async fn send(&mut self, message: &TrackingMessage) -> ServiceResult<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| ServiceError::Internal(format!("Failed to encode message: {e}")))?;

        self.socket
            .send(Message::Text(json))
            .await
            .map_err(|e| ServiceError::Connection(e.to_string()))
    }

    async fn recv(&mut self) -> Option<ServiceResult<String>> {
        loop {
            match self.socket.recv().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()));
                }
                // Control frames are answered by axum
                Ok(Message::Ping(_) | Message::Pong(_)) => {}
                Ok(Message::Close(_)) => return None,
                Err(e) => return Some(Err(ServiceError::Connection(e.to_string()))),
            }
        }
    }
}
