// src/transport/mod.rs - Transport Layer
//! HTTP and WebSocket surface. Handlers only (de)serialize and map
//! [`ServiceError`](crate::ServiceError) to status codes.

pub mod rest;
pub mod ws;

pub use rest::{create_router, start_server, ApiResponse, ApiState};
pub use ws::WsTransport;
