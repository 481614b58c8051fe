// src/tracking/mod.rs - Live Delivery Tracking
//! # Live Delivery Tracking
//!
//! Pushes order progress to a single subscriber per order: an `initial`
//! message on connect, live rider locations as they arrive, status changes,
//! and synthesized motion while no rider feed is present.
//!
//! Delivery is best-effort and at most once. Each session has a small bounded
//! queue; overflow drops the message.

pub mod connection;
pub mod hub;
pub mod messages;

pub use connection::TrackingTransport;
pub use hub::{estimated_arrival, HubStats, SessionGuard, TrackingHub, TrackingSession};
pub use messages::{ClientMessage, TrackingMessage, TrackingSnapshot};
