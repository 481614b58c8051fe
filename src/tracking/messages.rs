// src/tracking/messages.rs - Tracking Wire Protocol
//! JSON messages exchanged on a tracking connection
//!
//! Every frame is a JSON object tagged by `type`:
//!
//! | direction | type              | payload                                         |
//! |-----------|-------------------|-------------------------------------------------|
//! | server    | `initial`         | order id and code, status, rider, ETA           |
//! | server    | `location_update` | rider coordinates, optional ETA and timestamp   |
//! | server    | `status_update`   | new order status                                |
//! | server    | `pong`            | reply to `ping`                                 |
//! | client    | `ping`            | keepalive                                       |

use serde::{Deserialize, Serialize};

use crate::core::{
    order::OrderStatus,
    types::{OrderCode, OrderId, RiderPosition, RiderProfile, Timestamp},
};

/// Server-to-client push messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingMessage {
    /// First message of every connection
    Initial {
        /// Order id
        order_id: OrderId,
        /// Order code
        order_code: OrderCode,
        /// Current status
        status: OrderStatus,
        /// Assigned rider, if any
        rider: Option<RiderProfile>,
        /// Human-readable ETA, e.g. `12 minutes`
        estimated_arrival: String,
    },

    /// Rider moved, live or synthesized
    LocationUpdate {
        /// Order id
        order_id: OrderId,
        /// Rider coordinates
        rider_location: RiderPosition,
        /// Recomputed ETA, present on synthesized updates
        #[serde(default, skip_serializing_if = "Option::is_none")]
        estimated_arrival: Option<String>,
        /// Device timestamp, present on live updates
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Timestamp>,
    },

    /// Order status changed
    StatusUpdate {
        /// Order id
        order_id: OrderId,
        /// New status
        status: OrderStatus,
        /// When the change happened
        timestamp: Timestamp,
    },

    /// Reply to a client ping
    Pong,
}

impl TrackingMessage {
    /// Check if this message carries rider coordinates
    pub fn is_location_update(&self) -> bool {
        matches!(self, Self::LocationUpdate { .. })
    }
}

/// Client-to-server messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keepalive
    Ping,
}

/// Tracking snapshot served over plain HTTP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    /// Order id
    pub order_id: OrderId,
    /// Order code
    pub order_code: OrderCode,
    /// Current status
    pub status: OrderStatus,
    /// Assigned rider, if any
    pub rider: Option<RiderProfile>,
    /// Last known rider position
    pub rider_location: Option<RiderPosition>,
    /// Human-readable ETA
    pub estimated_arrival: String,
    /// Single-line delivery address
    pub delivery_address: String,
}
