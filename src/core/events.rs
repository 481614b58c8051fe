// src/core/events.rs - Event System
//! Order lifecycle events published on the lifecycle broadcast channel

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::core::{
    order::{Order, OrderStatus, PaymentStatus},
    types::{OrderCode, OrderId, Timestamp},
};

/// Order-related event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventType {
    /// Order was placed
    OrderCreated,
    /// Status changed
    StatusChanged,
    /// Order was cancelled
    OrderCancelled,
    /// Rider assignment or position changed
    RiderUpdated,
    /// Payment status changed
    PaymentUpdated,
}

/// Order event containing the state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    /// Event ID
    pub id: uuid::Uuid,
    /// Event type
    pub event_type: OrderEventType,
    /// Order ID
    pub order_id: OrderId,
    /// Order code
    pub order_code: OrderCode,
    /// Status before the change
    pub previous_status: Option<OrderStatus>,
    /// Status after the change
    pub new_status: OrderStatus,
    /// Payment status after the change
    pub payment_status: PaymentStatus,
    /// Event timestamp
    pub timestamp: Timestamp,
    /// Sequence number for ordering
    pub sequence_number: u64,
}

impl OrderEvent {
    /// Build an event from the order's post-change state
    pub fn new(
        event_type: OrderEventType,
        order: &Order,
        previous_status: Option<OrderStatus>,
        sequence_number: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            event_type,
            order_id: order.id,
            order_code: order.order_code.clone(),
            previous_status,
            new_status: order.status,
            payment_status: order.payment_status,
            timestamp: Utc::now(),
            sequence_number,
        }
    }

    /// Check if the event changed the delivery status
    pub fn is_status_change(&self) -> bool {
        self.previous_status
            .is_some_and(|previous| previous != self.new_status)
    }
}
