// src/core/mod.rs - Core Module Declaration
//! Core business domain models and types
//!
//! Order records, status rules, lifecycle events and the shared identifier
//! and location types.

pub mod events;
pub mod order;
pub mod types;

pub use events::{OrderEvent, OrderEventType};
pub use order::{
    DeliveryAddress, Order, OrderItem, OrderPatch, OrderRequest, OrderResponse, OrderStatus,
    PaymentMethod, PaymentStatus,
};
pub use types::{
    Amount, OrderCode, OrderId, OrderKey, RiderId, RiderLocation, RiderPosition, RiderProfile,
    Timestamp,
};
