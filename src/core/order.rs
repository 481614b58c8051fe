// src/core/order.rs - Order Domain Models
//! Order domain models and status rules
//!
//! # Order Lifecycle
//!
//! ```text
//! Pending → Confirmed → Preparing → Ready → PickedUp → OnTheWay → Delivered
//!    ↘          ↘           ↘         ↘        ↘
//!     → → → → → → → → → Cancelled ← ← ← ← ← ← ←
//! ```
//!
//! `OnTheWay` and `Delivered` orders can no longer be cancelled.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display},
    str::FromStr,
};

use crate::{
    core::types::{Amount, OrderCode, OrderId, RiderId, RiderPosition, Timestamp},
    ServiceError, ServiceResult,
};

/// Order status representing the current delivery stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed, awaiting confirmation
    Pending,
    /// Accepted by the kitchen
    Confirmed,
    /// Being prepared
    Preparing,
    /// Ready for pickup
    Ready,
    /// Collected by the rider
    PickedUp,
    /// Rider en route
    OnTheWay,
    /// Handed to the customer
    Delivered,
    /// Cancelled before dispatch
    Cancelled,
}

impl OrderStatus {
    /// Forward delivery sequence, excluding `Cancelled`
    pub const SEQUENCE: [Self; 7] = [
        Self::Pending,
        Self::Confirmed,
        Self::Preparing,
        Self::Ready,
        Self::PickedUp,
        Self::OnTheWay,
        Self::Delivered,
    ];

    /// Check if the order is in a final state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Check if the order can still be cancelled
    pub fn can_be_cancelled(self) -> bool {
        !matches!(self, Self::OnTheWay | Self::Delivered)
    }

    /// Next step of the forward sequence
    pub fn next(self) -> Option<Self> {
        let position = Self::SEQUENCE.iter().position(|s| *s == self)?;
        Self::SEQUENCE.get(position + 1).copied()
    }

    /// Strict transition rule: one step forward, or cancellation where allowed
    pub fn can_advance_to(self, new_status: Self) -> bool {
        match new_status {
            Self::Cancelled => self.can_be_cancelled() && self != Self::Cancelled,
            _ => self.next() == Some(new_status),
        }
    }

    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::PickedUp => "picked_up",
            Self::OnTheWay => "on_the_way",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "preparing" => Ok(Self::Preparing),
            "ready" => Ok(Self::Ready),
            "picked_up" => Ok(Self::PickedUp),
            "on_the_way" => Ok(Self::OnTheWay),
            "delivered" => Ok(Self::Delivered),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(ServiceError::Validation(format!("Invalid order status: {s}"))),
        }
    }
}

/// Payment status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Not yet paid
    Pending,
    /// Paid
    Completed,
    /// Charge failed
    Failed,
    /// Refunded
    Refunded,
}

/// How the customer pays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card via payment gateway
    Card,
    /// Wallet balance
    Wallet,
    /// Bank transfer
    BankTransfer,
    /// Cash collected by the rider
    CashOnDelivery,
}

/// One line of an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Menu catalog id
    pub menu_item_id: String,
    /// Display name at time of ordering
    pub name: String,
    /// Quantity, must be positive
    pub quantity: u32,
    /// Unit price in minor units, must be positive
    #[serde(alias = "price")]
    pub unit_price: Amount,
    /// Special instructions for this line
    #[serde(default, alias = "special_instructions", skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl OrderItem {
    /// Validate quantity and unit price
    pub fn validate(&self) -> ServiceResult<()> {
        if self.quantity == 0 {
            return Err(ServiceError::Validation(format!(
                "Quantity must be positive for item {}",
                self.menu_item_id
            )));
        }
        if self.unit_price == 0 {
            return Err(ServiceError::Validation(format!(
                "Price must be positive for item {}",
                self.menu_item_id
            )));
        }
        Ok(())
    }
}

/// Where the order goes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    /// Recipient name
    pub full_name: String,
    /// Recipient phone
    pub phone: String,
    /// Recipient email, used for payment receipts
    pub email: String,
    /// Street address
    pub address: String,
    /// City
    pub city: String,
    /// Nearby landmark
    #[serde(default)]
    pub landmark: Option<String>,
    /// Latitude, if geocoded
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude, if geocoded
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl DeliveryAddress {
    /// Coordinates when both are present
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

/// Main order record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Internal id
    pub id: OrderId,
    /// Human-readable order code
    pub order_code: OrderCode,
    /// Ordered lines
    pub items: Vec<OrderItem>,
    /// Sum of line totals
    pub subtotal: Amount,
    /// Delivery fee
    pub delivery_fee: Amount,
    /// Discount applied
    pub discount: Amount,
    /// Amount due
    pub total: Amount,
    /// Delivery stage
    pub status: OrderStatus,
    /// Payment state
    pub payment_status: PaymentStatus,
    /// Payment method
    pub payment_method: PaymentMethod,
    /// Gateway reference of the latest payment attempt
    pub payment_reference: Option<String>,
    /// Delivery address
    pub delivery_address: DeliveryAddress,
    /// Customer-requested delivery time
    pub scheduled_time: Option<Timestamp>,
    /// Assigned rider
    pub rider_id: Option<RiderId>,
    /// Last known rider position
    pub rider_location: Option<RiderPosition>,
    /// Estimated delivery time
    pub estimated_delivery: Option<Timestamp>,
    /// Order-level instructions
    pub special_instructions: Option<String>,
    /// Promo code supplied at checkout
    pub discount_code: Option<String>,
    /// Creation timestamp
    pub created_at: Timestamp,
    /// Last mutation timestamp
    pub updated_at: Option<Timestamp>,
    /// Payment confirmation timestamp
    pub paid_at: Option<Timestamp>,
}

impl Order {
    /// Stamp `updated_at`
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    /// Check the monetary invariant `total == subtotal + fee - discount`
    pub fn totals_consistent(&self) -> bool {
        (self.subtotal + self.delivery_fee).checked_sub(self.discount) == Some(self.total)
    }

    /// Apply the fields present in a patch. Status rules are enforced by the caller.
    pub fn apply_patch(&mut self, patch: &OrderPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(rider_id) = &patch.rider_id {
            self.rider_id = Some(rider_id.clone());
        }
        if let Some(position) = patch.rider_location {
            self.rider_location = Some(position);
        }
        self.touch();
    }
}

/// Order placement request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Ordered lines
    pub items: Vec<OrderItem>,
    /// Delivery address
    pub delivery_address: DeliveryAddress,
    /// Requested delivery time, must be in the future
    #[serde(default)]
    pub scheduled_time: Option<Timestamp>,
    /// Payment method
    pub payment_method: PaymentMethod,
    /// Promo code
    #[serde(default)]
    pub discount_code: Option<String>,
    /// Order-level instructions
    #[serde(default)]
    pub special_instructions: Option<String>,
}

/// Partial order update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPatch {
    /// New status
    #[serde(default)]
    pub status: Option<OrderStatus>,
    /// Assigned rider
    #[serde(default)]
    pub rider_id: Option<RiderId>,
    /// Rider position
    #[serde(default)]
    pub rider_location: Option<RiderPosition>,
}

impl OrderPatch {
    /// Check if the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.rider_id.is_none() && self.rider_location.is_none()
    }
}

/// Order response containing order and status message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    /// The order object
    pub order: Order,
    /// Status message
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_cancellation_rules() {
        for status in OrderStatus::SEQUENCE {
            let expected = !matches!(status, OrderStatus::OnTheWay | OrderStatus::Delivered);
            assert_eq!(status.can_be_cancelled(), expected, "{status}");
        }
        assert!(OrderStatus::Cancelled.can_be_cancelled());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(!OrderStatus::OnTheWay.is_terminal());
    }

    #[test]
    fn test_status_sequence() {
        assert_eq!(OrderStatus::Pending.next(), Some(OrderStatus::Confirmed));
        assert_eq!(OrderStatus::OnTheWay.next(), Some(OrderStatus::Delivered));
        assert_eq!(OrderStatus::Delivered.next(), None);
        assert_eq!(OrderStatus::Cancelled.next(), None);

        assert!(OrderStatus::Ready.can_advance_to(OrderStatus::PickedUp));
        assert!(!OrderStatus::Pending.can_advance_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Preparing.can_advance_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Preparing.can_advance_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::OnTheWay.can_advance_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::OnTheWay).unwrap(),
            "\"on_the_way\""
        );
        assert_eq!(
            serde_json::from_str::<OrderStatus>("\"picked_up\"").unwrap(),
            OrderStatus::PickedUp
        );
        assert_eq!("DELIVERED".parse::<OrderStatus>().unwrap(), OrderStatus::Delivered);
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_item_validation_and_aliases() {
        let item: OrderItem = serde_json::from_str(
            r#"{"menu_item_id": "jollof", "name": "Jollof Rice", "quantity": 2, "price": 3500,
                "special_instructions": "extra pepper"}"#,
        )
        .unwrap();
        assert_eq!(item.unit_price, 3500);
        assert_eq!(item.note.as_deref(), Some("extra pepper"));
        assert!(item.validate().is_ok());

        let zero = OrderItem { quantity: 0, ..item };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_patch_deserializes_partially() {
        let patch: OrderPatch = serde_json::from_str(r#"{"rider_id": "rider-1"}"#).unwrap();
        assert_eq!(patch.rider_id.as_deref(), Some("rider-1"));
        assert!(patch.status.is_none());
        assert!(!patch.is_empty());
        assert!(OrderPatch::default().is_empty());
    }
}
