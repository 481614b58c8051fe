// src/engine/pricing.rs - Order Pricing
//! Subtotal, delivery fee and discount computation
//!
//! `total = subtotal + delivery_fee - discount`, with delivery free once the
//! subtotal reaches the configured threshold. A discount larger than the
//! amount due is rejected rather than clamped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    core::{order::OrderItem, types::Amount},
    DeliveryConfig, ServiceError, ServiceResult,
};

/// Delivery fee policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Fee charged below the threshold
    pub flat_delivery_fee: Amount,
    /// Subtotal at or above which delivery is free
    pub free_delivery_threshold: Amount,
}

impl DeliveryPolicy {
    /// Fee for the given subtotal
    pub fn fee_for(&self, subtotal: Amount) -> Amount {
        if subtotal >= self.free_delivery_threshold {
            0
        } else {
            self.flat_delivery_fee
        }
    }
}

impl From<&DeliveryConfig> for DeliveryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            flat_delivery_fee: config.flat_delivery_fee,
            free_delivery_threshold: config.free_delivery_threshold,
        }
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::from(&DeliveryConfig::default())
    }
}

/// Computed monetary fields of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    /// Sum of line totals
    pub subtotal: Amount,
    /// Delivery fee
    pub delivery_fee: Amount,
    /// Discount applied
    pub discount: Amount,
    /// Amount due
    pub total: Amount,
}

/// Resolves a promo code into a discount amount
#[async_trait]
pub trait DiscountResolver: Send + Sync {
    /// Discount for `code` given the order subtotal; unknown codes yield zero
    async fn resolve(&self, code: &str, subtotal: Amount) -> ServiceResult<Amount>;
}

/// Resolver that grants no discounts
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiscounts;

#[async_trait]
impl DiscountResolver for NoDiscounts {
    async fn resolve(&self, _code: &str, _subtotal: Amount) -> ServiceResult<Amount> {
        Ok(0)
    }
}

/// Sum of `unit_price * quantity` over all lines
pub fn subtotal(items: &[OrderItem]) -> ServiceResult<Amount> {
    items.iter().try_fold(0, |acc: Amount, item| {
        item.validate()?;
        item.unit_price
            .checked_mul(Amount::from(item.quantity))
            .and_then(|line| acc.checked_add(line))
            .ok_or_else(|| ServiceError::Validation("Order amount overflow".to_string()))
    })
}

/// Compute the full price breakdown
pub fn compute_totals(
    items: &[OrderItem],
    policy: &DeliveryPolicy,
    discount: Amount,
) -> ServiceResult<PriceBreakdown> {
    if items.is_empty() {
        return Err(ServiceError::Validation(
            "Order must contain at least one item".to_string(),
        ));
    }

    let subtotal = subtotal(items)?;
    let delivery_fee = policy.fee_for(subtotal);

    let total = subtotal
        .checked_add(delivery_fee)
        .ok_or_else(|| ServiceError::Validation("Order amount overflow".to_string()))?
        .checked_sub(discount)
        .ok_or_else(|| {
            ServiceError::Validation(format!(
                "Discount {discount} exceeds order amount {}",
                subtotal + delivery_fee
            ))
        })?;

    Ok(PriceBreakdown {
        subtotal,
        delivery_fee,
        discount,
        total,
    })
}
