// src/engine/mod.rs - Order Processing Engine
//! # Order Processing Engine
//!
//! Request validation, pricing and the order lifecycle state machine. The
//! engine is transport-agnostic: handlers call into [`LifecycleManager`] and
//! only map its errors to status codes.

pub mod lifecycle;
pub mod pricing;
pub mod validator;

pub use lifecycle::{LifecycleManager, LifecycleStatsSnapshot};
pub use pricing::{compute_totals, DeliveryPolicy, DiscountResolver, NoDiscounts, PriceBreakdown};
pub use validator::{OrderValidator, ValidationResult};
