// src/engine/validator.rs - Order Request Validation
//! Checks applied to an order request before it is priced and stored
//!
//! ```text
//! OrderRequest
//!     │
//!     ▼
//! ┌─────────────────┐    ❌ No items / bad quantity or price
//! │ Items           │────────────────────►
//! └─────────┬───────┘
//!           ▼
//! ┌─────────────────┐    ❌ Missing contact fields / bad coordinates
//! │ Address         │────────────────────►
//! └─────────┬───────┘
//!           ▼
//! ┌─────────────────┐    ❌ Scheduled time not in the future
//! │ Schedule        │────────────────────►
//! └─────────┬───────┘
//!           ▼
//!      Request Accepted
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::{
    core::{
        order::{DeliveryAddress, OrderRequest},
        types::Timestamp,
    },
    ServiceError, ServiceResult,
};

/// Validation result with error details
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Validation passed
    Valid,
    /// Validation failed
    Invalid {
        /// Error code for programmatic handling
        error_code: String,
        /// Human-readable error message
        message: String,
        /// Field that caused the error
        field: Option<String>,
    },
}

impl ValidationResult {
    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Convert to `ServiceResult`
    pub fn into_result(self) -> ServiceResult<()> {
        match self {
            Self::Valid => Ok(()),
            Self::Invalid { message, .. } => Err(ServiceError::Validation(message)),
        }
    }

    /// Create invalid result with field
    pub fn invalid_field(error_code: &str, message: impl Into<String>, field: &str) -> Self {
        Self::Invalid {
            error_code: error_code.to_string(),
            message: message.into(),
            field: Some(field.to_string()),
        }
    }
}

/// Validation statistics
#[derive(Debug, Default)]
pub struct ValidationStats {
    /// Requests checked
    pub total_validations: AtomicU64,
    /// Requests rejected
    pub failed_validations: AtomicU64,
}

/// Order request validator
#[derive(Debug, Default)]
pub struct OrderValidator {
    stats: ValidationStats,
}

impl OrderValidator {
    /// Create a validator
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every check against the request, returning the first failure
    pub fn validate_request(&self, request: &OrderRequest, now: Timestamp) -> ValidationResult {
        self.stats.total_validations.fetch_add(1, Ordering::Relaxed);

        let result = Self::validate_items(request)
            .and_then(|| Self::validate_address(&request.delivery_address))
            .and_then(|| Self::validate_schedule(request.scheduled_time, now));

        if let ValidationResult::Invalid { error_code, message, .. } = &result {
            self.stats.failed_validations.fetch_add(1, Ordering::Relaxed);
            debug!("Order request rejected ({}): {}", error_code, message);
        }
        result
    }

    fn validate_items(request: &OrderRequest) -> ValidationResult {
        if request.items.is_empty() {
            return ValidationResult::invalid_field(
                "EMPTY_ORDER",
                "Order must contain at least one item",
                "items",
            );
        }

        for item in &request.items {
            if let Err(e) = item.validate() {
                return ValidationResult::invalid_field("INVALID_ITEM", e.to_string(), "items");
            }
        }
        ValidationResult::Valid
    }

    fn validate_address(address: &DeliveryAddress) -> ValidationResult {
        let required = [
            ("full_name", &address.full_name),
            ("phone", &address.phone),
            ("email", &address.email),
            ("address", &address.address),
            ("city", &address.city),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return ValidationResult::invalid_field(
                    "MISSING_FIELD",
                    format!("Delivery address {field} is required"),
                    field,
                );
            }
        }

        if let Some((lat, lng)) = address.coordinates() {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                return ValidationResult::invalid_field(
                    "INVALID_COORDINATES",
                    format!("Invalid delivery coordinates ({lat}, {lng})"),
                    "delivery_address",
                );
            }
        }
        ValidationResult::Valid
    }

    fn validate_schedule(scheduled_time: Option<Timestamp>, now: Timestamp) -> ValidationResult {
        match scheduled_time {
            Some(at) if at <= now => ValidationResult::invalid_field(
                "SCHEDULE_IN_PAST",
                "Scheduled time must be in the future",
                "scheduled_time",
            ),
            _ => ValidationResult::Valid,
        }
    }

    /// Requests checked and rejected so far
    pub fn get_stats(&self) -> (u64, u64) {
        (
            self.stats.total_validations.load(Ordering::Relaxed),
            self.stats.failed_validations.load(Ordering::Relaxed),
        )
    }
}

impl ValidationResult {
    fn and_then(self, next: impl FnOnce() -> Self) -> Self {
        match self {
            Self::Valid => next(),
            invalid @ Self::Invalid { .. } => invalid,
        }
    }
}
