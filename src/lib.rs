// src/lib.rs - Delivery OMS Library Root
//! # Delivery OMS - Order Lifecycle and Live Tracking
//!
//! Backend core for a food-ordering service:
//! - Order placement with price computation (subtotal, delivery fee, discount)
//! - Order status state machine with cancellation rules and partial patches
//! - Live delivery tracking over WebSocket with rider-location fan-out
//! - Payment gateway integration (initialize, verify, webhook correlation)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │   REST API      │    │   WebSocket     │    │  Rider Devices  │
//! │   (HTTP/JSON)   │    │  (Tracking)     │    │  (Ingestion)    │
//! └─────────┬───────┘    └─────────┬───────┘    └─────────┬───────┘
//!           │                      │                      │
//!           ▼                      ▼                      ▼
//! ┌──────────────────┐    ┌──────────────────────────────────────┐
//! │ LifecycleManager │───►│            TrackingHub               │
//! │ (state machine)  │    │  (session registry, synthetic motion)│
//! └────────┬─────────┘    └──────────────────────────────────────┘
//!          │
//!   ┌──────┴───────┐
//!   ▼              ▼
//! ┌──────────┐ ┌──────────────┐
//! │ Pricing  │ │ OrderStorage │
//! └──────────┘ └──────────────┘
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

use serde::{Deserialize, Serialize};

pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;

pub mod core;
pub mod engine;
pub mod payments;
pub mod storage;
pub mod tracking;
pub mod transport;

pub use crate::core::{
    events::{OrderEvent, OrderEventType},
    order::{
        DeliveryAddress, Order, OrderItem, OrderPatch, OrderRequest, OrderResponse, OrderStatus,
        PaymentMethod, PaymentStatus,
    },
    types::{Amount, OrderCode, OrderId, OrderKey, RiderLocation, RiderPosition, RiderProfile},
};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Pricing and delivery policy
    pub delivery: DeliveryConfig,
    /// Order state machine configuration
    pub lifecycle: LifecycleConfig,
    /// Order storage configuration
    pub storage: StorageConfig,
    /// Live tracking configuration
    pub tracking: TrackingConfig,
    /// Payment gateway configuration
    pub payments: PaymentConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout in seconds
    pub request_timeout: u64,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout: 30,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

/// Pricing and delivery policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Prefix of human-readable order codes
    pub order_code_prefix: String,
    /// Flat delivery fee in minor currency units
    pub flat_delivery_fee: Amount,
    /// Subtotal at or above which delivery is free
    pub free_delivery_threshold: Amount,
    /// Estimated delivery offset for unscheduled orders (minutes)
    pub default_eta_minutes: i64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            order_code_prefix: constants::DEFAULT_ORDER_CODE_PREFIX.to_string(),
            flat_delivery_fee: constants::DEFAULT_DELIVERY_FEE,
            free_delivery_threshold: constants::DEFAULT_FREE_DELIVERY_THRESHOLD,
            default_eta_minutes: constants::DEFAULT_ETA_MINUTES,
        }
    }
}

/// Order state machine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Reject status changes that skip or reverse the delivery sequence
    pub enforce_sequential_transitions: bool,
    /// Capacity of the order event broadcast channel
    pub event_buffer: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            enforce_sequential_transitions: false,
            event_buffer: 1024,
        }
    }
}

/// Order storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Maximum number of orders kept in memory
    pub max_orders: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { max_orders: 1_000_000 }
    }
}

/// Live tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Idle interval after which a synthetic location update is sent
    pub idle_timeout_ms: u64,
    /// Per-session outbound buffer; overflow drops messages
    pub outbound_buffer: usize,
    /// Fallback latitude when neither rider nor address coordinates exist
    pub default_latitude: f64,
    /// Fallback longitude when neither rider nor address coordinates exist
    pub default_longitude: f64,
    /// Coordinate drift per wall-clock second step for synthetic motion
    pub drift_step: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: constants::DEFAULT_TRACKING_IDLE_MS,
            outbound_buffer: 32,
            default_latitude: 6.4541,
            default_longitude: 3.3947,
            drift_step: 0.001,
        }
    }
}

/// Payment gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Provider secret key; the mock gateway is used when absent
    pub secret_key: Option<String>,
    /// Provider API base URL
    pub base_url: String,
    /// Prefix of generated payment references
    pub reference_prefix: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            base_url: "https://api.paystack.co".to_string(),
            reference_prefix: "chipchop".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `config/default`, `config/local` and
    /// `DELIVERY__*` environment variables, in increasing precedence.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        config::Config::builder()
            .add_source(config::File::with_name(&format!("{config_dir}/default")).required(false))
            .add_source(config::File::with_name(&format!("{config_dir}/local")).required(false))
            .add_source(config::Environment::with_prefix("DELIVERY").separator("__"))
            .build()?
            .try_deserialize()
    }
}

/// Error types used throughout the library
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Unknown order, rider or payment reference
    #[error("Not found: {0}")]
    NotFound(String),

    /// Status change rejected by the state machine
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Malformed or inconsistent input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Request could not be authenticated
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Payment provider returned a failure
    #[error("Payment gateway error: {0}")]
    UpstreamGateway(String),

    /// Tracking connection closed abruptly or failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Storage error
    #[error(transparent)]
    Storage(#[from] storage::StorageError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal system error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type used throughout the library
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Constants used throughout the library
pub mod constants {
    //! System-wide defaults

    use crate::Amount;

    /// Default order code prefix
    pub const DEFAULT_ORDER_CODE_PREFIX: &str = "CC";

    /// Default flat delivery fee (minor units)
    pub const DEFAULT_DELIVERY_FEE: Amount = 1500;

    /// Default free-delivery threshold (minor units)
    pub const DEFAULT_FREE_DELIVERY_THRESHOLD: Amount = 10_000;

    /// Default estimated delivery offset (minutes)
    pub const DEFAULT_ETA_MINUTES: i64 = 45;

    /// Default tracking idle interval (milliseconds)
    pub const DEFAULT_TRACKING_IDLE_MS: u64 = 5_000;

    /// Length of the random part of an order code
    pub const ORDER_CODE_RANDOM_LEN: usize = 6;

    /// Maximum page size for order listings
    pub const MAX_PAGE_SIZE: usize = 50;

    /// Default page size for order listings
    pub const DEFAULT_PAGE_SIZE: usize = 10;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.delivery.flat_delivery_fee, 1500);
        assert_eq!(config.delivery.free_delivery_threshold, 10_000);
        assert_eq!(config.tracking.idle_timeout_ms, 5_000);
        assert!(!config.lifecycle.enforce_sequential_transitions);
        assert!(config.payments.secret_key.is_none());
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"delivery": {"flat_delivery_fee": 900}}"#).unwrap();
        assert_eq!(config.delivery.flat_delivery_fee, 900);
        assert_eq!(config.delivery.order_code_prefix, "CC");
        assert_eq!(config.server.request_timeout, 30);
    }

    #[test]
    fn test_version_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "delivery-oms");
    }
}
