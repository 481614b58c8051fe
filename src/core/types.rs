// src/core/types.rs - Core Type Definitions
//! Core type definitions shared across the order and tracking modules

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use uuid::Uuid;

/// Internal order key - immutable and permanent
pub type OrderId = Uuid;

/// Monetary amount in minor currency units (kobo, cents)
pub type Amount = u64;

/// Type alias for timestamps
pub type Timestamp = DateTime<Utc>;

/// Type alias for rider identifiers
pub type RiderId = String;

const ORDER_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Human-readable order code, e.g. `CC-20240101-A1B2C3`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderCode(String);

impl OrderCode {
    /// Generate a code for the given day. Collisions are not checked.
    pub fn generate(prefix: &str, date: NaiveDate) -> Self {
        let mut rng = rand::thread_rng();
        let random_part: String = (0..crate::constants::ORDER_CODE_RANDOM_LEN)
            .map(|_| char::from(ORDER_CODE_ALPHABET[rng.gen_range(0..ORDER_CODE_ALPHABET.len())]))
            .collect();

        Self(format!("{}-{}-{}", prefix, date.format("%Y%m%d"), random_part))
    }

    /// Get the code as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OrderCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

/// Lookup key accepted wherever an order is addressed by "id or code"
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderKey {
    /// Internal id
    Id(OrderId),
    /// Human-readable code
    Code(OrderCode),
}

impl OrderKey {
    /// Parse a path segment: UUIDs are internal ids, anything else is a code
    pub fn parse(raw: &str) -> Self {
        Uuid::parse_str(raw).map_or_else(|_| Self::Code(OrderCode::from(raw)), Self::Id)
    }
}

impl Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Code(code) => write!(f, "{code}"),
        }
    }
}

impl From<OrderId> for OrderKey {
    fn from(id: OrderId) -> Self {
        Self::Id(id)
    }
}

impl From<OrderCode> for OrderKey {
    fn from(code: OrderCode) -> Self {
        Self::Code(code)
    }
}

/// Last known rider position stored on an order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiderPosition {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Heading in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Speed in km/h
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

/// Rider location event posted by a rider device. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderLocation {
    /// Order id or order code the rider is delivering
    pub order_id: String,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Heading in degrees
    #[serde(default)]
    pub heading: Option<f64>,
    /// Speed in km/h
    #[serde(default)]
    pub speed: Option<f64>,
    /// Device timestamp; defaults to receipt time
    #[serde(default = "Utc::now")]
    pub timestamp: Timestamp,
}

impl RiderLocation {
    /// Reject coordinates outside the valid range
    pub fn validate(&self) -> crate::ServiceResult<()> {
        let valid = self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude);

        if valid {
            Ok(())
        } else {
            Err(crate::ServiceError::Validation(format!(
                "Invalid coordinates ({}, {})",
                self.latitude, self.longitude
            )))
        }
    }

    /// Position part of the event
    pub fn position(&self) -> RiderPosition {
        RiderPosition {
            latitude: self.latitude,
            longitude: self.longitude,
            heading: self.heading,
            speed: self.speed,
        }
    }
}

/// Rider profile resolved from the user store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiderProfile {
    /// Rider id
    pub id: RiderId,
    /// Display name
    pub name: String,
    /// Contact phone number
    pub phone: String,
    /// Photo URL
    pub photo_url: Option<String>,
    /// Average rating
    pub rating: f32,
    /// Completed deliveries
    pub deliveries: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_code_format() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let code = OrderCode::generate("CC", date);
        let parts: Vec<&str> = code.as_str().split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "CC");
        assert_eq!(parts[1], "20240309");
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_order_key_parse() {
        let id = Uuid::new_v4();
        assert_eq!(OrderKey::parse(&id.to_string()), OrderKey::Id(id));
        assert_eq!(
            OrderKey::parse("CC-20240101-ABC123"),
            OrderKey::Code(OrderCode::from("CC-20240101-ABC123"))
        );
    }

    #[test]
    fn test_rider_location_validation() {
        let mut location = RiderLocation {
            order_id: "CC-20240101-ABC123".to_string(),
            latitude: 6.45,
            longitude: 3.39,
            heading: None,
            speed: None,
            timestamp: Utc::now(),
        };
        assert!(location.validate().is_ok());

        location.latitude = 91.0;
        assert!(location.validate().is_err());

        location.latitude = f64::NAN;
        assert!(location.validate().is_err());
    }

    #[test]
    fn test_rider_location_timestamp_defaults() {
        let location: RiderLocation =
            serde_json::from_str(r#"{"order_id": "x", "latitude": 1.0, "longitude": 2.0}"#)
                .unwrap();
        assert!(location.heading.is_none());
        assert!(location.timestamp <= Utc::now());
    }
}
