// src/storage/users.rs - User Profile Store
//! Rider profile lookup used to build tracking snapshots

use async_trait::async_trait;
use dashmap::DashMap;

use crate::core::types::{RiderId, RiderProfile};

/// Read access to user profiles
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Resolve a rider profile by id
    async fn get_rider(&self, rider_id: &str) -> Option<RiderProfile>;
}

/// In-memory user store
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    riders: DashMap<RiderId, RiderProfile>,
}

impl InMemoryUserStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with the house rider
    pub fn with_default_riders() -> Self {
        let store = Self::new();
        store.upsert_rider(RiderProfile {
            id: "rider-1".to_string(),
            name: "Emeka Johnson".to_string(),
            phone: "+2348012345678".to_string(),
            photo_url: Some("https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d?w=200".to_string()),
            rating: 4.9,
            deliveries: 500,
        });
        store
    }

    /// Insert or replace a rider profile
    pub fn upsert_rider(&self, profile: RiderProfile) {
        self.riders.insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_rider(&self, rider_id: &str) -> Option<RiderProfile> {
        self.riders.get(rider_id).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_rider_lookup() {
        let store = InMemoryUserStore::with_default_riders();

        let rider = store.get_rider("rider-1").await.unwrap();
        assert_eq!(rider.name, "Emeka Johnson");
        assert_eq!(rider.deliveries, 500);

        assert!(store.get_rider("rider-404").await.is_none());
    }
}
