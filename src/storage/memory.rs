// src/storage/memory.rs - In-Memory Order Storage
//! # In-Memory Storage Backend
//!
//! Concurrent in-memory storage using DashMap. The primary map is keyed by
//! internal id; secondary indexes resolve order codes and payment references.
//! Mutations hold the primary shard lock for the whole read-modify-write.

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info, instrument, warn};

use crate::{
    core::{
        order::Order,
        types::{OrderCode, OrderId, OrderKey},
    },
    ServiceError, ServiceResult, StorageConfig,
};

use super::{OrderMutation, OrderPage, OrderQuery, OrderStorage, StorageError, StorageMetrics};

/// Configuration for in-memory storage
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Maximum number of orders to keep in memory
    pub max_orders: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { max_orders: 1_000_000 }
    }
}

impl From<&StorageConfig> for MemoryConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_orders: config.max_orders,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryStats {
    reads: AtomicU64,
    writes: AtomicU64,
}

/// In-memory storage implementation
pub struct InMemoryStorage {
    /// Primary storage - order ID to Order mapping
    orders: DashMap<OrderId, Order>,

    /// Order code to order ID
    code_index: DashMap<OrderCode, OrderId>,

    /// Payment reference to order ID, latest attempt only
    reference_index: DashMap<String, OrderId>,

    /// Slots taken against `max_orders`; orders are never removed
    reserved: AtomicUsize,

    config: MemoryConfig,

    stats: MemoryStats,
}

impl InMemoryStorage {
    /// Create a new in-memory storage instance
    pub fn new(config: MemoryConfig) -> Self {
        info!("Initializing in-memory order storage with capacity: {}", config.max_orders);

        Self {
            orders: DashMap::new(),
            code_index: DashMap::new(),
            reference_index: DashMap::new(),
            reserved: AtomicUsize::new(0),
            config,
            stats: MemoryStats::default(),
        }
    }

    fn resolve(&self, key: &OrderKey) -> Option<OrderId> {
        match key {
            OrderKey::Id(id) => Some(*id),
            OrderKey::Code(code) => self.code_index.get(code).map(|entry| *entry.value()),
        }
    }

    /// Claim a slot below `max_orders`. Concurrent inserts cannot overshoot.
    fn reserve_slot(&self) -> bool {
        let max_orders = self.config.max_orders;
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |taken| {
                (taken < max_orders).then_some(taken + 1)
            })
            .is_ok()
    }

    fn read(&self, order_id: &OrderId) -> Option<Order> {
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        self.orders.get(order_id).map(|entry| entry.value().clone())
    }

    /// Number of stored orders
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Check if no orders are stored
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

#[async_trait]
impl OrderStorage for InMemoryStorage {
    #[instrument(skip(self, order), fields(order_id = %order.id, order_code = %order.order_code))]
    async fn insert_order(&self, order: Order) -> Result<(), StorageError> {
        if !self.reserve_slot() {
            warn!("Storage capacity exceeded: {} orders", self.config.max_orders);
            return Err(StorageError::CapacityExceeded);
        }

        let order_id = order.id;
        let code = order.order_code.clone();
        let reference = order.payment_reference.clone();

        match self.orders.entry(order_id) {
            Entry::Occupied(_) => {
                self.reserved.fetch_sub(1, Ordering::AcqRel);
                return Err(StorageError::DuplicateOrder(order_id));
            }
            Entry::Vacant(slot) => {
                slot.insert(order);
            }
        }

        match self.code_index.entry(code) {
            Entry::Occupied(existing) => {
                warn!(
                    "Order code {} collides with order {}; lookups by code keep the earlier order",
                    existing.key(),
                    existing.get()
                );
            }
            Entry::Vacant(slot) => {
                slot.insert(order_id);
            }
        }

        if let Some(reference) = reference {
            self.reference_index.insert(reference, order_id);
        }

        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        debug!("Inserted order");
        Ok(())
    }

    async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>, StorageError> {
        Ok(self.read(order_id))
    }

    async fn get_order_by_code(&self, code: &OrderCode) -> Result<Option<Order>, StorageError> {
        Ok(self
            .resolve(&OrderKey::Code(code.clone()))
            .and_then(|id| self.read(&id)))
    }

    async fn get_order_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, StorageError> {
        let order_id = self.reference_index.get(reference).map(|entry| *entry.value());
        Ok(order_id.and_then(|id| self.read(&id)))
    }

    #[instrument(skip(self, mutation))]
    async fn update_order(
        &self,
        key: &OrderKey,
        mutation: OrderMutation<'_>,
    ) -> ServiceResult<Order> {
        let not_found = || ServiceError::NotFound(format!("Order {key} not found"));
        let order_id = self.resolve(key).ok_or_else(not_found)?;

        let updated = {
            let mut entry = self.orders.get_mut(&order_id).ok_or_else(not_found)?;
            let mut candidate = entry.value().clone();
            mutation(&mut candidate)?;

            // Index follows the entry while its shard is still locked
            let previous = entry.value().payment_reference.as_ref();
            if previous != candidate.payment_reference.as_ref() {
                if let Some(previous) = previous {
                    self.reference_index
                        .remove_if(previous, |_, owner| *owner == order_id);
                }
                if let Some(reference) = &candidate.payment_reference {
                    self.reference_index.insert(reference.clone(), order_id);
                }
            }

            *entry.value_mut() = candidate.clone();
            candidate
        };

        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        debug!("Updated order {}", updated.order_code);
        Ok(updated)
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<OrderPage, StorageError> {
        self.stats.reads.fetch_add(1, Ordering::Relaxed);

        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| query.status.map_or(true, |status| entry.value().status == status))
            .map(|entry| entry.value().clone())
            .collect();

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = orders.len();
        let offset = query.page.saturating_sub(1).saturating_mul(query.per_page);
        let orders = orders.into_iter().skip(offset).take(query.per_page).collect();

        Ok(OrderPage {
            orders,
            total,
            page: query.page,
            per_page: query.per_page,
        })
    }

    async fn get_metrics(&self) -> Result<StorageMetrics, StorageError> {
        let active_orders = self
            .orders
            .iter()
            .filter(|entry| !entry.value().status.is_terminal())
            .count();

        Ok(StorageMetrics {
            total_orders: self.orders.len() as u64,
            active_orders: active_orders as u64,
            reads: self.stats.reads.load(Ordering::Relaxed),
            writes: self.stats.writes.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::order::{
        DeliveryAddress, OrderItem, OrderStatus, PaymentMethod, PaymentStatus,
    };
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    fn test_order(code: &str, minutes_ago: i64) -> Order {
        Order {
            id: Uuid::new_v4(),
            order_code: OrderCode::from(code),
            items: vec![OrderItem {
                menu_item_id: "suya".to_string(),
                name: "Beef Suya".to_string(),
                quantity: 1,
                unit_price: 4000,
                note: None,
            }],
            subtotal: 4000,
            delivery_fee: 1500,
            discount: 0,
            total: 5500,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: PaymentMethod::Card,
            payment_reference: None,
            delivery_address: DeliveryAddress {
                full_name: "Ada Obi".to_string(),
                phone: "+2348000000000".to_string(),
                email: "ada@example.com".to_string(),
                address: "12 Admiralty Way".to_string(),
                city: "Lagos".to_string(),
                landmark: None,
                latitude: None,
                longitude: None,
            },
            scheduled_time: None,
            rider_id: None,
            rider_location: None,
            estimated_delivery: None,
            special_instructions: None,
            discount_code: None,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            updated_at: None,
            paid_at: None,
        }
    }

    #[tokio::test]
    async fn test_lookup_by_id_and_code() {
        let storage = InMemoryStorage::default();
        let order = test_order("CC-20240101-AAAAAA", 0);
        storage.insert_order(order.clone()).await.unwrap();

        let by_id = storage.get_order(&order.id).await.unwrap().unwrap();
        let by_code = storage
            .get_order_by_code(&order.order_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id.id, by_code.id);

        let found = storage
            .find_order(&OrderKey::parse("CC-20240101-AAAAAA"))
            .await
            .unwrap();
        assert_eq!(found.map(|o| o.id), Some(order.id));

        assert!(storage
            .find_order(&OrderKey::parse("CC-20240101-ZZZZZZ"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_and_capacity() {
        let storage = InMemoryStorage::new(MemoryConfig { max_orders: 2 });
        let order = test_order("CC-20240101-AAAAAA", 0);

        storage.insert_order(order.clone()).await.unwrap();
        assert!(matches!(
            storage.insert_order(order).await,
            Err(StorageError::DuplicateOrder(_))
        ));

        storage
            .insert_order(test_order("CC-20240101-BBBBBB", 0))
            .await
            .unwrap();
        assert!(matches!(
            storage.insert_order(test_order("CC-20240101-CCCCCC", 0)).await,
            Err(StorageError::CapacityExceeded)
        ));
    }

    #[tokio::test]
    async fn test_list_sorted_filtered_paginated() {
        let storage = InMemoryStorage::default();
        for i in 0..5 {
            let mut order = test_order(&format!("CC-20240101-00000{i}"), i);
            if i % 2 == 0 {
                order.status = OrderStatus::Preparing;
            }
            storage.insert_order(order).await.unwrap();
        }

        let page = storage
            .list_orders(&OrderQuery { status: None, page: 1, per_page: 2 })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.orders.len(), 2);
        assert_eq!(page.orders[0].order_code.as_str(), "CC-20240101-000000");
        assert_eq!(page.orders[1].order_code.as_str(), "CC-20240101-000001");

        let last = storage
            .list_orders(&OrderQuery { status: None, page: 3, per_page: 2 })
            .await
            .unwrap();
        assert_eq!(last.orders.len(), 1);
        assert_eq!(last.orders[0].order_code.as_str(), "CC-20240101-000004");

        let preparing = storage
            .list_orders(&OrderQuery {
                status: Some(OrderStatus::Preparing),
                page: 1,
                per_page: 10,
            })
            .await
            .unwrap();
        assert_eq!(preparing.total, 3);
        assert!(preparing
            .orders
            .iter()
            .all(|o| o.status == OrderStatus::Preparing));
    }

    #[tokio::test]
    async fn test_rejected_mutation_leaves_order_untouched() {
        let storage = InMemoryStorage::default();
        let order = test_order("CC-20240101-AAAAAA", 0);
        storage.insert_order(order.clone()).await.unwrap();

        let result = storage
            .update_order(
                &OrderKey::Id(order.id),
                Box::new(|o: &mut Order| {
                    o.status = OrderStatus::Delivered;
                    Err(ServiceError::InvalidTransition("rejected".to_string()))
                }),
            )
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidTransition(_))));

        let stored = storage.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_missing_order() {
        let storage = InMemoryStorage::default();
        let result = storage
            .update_order(&OrderKey::parse("CC-20240101-NOPE00"), Box::new(|_| Ok(())))
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_do_not_lose_fields() {
        let storage = Arc::new(InMemoryStorage::default());
        let order = test_order("CC-20240101-AAAAAA", 0);
        storage.insert_order(order.clone()).await.unwrap();
        let key = OrderKey::Id(order.id);

        let mut handles = Vec::new();
        for i in 0..50 {
            let storage = Arc::clone(&storage);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                storage
                    .update_order(
                        &key,
                        Box::new(move |o: &mut Order| {
                            o.items[0].quantity += 1;
                            if i % 2 == 0 {
                                o.rider_id = Some("rider-1".to_string());
                            } else {
                                o.status = OrderStatus::Confirmed;
                            }
                            Ok(())
                        }),
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = storage.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.items[0].quantity, 51);
        assert_eq!(stored.rider_id.as_deref(), Some("rider-1"));
        assert_eq!(stored.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_payment_reference_index() {
        let storage = InMemoryStorage::default();
        let order = test_order("CC-20240101-AAAAAA", 0);
        storage.insert_order(order.clone()).await.unwrap();

        storage
            .update_order(
                &OrderKey::Id(order.id),
                Box::new(|o: &mut Order| {
                    o.payment_reference = Some("chipchop_abc".to_string());
                    Ok(())
                }),
            )
            .await
            .unwrap();

        let found = storage
            .get_order_by_payment_reference("chipchop_abc")
            .await
            .unwrap();
        assert_eq!(found.map(|o| o.id), Some(order.id));

        let metrics = storage.get_metrics().await.unwrap();
        assert_eq!(metrics.total_orders, 1);
        assert_eq!(metrics.active_orders, 1);
    }

    #[tokio::test]
    async fn test_superseded_reference_no_longer_resolves() {
        let storage = InMemoryStorage::default();
        let order = test_order("CC-20240101-AAAAAA", 0);
        storage.insert_order(order.clone()).await.unwrap();

        for reference in ["chipchop_first", "chipchop_second"] {
            storage
                .update_order(
                    &OrderKey::Id(order.id),
                    Box::new(move |o: &mut Order| {
                        o.payment_reference = Some(reference.to_string());
                        Ok(())
                    }),
                )
                .await
                .unwrap();
        }

        assert!(storage
            .get_order_by_payment_reference("chipchop_first")
            .await
            .unwrap()
            .is_none());
        let current = storage
            .get_order_by_payment_reference("chipchop_second")
            .await
            .unwrap();
        assert_eq!(current.map(|o| o.id), Some(order.id));
        assert_eq!(storage.reference_index.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_capacity_holds_under_concurrent_inserts() {
        let storage = Arc::new(InMemoryStorage::new(MemoryConfig { max_orders: 10 }));

        let mut handles = Vec::new();
        for i in 0..50 {
            let storage = Arc::clone(&storage);
            handles.push(tokio::spawn(async move {
                storage
                    .insert_order(test_order(&format!("CC-20240101-{i:06}"), 0))
                    .await
            }));
        }

        let mut rejected = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), Err(StorageError::CapacityExceeded)) {
                rejected += 1;
            }
        }

        assert_eq!(storage.len(), 10);
        assert_eq!(rejected, 40);
    }
}
