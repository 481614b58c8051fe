// src/storage/mod.rs - Storage Layer
//! # Storage Layer
//!
//! Order storage contract and the in-memory backend, plus the user-profile
//! collaborator used to resolve riders.
//!
//! All mutations go through [`OrderStorage::update_order`], which runs the
//! caller's mutation under the per-key lock so concurrent patches to the same
//! order never lose fields.

pub mod memory;
pub mod users;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    core::{
        order::{Order, OrderStatus},
        types::{OrderCode, OrderId, OrderKey},
    },
    ServiceResult,
};

pub use memory::InMemoryStorage;
pub use users::{InMemoryUserStore, UserStore};

/// Storage-level failures
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An order with this id already exists
    #[error("Order {0} already exists")]
    DuplicateOrder(OrderId),

    /// Configured capacity reached
    #[error("Storage capacity exceeded")]
    CapacityExceeded,

    /// Backend failure
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

/// Mutation applied to a stored order under its key lock. Returning an error
/// leaves the stored record untouched.
pub type OrderMutation<'a> = Box<dyn FnOnce(&mut Order) -> ServiceResult<()> + Send + 'a>;

/// Listing filter and page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    /// Only orders with this status
    pub status: Option<OrderStatus>,
    /// 1-based page number
    pub page: usize,
    /// Page size
    pub per_page: usize,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            status: None,
            page: 1,
            per_page: crate::constants::DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of orders, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPage {
    /// Orders on this page
    pub orders: Vec<Order>,
    /// Total matching orders across all pages
    pub total: usize,
    /// 1-based page number
    pub page: usize,
    /// Page size
    pub per_page: usize,
}

/// Storage metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageMetrics {
    /// Orders stored
    pub total_orders: u64,
    /// Orders not yet delivered or cancelled
    pub active_orders: u64,
    /// Read operations served
    pub reads: u64,
    /// Write operations applied
    pub writes: u64,
}

/// Keyed order storage
#[async_trait]
pub trait OrderStorage: Send + Sync {
    /// Insert a newly created order
    async fn insert_order(&self, order: Order) -> Result<(), StorageError>;

    /// Look up by internal id
    async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>, StorageError>;

    /// Look up by human-readable code
    async fn get_order_by_code(&self, code: &OrderCode) -> Result<Option<Order>, StorageError>;

    /// Look up by payment gateway reference
    async fn get_order_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, StorageError>;

    /// Look up by id or code
    async fn find_order(&self, key: &OrderKey) -> Result<Option<Order>, StorageError> {
        match key {
            OrderKey::Id(id) => self.get_order(id).await,
            OrderKey::Code(code) => self.get_order_by_code(code).await,
        }
    }

    /// Atomically apply `mutation` to the order and return the updated record
    async fn update_order(&self, key: &OrderKey, mutation: OrderMutation<'_>)
        -> ServiceResult<Order>;

    /// List orders sorted by creation time, newest first
    async fn list_orders(&self, query: &OrderQuery) -> Result<OrderPage, StorageError>;

    /// Storage metrics
    async fn get_metrics(&self) -> Result<StorageMetrics, StorageError>;
}
