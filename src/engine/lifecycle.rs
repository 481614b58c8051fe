// src/engine/lifecycle.rs - Order Lifecycle Management
//! Order state machine and lifecycle management
//!
//! Owns every write to an order: placement, status transitions, cancellation,
//! partial patches and payment updates. Each successful mutation publishes an
//! [`OrderEvent`] on a broadcast channel.
//!
//! ## Transition Policy
//!
//! Status transitions are permissive by default: any status may be set,
//! including backward jumps. With `enforce_sequential_transitions` only the
//! next forward step or a cancellation is accepted. Cancellation itself is
//! always refused once the order is `OnTheWay` or `Delivered`.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    constants,
    core::{
        events::{OrderEvent, OrderEventType},
        order::{Order, OrderPatch, OrderRequest, OrderStatus, PaymentStatus},
        types::{Amount, OrderCode, OrderId, OrderKey, Timestamp},
    },
    engine::{
        pricing::{self, DeliveryPolicy, DiscountResolver, NoDiscounts},
        validator::OrderValidator,
    },
    storage::{OrderPage, OrderQuery, OrderStorage},
    DeliveryConfig, LifecycleConfig, ServiceError, ServiceResult,
};

/// Lifecycle statistics
#[derive(Debug, Default)]
pub struct LifecycleStats {
    /// Orders placed
    pub total_orders: AtomicU64,
    /// Status changes applied
    pub state_transitions: AtomicU64,
    /// Orders cancelled
    pub cancelled_orders: AtomicU64,
    /// Status changes or cancellations refused
    pub invalid_transitions: AtomicU64,
    /// Payment status changes applied
    pub payment_updates: AtomicU64,
}

/// Point-in-time copy of [`LifecycleStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleStatsSnapshot {
    /// Orders placed
    pub total_orders: u64,
    /// Status changes applied
    pub state_transitions: u64,
    /// Orders cancelled
    pub cancelled_orders: u64,
    /// Status changes or cancellations refused
    pub invalid_transitions: u64,
    /// Payment status changes applied
    pub payment_updates: u64,
}

/// Order lifecycle manager
#[derive(Clone)]
pub struct LifecycleManager {
    config: Arc<LifecycleConfig>,
    delivery: Arc<DeliveryConfig>,
    policy: DeliveryPolicy,
    storage: Arc<dyn OrderStorage>,
    discounts: Arc<dyn DiscountResolver>,
    validator: Arc<OrderValidator>,
    event_tx: broadcast::Sender<OrderEvent>,
    sequence: Arc<AtomicU64>,
    stats: Arc<LifecycleStats>,
}

impl LifecycleManager {
    /// Create new lifecycle manager
    pub fn new(
        config: LifecycleConfig,
        delivery: DeliveryConfig,
        storage: Arc<dyn OrderStorage>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));

        Self {
            config: Arc::new(config),
            policy: DeliveryPolicy::from(&delivery),
            delivery: Arc::new(delivery),
            storage,
            discounts: Arc::new(NoDiscounts),
            validator: Arc::new(OrderValidator::new()),
            event_tx,
            sequence: Arc::new(AtomicU64::new(0)),
            stats: Arc::new(LifecycleStats::default()),
        }
    }

    /// Set the promo code resolver
    #[must_use]
    pub fn with_discounts(mut self, discounts: Arc<dyn DiscountResolver>) -> Self {
        self.discounts = discounts;
        self
    }

    /// Place a new order
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(&self, request: OrderRequest) -> ServiceResult<Order> {
        let now = Utc::now();
        self.validator.validate_request(&request, now).into_result()?;

        let discount = match request.discount_code.as_deref() {
            Some(code) => {
                let subtotal = pricing::subtotal(&request.items)?;
                self.discounts.resolve(code, subtotal).await?
            }
            None => 0,
        };
        let prices = pricing::compute_totals(&request.items, &self.policy, discount)?;

        let estimated_delivery = request
            .scheduled_time
            .unwrap_or_else(|| now + Duration::minutes(self.delivery.default_eta_minutes));

        let order = Order {
            id: Uuid::new_v4(),
            order_code: OrderCode::generate(&self.delivery.order_code_prefix, now.date_naive()),
            items: request.items,
            subtotal: prices.subtotal,
            delivery_fee: prices.delivery_fee,
            discount: prices.discount,
            total: prices.total,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: request.payment_method,
            payment_reference: None,
            delivery_address: request.delivery_address,
            scheduled_time: request.scheduled_time,
            rider_id: None,
            rider_location: None,
            estimated_delivery: Some(estimated_delivery),
            special_instructions: request.special_instructions,
            discount_code: request.discount_code,
            created_at: now,
            updated_at: None,
            paid_at: None,
        };

        self.storage.insert_order(order.clone()).await?;
        self.stats.total_orders.fetch_add(1, Ordering::Relaxed);
        self.emit_event(OrderEventType::OrderCreated, &order, None);

        info!(
            "Order {} placed: subtotal={} fee={} total={}",
            order.order_code, order.subtotal, order.delivery_fee, order.total
        );
        Ok(order)
    }

    /// Set a new status
    pub async fn transition_order(
        &self,
        key: &OrderKey,
        new_status: OrderStatus,
    ) -> ServiceResult<Order> {
        self.patch_order(
            key,
            OrderPatch {
                status: Some(new_status),
                ..OrderPatch::default()
            },
        )
        .await
    }

    /// Apply a partial update; absent fields are left untouched
    #[instrument(skip(self))]
    pub async fn patch_order(&self, key: &OrderKey, patch: OrderPatch) -> ServiceResult<Order> {
        let enforce = self.config.enforce_sequential_transitions;
        let mut previous = None;
        let previous_slot = &mut previous;

        let result = self
            .storage
            .update_order(
                key,
                Box::new(move |order: &mut Order| {
                    *previous_slot = Some(order.status);
                    if let Some(new_status) = patch.status {
                        if enforce
                            && new_status != order.status
                            && !order.status.can_advance_to(new_status)
                        {
                            return Err(ServiceError::InvalidTransition(format!(
                                "Cannot move order from {} to {}",
                                order.status, new_status
                            )));
                        }
                    }
                    order.apply_patch(&patch);
                    Ok(())
                }),
            )
            .await;

        let order = self.track_rejection(result)?;
        let previous = previous.unwrap_or(order.status);

        if previous == order.status {
            self.emit_event(OrderEventType::RiderUpdated, &order, Some(previous));
        } else {
            self.stats.state_transitions.fetch_add(1, Ordering::Relaxed);
            if order.status == OrderStatus::Cancelled {
                self.stats.cancelled_orders.fetch_add(1, Ordering::Relaxed);
            }
            self.emit_event(OrderEventType::StatusChanged, &order, Some(previous));
            info!("Order {} transitioned from {} to {}", order.order_code, previous, order.status);
        }
        Ok(order)
    }

    /// Cancel an order that has not left with the rider
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, key: &OrderKey) -> ServiceResult<Order> {
        let mut previous = None;
        let previous_slot = &mut previous;

        let result = self
            .storage
            .update_order(
                key,
                Box::new(move |order: &mut Order| {
                    *previous_slot = Some(order.status);
                    if order.status == OrderStatus::Cancelled {
                        return Ok(());
                    }
                    if !order.status.can_be_cancelled() {
                        return Err(ServiceError::InvalidTransition(format!(
                            "Cannot cancel order in {} status",
                            order.status
                        )));
                    }
                    order.status = OrderStatus::Cancelled;
                    order.touch();
                    Ok(())
                }),
            )
            .await;

        let order = self.track_rejection(result)?;
        match previous {
            Some(previous) if previous != OrderStatus::Cancelled => {
                self.stats.state_transitions.fetch_add(1, Ordering::Relaxed);
                self.stats.cancelled_orders.fetch_add(1, Ordering::Relaxed);
                self.emit_event(OrderEventType::OrderCancelled, &order, Some(previous));
                info!("Order {} cancelled from {}", order.order_code, previous);
            }
            _ => debug!("Order {} already cancelled", order.order_code),
        }
        Ok(order)
    }

    /// Record the gateway reference of a new payment attempt
    #[instrument(skip(self))]
    pub async fn attach_payment_reference(
        &self,
        key: &OrderKey,
        reference: &str,
    ) -> ServiceResult<Order> {
        let reference = reference.to_string();
        let order = self
            .storage
            .update_order(
                key,
                Box::new(move |order: &mut Order| {
                    if order.payment_status == PaymentStatus::Completed {
                        return Err(ServiceError::Validation(format!(
                            "Order {} is already paid",
                            order.order_code
                        )));
                    }
                    order.payment_reference = Some(reference);
                    order.payment_status = PaymentStatus::Pending;
                    order.touch();
                    Ok(())
                }),
            )
            .await?;

        self.emit_event(OrderEventType::PaymentUpdated, &order, Some(order.status));
        Ok(order)
    }

    /// Mark the order owning `reference` as paid for `amount`. Repeated
    /// confirmations keep the first `paid_at`. A charge that does not cover
    /// exactly the order total marks the payment failed and is rejected.
    #[instrument(skip(self))]
    pub async fn mark_paid(
        &self,
        reference: &str,
        amount: Amount,
        paid_at: Timestamp,
    ) -> ServiceResult<Order> {
        let order = self.order_for_reference(reference).await?;

        if amount != order.total {
            warn!(
                "Payment {} charged {} but order {} totals {}",
                reference, amount, order.order_code, order.total
            );
            self.set_payment_status(order.id, PaymentStatus::Failed, None)
                .await?;
            return Err(ServiceError::Validation(format!(
                "Amount paid {amount} does not match order total {}",
                order.total
            )));
        }

        self.set_payment_status(order.id, PaymentStatus::Completed, Some(paid_at))
            .await
    }

    /// Mark the order owning `reference` as failed unless already paid
    #[instrument(skip(self))]
    pub async fn mark_payment_failed(&self, reference: &str) -> ServiceResult<Order> {
        let order = self.order_for_reference(reference).await?;
        self.set_payment_status(order.id, PaymentStatus::Failed, None)
            .await
    }

    async fn order_for_reference(&self, reference: &str) -> ServiceResult<Order> {
        self.storage
            .get_order_by_payment_reference(reference)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No order for payment reference {reference}"))
            })
    }

    async fn set_payment_status(
        &self,
        order_id: OrderId,
        status: PaymentStatus,
        paid_at: Option<Timestamp>,
    ) -> ServiceResult<Order> {
        let mut changed = false;
        let changed_flag = &mut changed;
        let order = self
            .storage
            .update_order(
                &OrderKey::Id(order_id),
                Box::new(move |order: &mut Order| {
                    if order.payment_status == PaymentStatus::Completed
                        || order.payment_status == status
                    {
                        return Ok(());
                    }
                    order.payment_status = status;
                    if paid_at.is_some() {
                        order.paid_at = paid_at;
                    }
                    order.touch();
                    *changed_flag = true;
                    Ok(())
                }),
            )
            .await?;

        if changed {
            self.stats.payment_updates.fetch_add(1, Ordering::Relaxed);
            self.emit_event(OrderEventType::PaymentUpdated, &order, Some(order.status));
            info!("Order {} payment {:?}", order.order_code, order.payment_status);
        }
        Ok(order)
    }

    /// Look up an order by id or code
    pub async fn get_order(&self, key: &OrderKey) -> ServiceResult<Order> {
        self.storage
            .find_order(key)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {key} not found")))
    }

    /// List orders, newest first
    pub async fn list_orders(&self, query: &OrderQuery) -> ServiceResult<OrderPage> {
        if query.page == 0 {
            return Err(ServiceError::Validation("page must be at least 1".to_string()));
        }
        if query.per_page == 0 || query.per_page > constants::MAX_PAGE_SIZE {
            return Err(ServiceError::Validation(format!(
                "per_page must be between 1 and {}",
                constants::MAX_PAGE_SIZE
            )));
        }
        Ok(self.storage.list_orders(query).await?)
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.event_tx.subscribe()
    }

    /// Get statistics
    pub fn get_stats(&self) -> LifecycleStatsSnapshot {
        LifecycleStatsSnapshot {
            total_orders: self.stats.total_orders.load(Ordering::Relaxed),
            state_transitions: self.stats.state_transitions.load(Ordering::Relaxed),
            cancelled_orders: self.stats.cancelled_orders.load(Ordering::Relaxed),
            invalid_transitions: self.stats.invalid_transitions.load(Ordering::Relaxed),
            payment_updates: self.stats.payment_updates.load(Ordering::Relaxed),
        }
    }

    fn track_rejection(&self, result: ServiceResult<Order>) -> ServiceResult<Order> {
        if let Err(ServiceError::InvalidTransition(reason)) = &result {
            self.stats.invalid_transitions.fetch_add(1, Ordering::Relaxed);
            warn!("Transition rejected: {}", reason);
        }
        result
    }

    fn emit_event(&self, event_type: OrderEventType, order: &Order, previous: Option<OrderStatus>) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        // No receivers is not an error
        let _ = self
            .event_tx
            .send(OrderEvent::new(event_type, order, previous, sequence));
    }
}
