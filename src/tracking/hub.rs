// src/tracking/hub.rs - Tracking Hub
//! Session registry and per-connection tracking loop
//!
//! ```text
//! rider device ──► post_rider_location ──┐
//!                                        ├──► session queue ──► serve loop ──► client
//! lifecycle events ──► status forwarder ─┘                          ▲
//!                                                   idle tick ──────┘
//! ```
//!
//! One session per order. A second connection for the same order replaces the
//! first; the replaced loop sees its queue close and exits.

use chrono::{Timelike, Utc};
use dashmap::DashMap;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, instrument, warn};

use crate::{
    core::{
        order::Order,
        types::{OrderId, OrderKey, RiderLocation, RiderPosition, RiderProfile, Timestamp},
    },
    engine::LifecycleManager,
    storage::UserStore,
    tracking::{
        connection::TrackingTransport,
        messages::{ClientMessage, TrackingMessage, TrackingSnapshot},
    },
    ServiceResult, TrackingConfig,
};

/// Fallback ETA cycle length (minutes) once the estimate has passed
const ETA_CYCLE_MINUTES: u32 = 15;

struct SessionHandle {
    session_id: u64,
    tx: mpsc::Sender<TrackingMessage>,
}

type SessionMap = DashMap<OrderId, SessionHandle>;

/// Hub statistics
#[derive(Debug, Default)]
pub struct HubStats {
    /// Connections accepted
    pub connections: AtomicU64,
    /// Messages queued to a session
    pub messages_queued: AtomicU64,
    /// Messages dropped (no session or full queue)
    pub messages_dropped: AtomicU64,
}

/// Real-time fan-out of order updates to one subscriber per order
pub struct TrackingHub {
    sessions: Arc<SessionMap>,
    next_session_id: AtomicU64,
    lifecycle: LifecycleManager,
    users: Arc<dyn UserStore>,
    config: TrackingConfig,
    stats: HubStats,
}

/// Removes the session registration when dropped, unless a newer connection
/// has already replaced it.
pub struct SessionGuard {
    sessions: Arc<SessionMap>,
    order_id: OrderId,
    session_id: u64,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let removed = self
            .sessions
            .remove_if(&self.order_id, |_, handle| handle.session_id == self.session_id)
            .is_some();
        debug!(
            order_id = %self.order_id,
            session_id = self.session_id,
            removed,
            "Tracking session released"
        );
    }
}

/// A registered tracking connection, ready to be served
pub struct TrackingSession {
    /// Order being tracked
    pub order_id: OrderId,
    /// First message to send
    pub initial: TrackingMessage,
    outbound: mpsc::Receiver<TrackingMessage>,
    guard: SessionGuard,
}

impl TrackingSession {
    /// Session id, unique per hub
    pub fn session_id(&self) -> u64 {
        self.guard.session_id
    }
}

impl TrackingHub {
    /// Create a new hub
    pub fn new(
        lifecycle: LifecycleManager,
        users: Arc<dyn UserStore>,
        config: TrackingConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            next_session_id: AtomicU64::new(1),
            lifecycle,
            users,
            config,
            stats: HubStats::default(),
        }
    }

    /// Register a connection for the order, replacing any existing one
    #[instrument(skip(self))]
    pub async fn connect(&self, key: &OrderKey) -> ServiceResult<TrackingSession> {
        let order = self.lifecycle.get_order(key).await?;
        let initial = self.initial_message(&order).await;

        let (tx, outbound) = mpsc::channel(self.config.outbound_buffer.max(1));
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        let replaced = self
            .sessions
            .insert(order.id, SessionHandle { session_id, tx })
            .is_some();
        self.stats.connections.fetch_add(1, Ordering::Relaxed);

        info!(
            order_id = %order.id,
            session_id,
            replaced,
            "Tracking session registered"
        );

        Ok(TrackingSession {
            order_id: order.id,
            initial,
            outbound,
            guard: SessionGuard {
                sessions: Arc::clone(&self.sessions),
                order_id: order.id,
                session_id,
            },
        })
    }

    /// Drive a session until the peer disconnects, the transport fails or a
    /// newer connection replaces it
    pub async fn serve<T: TrackingTransport>(
        &self,
        session: TrackingSession,
        mut transport: T,
    ) -> ServiceResult<()> {
        let TrackingSession {
            order_id,
            initial,
            mut outbound,
            guard,
        } = session;

        transport.send(&initial).await?;

        let period = Duration::from_millis(self.config.idle_timeout_ms.max(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut live_since_tick = false;

        loop {
            tokio::select! {
                inbound = transport.recv() => match inbound {
                    Some(Ok(text)) => {
                        if let Some(reply) = Self::handle_client_message(&text) {
                            transport.send(&reply).await?;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(%order_id, "Tracking connection failed: {}", e);
                        return Err(e);
                    }
                    None => break,
                },

                queued = outbound.recv() => match queued {
                    Some(message) => {
                        live_since_tick |= message.is_location_update();
                        transport.send(&message).await?;
                    }
                    None => {
                        info!(%order_id, "Tracking session replaced by a newer connection");
                        break;
                    }
                },

                _ = ticker.tick() => {
                    if live_since_tick {
                        live_since_tick = false;
                    } else if let Some(update) = self.synthetic_update(order_id).await {
                        transport.send(&update).await?;
                    }
                }
            }
        }

        drop(guard);
        Ok(())
    }

    fn handle_client_message(text: &str) -> Option<TrackingMessage> {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring malformed tracking message: {}", e);
                return None;
            }
        };

        match serde_json::from_value::<ClientMessage>(value) {
            Ok(ClientMessage::Ping) => Some(TrackingMessage::Pong),
            Err(_) => {
                debug!("Ignoring unknown tracking message: {}", text);
                None
            }
        }
    }

    /// Forward a rider location to the order's session. Returns whether it
    /// was queued; without a session the location is dropped.
    #[instrument(skip(self, location), fields(order = %location.order_id))]
    pub async fn post_rider_location(&self, location: RiderLocation) -> bool {
        if let Err(e) = location.validate() {
            warn!("Dropping rider location: {}", e);
            self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let order_id = match OrderKey::parse(&location.order_id) {
            OrderKey::Id(id) => id,
            key @ OrderKey::Code(_) => match self.lifecycle.get_order(&key).await {
                Ok(order) => order.id,
                Err(_) => {
                    debug!("Dropping rider location for unknown order");
                    self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
            },
        };

        self.push(
            order_id,
            TrackingMessage::LocationUpdate {
                order_id,
                rider_location: location.position(),
                estimated_arrival: None,
                timestamp: Some(location.timestamp),
            },
        )
    }

    fn push(&self, order_id: OrderId, message: TrackingMessage) -> bool {
        let queued = self
            .sessions
            .get(&order_id)
            .is_some_and(|handle| handle.tx.try_send(message).is_ok());

        if queued {
            self.stats.messages_queued.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(%order_id, "No live tracking session, message dropped");
        }
        queued
    }

    /// Forward order status changes to tracked orders until the lifecycle
    /// channel closes or the hub is dropped
    pub fn spawn_status_forwarder(self: &Arc<Self>) -> JoinHandle<()> {
        let hub: Weak<Self> = Arc::downgrade(self);
        let mut events = self.lifecycle.subscribe();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.is_status_change() => {
                        let Some(hub) = hub.upgrade() else { break };
                        hub.push(
                            event.order_id,
                            TrackingMessage::StatusUpdate {
                                order_id: event.order_id,
                                status: event.new_status,
                                timestamp: event.timestamp,
                            },
                        );
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Status forwarder lagged, events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Status forwarder stopped");
        })
    }

    /// Current tracking state over plain HTTP
    pub async fn snapshot(&self, key: &OrderKey) -> ServiceResult<TrackingSnapshot> {
        let order = self.lifecycle.get_order(key).await?;
        let address = &order.delivery_address;

        Ok(TrackingSnapshot {
            order_id: order.id,
            order_code: order.order_code.clone(),
            status: order.status,
            rider: self.rider_for(&order).await,
            rider_location: order.rider_location,
            estimated_arrival: estimated_arrival(&order, Utc::now()),
            delivery_address: format!("{}, {}", address.address, address.city),
        })
    }

    async fn initial_message(&self, order: &Order) -> TrackingMessage {
        TrackingMessage::Initial {
            order_id: order.id,
            order_code: order.order_code.clone(),
            status: order.status,
            rider: self.rider_for(order).await,
            estimated_arrival: estimated_arrival(order, Utc::now()),
        }
    }

    async fn rider_for(&self, order: &Order) -> Option<RiderProfile> {
        match &order.rider_id {
            Some(rider_id) => self.users.get_rider(rider_id).await,
            None => None,
        }
    }

    /// Simulated rider motion for an idle session. Delivered and cancelled
    /// orders have no rider en route.
    async fn synthetic_update(&self, order_id: OrderId) -> Option<TrackingMessage> {
        let now = Utc::now();
        let order = self.lifecycle.get_order(&OrderKey::Id(order_id)).await.ok();
        if order.as_ref().is_some_and(|o| o.status.is_terminal()) {
            return None;
        }
        let base = base_position(order.as_ref(), &self.config);

        let drift = self.config.drift_step * f64::from(now.second() % 10);
        Some(TrackingMessage::LocationUpdate {
            order_id,
            rider_location: RiderPosition {
                latitude: base.0 + drift,
                longitude: base.1 + drift,
                heading: None,
                speed: None,
            },
            estimated_arrival: Some(
                order.map_or_else(|| fallback_eta(now), |o| estimated_arrival(&o, now)),
            ),
            timestamp: None,
        })
    }

    /// Number of registered sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Check if the order has a live session
    pub fn is_tracked(&self, order_id: &OrderId) -> bool {
        self.sessions.contains_key(order_id)
    }

    /// Hub statistics
    pub fn stats(&self) -> &HubStats {
        &self.stats
    }
}

/// Origin of synthesized motion: last rider position, then the delivery
/// address, then the configured default
fn base_position(order: Option<&Order>, config: &TrackingConfig) -> (f64, f64) {
    order
        .and_then(|o| {
            o.rider_location
                .map(|p| (p.latitude, p.longitude))
                .or_else(|| o.delivery_address.coordinates())
        })
        .unwrap_or((config.default_latitude, config.default_longitude))
}

/// Human-readable ETA. Minutes until the estimate while it lies ahead,
/// otherwise a countdown cycling on the wall-clock minute.
pub fn estimated_arrival(order: &Order, now: Timestamp) -> String {
    match order.estimated_delivery {
        Some(eta) if eta > now => {
            let minutes = (eta - now).num_minutes().max(1);
            format!("{minutes} minutes")
        }
        _ => fallback_eta(now),
    }
}

fn fallback_eta(now: Timestamp) -> String {
    format!("{} minutes", ETA_CYCLE_MINUTES - now.minute() % ETA_CYCLE_MINUTES)
}
