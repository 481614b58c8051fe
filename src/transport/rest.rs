// src/transport/rest.rs - REST API Transport Layer
//! HTTP endpoints for ordering, tracking and payments
//!
//! Every JSON response is wrapped in [`ApiResponse`]:
//! `{success, data, error, timestamp, request_id}`.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    future::Future,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, info, instrument, warn, Level};
use uuid::Uuid;

use crate::{
    constants,
    core::{
        order::{OrderPatch, OrderRequest, OrderResponse, OrderStatus},
        types::{OrderKey, RiderLocation},
    },
    engine::{LifecycleManager, LifecycleStatsSnapshot},
    payments::{gateway_from_config, InitializePaymentRequest, PaymentService, SIGNATURE_HEADER},
    storage::{InMemoryStorage, InMemoryUserStore, OrderQuery, StorageError, UserStore},
    tracking::TrackingHub,
    transport::ws::WsTransport,
    AppConfig, ServiceError, ServiceResult, ServerConfig,
};

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// Order state machine
    pub lifecycle: LifecycleManager,
    /// Live tracking sessions
    pub hub: Arc<TrackingHub>,
    /// Payment correlation
    pub payments: PaymentService,
    /// Rider profiles
    pub users: Arc<dyn UserStore>,
    /// Service configuration
    pub config: Arc<AppConfig>,
    /// Process start
    pub start_time: Instant,
}

impl ApiState {
    /// Wire the in-memory stores, lifecycle, hub and payment gateway
    pub fn new(config: AppConfig) -> ServiceResult<Self> {
        let storage = Arc::new(InMemoryStorage::new((&config.storage).into()));
        let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::with_default_riders());

        let lifecycle = LifecycleManager::new(
            config.lifecycle.clone(),
            config.delivery.clone(),
            storage,
        );
        let hub = Arc::new(TrackingHub::new(
            lifecycle.clone(),
            Arc::clone(&users),
            config.tracking.clone(),
        ));
        let payments = PaymentService::new(
            gateway_from_config(&config.payments)?,
            lifecycle.clone(),
            &config.payments,
        );

        Ok(Self {
            lifecycle,
            hub,
            payments,
            users,
            config: Arc::new(config),
            start_time: Instant::now(),
        })
    }
}

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request succeeded
    pub success: bool,
    /// Payload on success
    pub data: Option<T>,
    /// Error message on failure
    pub error: Option<String>,
    /// Response time
    pub timestamp: DateTime<Utc>,
    /// Unique id for log correlation
    pub request_id: String,
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful response
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

impl ApiResponse<()> {
    /// Failed response
    pub fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Order listing query parameters
#[derive(Debug, Deserialize)]
pub struct OrderQueryParams {
    /// Status filter
    pub status: Option<String>,
    /// 1-based page
    pub page: Option<usize>,
    /// Page size
    #[serde(alias = "perPage")]
    pub per_page: Option<usize>,
}

impl OrderQueryParams {
    fn into_query(self) -> ServiceResult<OrderQuery> {
        let status = self
            .status
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<OrderStatus>())
            .transpose()?;

        Ok(OrderQuery {
            status,
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(constants::DEFAULT_PAGE_SIZE),
        })
    }
}

/// Plain message body
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable outcome
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Seconds since start
    pub uptime_seconds: u64,
    /// Crate version
    pub version: String,
    /// Lifecycle counters
    pub orders: LifecycleStatsSnapshot,
    /// Open tracking sessions
    pub tracking_sessions: usize,
    /// Response time
    pub timestamp: DateTime<Utc>,
}

/// Create REST API router
pub fn create_router(state: ApiState) -> Router {
    let server = &state.config.server;
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(server))
        .layer(TimeoutLayer::new(Duration::from_secs(server.request_timeout)));

    Router::new()
        // Order endpoints
        .route("/api/orders", post(create_order).get(list_orders))
        .route("/api/orders/:id", get(get_order).patch(patch_order))
        .route("/api/orders/:id/cancel", post(cancel_order))
        // Tracking endpoints
        .route("/api/tracking/ws/:id", get(tracking_ws))
        .route("/api/tracking/rider/location", post(post_rider_location))
        .route("/api/tracking/rider/:rider_id", get(get_rider))
        .route("/api/tracking/:id", get(get_tracking))
        // Payment endpoints
        .route("/api/payments/initialize", post(initialize_payment))
        .route("/api/payments/verify/:reference", get(verify_payment))
        .route("/api/payments/webhook", post(payment_webhook))
        // System endpoints
        .route("/health", get(health_check))
        .route("/", get(root))
        .layer(middleware)
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

// ===== Order Endpoints =====

/// Place a new order
#[instrument(skip(state, request))]
async fn create_order(
    State(state): State<ApiState>,
    Json(request): Json<OrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let order = state.lifecycle.create_order(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(OrderResponse {
            order,
            message: "Order created successfully".to_string(),
        })),
    ))
}

/// List orders, newest first
#[instrument(skip(state))]
async fn list_orders(
    State(state): State<ApiState>,
    Query(params): Query<OrderQueryParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = state.lifecycle.list_orders(&params.into_query()?).await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Get order by id or code
#[instrument(skip(state))]
async fn get_order(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let order = state.lifecycle.get_order(&OrderKey::parse(&id)).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Partially update an order
#[instrument(skip(state))]
async fn patch_order(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(patch): Json<OrderPatch>,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .lifecycle
        .patch_order(&OrderKey::parse(&id), patch)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Cancel an order
#[instrument(skip(state))]
async fn cancel_order(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.lifecycle.cancel_order(&OrderKey::parse(&id)).await?;
    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Order cancelled successfully".to_string(),
    })))
}

// ===== Tracking Endpoints =====

/// Upgrade to a tracking WebSocket for the order
#[instrument(skip(state, ws))]
async fn tracking_ws(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, AppError> {
    let key = OrderKey::parse(&id);
    // Unknown orders are refused before the upgrade
    state.lifecycle.get_order(&key).await?;

    let ws = ws.ok_or_else(|| AppError::UpgradeRequired("WebSocket upgrade required".to_string()))?;
    let hub = Arc::clone(&state.hub);

    Ok(ws.on_upgrade(move |socket| async move {
        let session = match hub.connect(&key).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Tracking connect failed for {}: {}", key, e);
                return;
            }
        };
        let session_id = session.session_id();

        match hub.serve(session, WsTransport::new(socket)).await {
            Ok(()) => debug!(session_id, "Tracking connection closed"),
            Err(e) => debug!(session_id, "Tracking connection ended: {}", e),
        }
    }))
}

/// Tracking snapshot for an order
#[instrument(skip(state))]
async fn get_tracking(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = state.hub.snapshot(&OrderKey::parse(&id)).await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

/// Rider device location feed. Always acknowledged.
#[instrument(skip(state, location))]
async fn post_rider_location(
    State(state): State<ApiState>,
    Json(location): Json<RiderLocation>,
) -> impl IntoResponse {
    state.hub.post_rider_location(location).await;
    Json(ApiResponse::success(json!({ "status": "ok" })))
}

/// Rider profile
#[instrument(skip(state))]
async fn get_rider(
    State(state): State<ApiState>,
    Path(rider_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let rider = state
        .users
        .get_rider(&rider_id)
        .await
        .ok_or_else(|| AppError::NotFound("Rider not found".to_string()))?;
    Ok(Json(ApiResponse::success(rider)))
}

// ===== Payment Endpoints =====

/// Start a hosted checkout
#[instrument(skip(state))]
async fn initialize_payment(
    State(state): State<ApiState>,
    Json(request): Json<InitializePaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let init = state.payments.initialize(request).await?;
    Ok(Json(ApiResponse::success(init)))
}

/// Verify a transaction
#[instrument(skip(state))]
async fn verify_payment(
    State(state): State<ApiState>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let verification = state.payments.verify(&reference).await?;
    Ok(Json(ApiResponse::success(verification)))
}

/// Provider webhook. The signature covers the raw body, so it is read as bytes.
#[instrument(skip(state, headers, body))]
async fn payment_webhook(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    state.payments.handle_webhook(&body, signature).await?;
    Ok(Json(ApiResponse::success(json!({ "status": "ok" }))))
}

// ===== System Endpoints =====

/// Health check endpoint
#[instrument(skip(state))]
async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: crate::VERSION.to_string(),
        orders: state.lifecycle.get_stats(),
        tracking_sessions: state.hub.session_count(),
        timestamp: Utc::now(),
    }))
}

async fn root() -> impl IntoResponse {
    Json(ApiResponse::success(json!({
        "name": crate::NAME,
        "version": crate::VERSION,
    })))
}

// ===== Error Handling =====

/// Application error type
#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    UpgradeRequired(String),
    Unavailable(String),
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::NotFound(_) => Self::NotFound(error.to_string()),
            ServiceError::Unauthorized(_) => Self::Unauthorized(error.to_string()),
            ServiceError::InvalidTransition(_)
            | ServiceError::Validation(_)
            | ServiceError::UpstreamGateway(_) => Self::BadRequest(error.to_string()),
            ServiceError::Storage(StorageError::CapacityExceeded) => {
                Self::Unavailable(error.to_string())
            }
            ServiceError::Storage(_)
            | ServiceError::Connection(_)
            | ServiceError::Config(_)
            | ServiceError::Internal(_) => Self::Internal(error.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::UpgradeRequired(msg) => (StatusCode::UPGRADE_REQUIRED, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(msg) => {
                warn!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(ApiResponse::error(error_message))).into_response()
    }
}

/// Start the REST API server and run until `shutdown` resolves
pub async fn start_server(
    state: ApiState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse::<SocketAddr>()
        .context("Invalid server address")?;

    let forwarder = state.hub.spawn_status_forwarder();
    let app = create_router(state);

    info!("Starting REST API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    forwarder.abort();
    Ok(())
}
