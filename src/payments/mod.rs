// src/payments/mod.rs - Payment Integration
//! # Payment Integration
//!
//! Card payments go through a hosted checkout. The service initializes a
//! transaction for the order total, remembers the gateway reference on the
//! order, and marks the order paid when the gateway confirms the charge,
//! either through explicit verification or the provider webhook.
//!
//! Without a configured secret key the [`MockGateway`] is used.
//!
//! Webhooks are never trusted on their own. With a secret key configured the
//! body must carry a valid `x-paystack-signature` (hex HMAC-SHA512 of the raw
//! body keyed by the secret). Every `charge.success` is then re-verified with
//! the gateway, and the charged amount must equal the order total.

pub mod mock;
pub mod paystack;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    core::{
        order::PaymentStatus,
        types::{Amount, OrderId, OrderKey, Timestamp},
    },
    engine::LifecycleManager,
    PaymentConfig, ServiceError, ServiceResult,
};

pub use mock::MockGateway;
pub use paystack::PaystackGateway;

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the webhook body signature
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Length of the random part of a payment reference
const REFERENCE_RANDOM_LEN: usize = 12;

/// Provider event confirming a successful charge
pub const CHARGE_SUCCESS_EVENT: &str = "charge.success";

/// Verification status reported for a successful charge
pub const STATUS_SUCCESS: &str = "success";

/// Verification status reported for a failed charge
pub const STATUS_FAILED: &str = "failed";

/// Charge to initialize with the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    /// Order being paid
    pub order_id: OrderId,
    /// Payer email
    pub email: String,
    /// Amount in minor units
    pub amount: Amount,
    /// Our reference for the transaction
    pub reference: String,
    /// Where the checkout redirects afterwards
    pub callback_url: Option<String>,
}

/// Hosted checkout handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInit {
    /// Checkout page URL
    pub authorization_url: String,
    /// Provider access code
    pub access_code: String,
    /// Transaction reference
    pub reference: String,
}

/// Verification outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVerification {
    /// Provider transaction status, e.g. `success`
    pub status: String,
    /// Provider message
    pub message: String,
    /// Transaction reference
    pub reference: String,
    /// Amount charged in minor units
    pub amount: Amount,
    /// When the charge settled
    pub paid_at: Option<Timestamp>,
}

impl PaymentVerification {
    /// Check if the charge succeeded
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Payment initialization request from the checkout page
#[derive(Debug, Clone, Deserialize)]
pub struct InitializePaymentRequest {
    /// Order id or code
    pub order_id: String,
    /// Payer email; defaults to the delivery contact
    #[serde(default)]
    pub email: Option<String>,
    /// Where the checkout redirects afterwards
    #[serde(default)]
    pub callback_url: Option<String>,
}

/// Provider webhook body
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    /// Event name, e.g. `charge.success`
    pub event: String,
    /// Event data
    #[serde(default)]
    pub data: WebhookData,
}

/// Fields of the webhook data object used for correlation. Settlement
/// details come from gateway verification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookData {
    /// Transaction reference
    #[serde(default)]
    pub reference: Option<String>,
}

/// Payment provider
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Start a hosted checkout for the charge
    async fn initialize(&self, charge: &ChargeRequest) -> ServiceResult<PaymentInit>;

    /// Ask the provider for the outcome of a transaction
    async fn verify(&self, reference: &str) -> ServiceResult<PaymentVerification>;
}

/// Pick the gateway for the configuration
pub fn gateway_from_config(config: &PaymentConfig) -> ServiceResult<Arc<dyn PaymentGateway>> {
    match config.secret_key.as_deref().filter(|key| !key.is_empty()) {
        Some(secret_key) => Ok(Arc::new(PaystackGateway::new(
            &config.base_url,
            secret_key,
        )?)),
        None => {
            warn!("No payment secret key configured, using mock gateway");
            Ok(Arc::new(MockGateway::new()))
        }
    }
}

/// Hex HMAC-SHA512 of `body` keyed by `secret`
pub fn sign_webhook(secret: &str, body: &[u8]) -> ServiceResult<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::Internal(format!("HMAC error: {e}")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Generate a transaction reference, e.g. `chipchop_1a2b3c4d5e6f`
pub fn new_reference(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &random[..REFERENCE_RANDOM_LEN])
}

/// Correlates gateway transactions with orders
#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    lifecycle: LifecycleManager,
    reference_prefix: String,
    webhook_secret: Option<String>,
}

impl PaymentService {
    /// Create a payment service
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        lifecycle: LifecycleManager,
        config: &PaymentConfig,
    ) -> Self {
        Self {
            gateway,
            lifecycle,
            reference_prefix: config.reference_prefix.clone(),
            webhook_secret: config.secret_key.clone().filter(|key| !key.is_empty()),
        }
    }

    /// Start a checkout for the order total and remember the reference
    #[instrument(skip(self), fields(gateway = self.gateway.name()))]
    pub async fn initialize(&self, request: InitializePaymentRequest) -> ServiceResult<PaymentInit> {
        let order = self.lifecycle.get_order(&OrderKey::parse(&request.order_id)).await?;
        if order.payment_status == PaymentStatus::Completed {
            return Err(ServiceError::Validation(format!(
                "Order {} is already paid",
                order.order_code
            )));
        }

        let charge = ChargeRequest {
            order_id: order.id,
            email: request
                .email
                .unwrap_or_else(|| order.delivery_address.email.clone()),
            amount: order.total,
            reference: new_reference(&self.reference_prefix),
            callback_url: request.callback_url,
        };

        let init = self.gateway.initialize(&charge).await?;
        self.lifecycle
            .attach_payment_reference(&OrderKey::Id(order.id), &init.reference)
            .await?;

        info!(
            "Payment initialized for order {}: reference={} amount={}",
            order.order_code, init.reference, charge.amount
        );
        Ok(init)
    }

    /// Verify a transaction and record the outcome on its order
    #[instrument(skip(self), fields(gateway = self.gateway.name()))]
    pub async fn verify(&self, reference: &str) -> ServiceResult<PaymentVerification> {
        let verification = self.gateway.verify(reference).await?;

        let recorded = if verification.is_success() {
            let paid_at = verification.paid_at.unwrap_or_else(Utc::now);
            self.lifecycle
                .mark_paid(reference, verification.amount, paid_at)
                .await
                .map(|_| ())
        } else if verification.status == STATUS_FAILED {
            self.lifecycle.mark_payment_failed(reference).await.map(|_| ())
        } else {
            Ok(())
        };

        match recorded {
            Ok(()) => {}
            Err(ServiceError::NotFound(_)) => {
                warn!("Verified payment {} has no matching order", reference);
            }
            Err(e) => return Err(e),
        }
        Ok(verification)
    }

    /// Check the webhook signature. Without a secret key there is nothing
    /// to sign with, and only gateway re-verification protects the order.
    pub fn verify_signature(&self, body: &[u8], signature: Option<&str>) -> ServiceResult<()> {
        let Some(secret) = &self.webhook_secret else {
            return Ok(());
        };

        let unauthorized = || ServiceError::Unauthorized("Invalid webhook signature".to_string());
        let signature = signature.ok_or_else(unauthorized)?;
        let signature = hex::decode(signature.trim()).map_err(|_| unauthorized())?;

        let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
            .map_err(|e| ServiceError::Internal(format!("HMAC error: {e}")))?;
        mac.update(body);
        mac.verify_slice(&signature).map_err(|_| unauthorized())
    }

    /// Apply a provider webhook from its raw body. Unsigned or forged bodies
    /// are rejected; unknown events and references are ignored.
    #[instrument(skip(self, body, signature), fields(gateway = self.gateway.name()))]
    pub async fn handle_webhook(&self, body: &[u8], signature: Option<&str>) -> ServiceResult<()> {
        if let Err(e) = self.verify_signature(body, signature) {
            warn!("Rejecting payment webhook: {}", e);
            return Err(e);
        }

        match serde_json::from_slice::<WebhookPayload>(body) {
            Ok(payload) => self.apply_webhook(payload).await,
            Err(e) => {
                debug!("Ignoring unrecognized webhook payload: {}", e);
                Ok(())
            }
        }
    }

    async fn apply_webhook(&self, payload: WebhookPayload) -> ServiceResult<()> {
        if payload.event != CHARGE_SUCCESS_EVENT {
            debug!(event = %payload.event, "Ignoring payment webhook event");
            return Ok(());
        }

        let Some(reference) = payload.data.reference else {
            warn!("charge.success webhook without reference");
            return Ok(());
        };

        // The gateway is the source of truth for the outcome and amount
        match self.verify(&reference).await {
            Ok(verification) if verification.is_success() => {
                info!("Payment {} confirmed by webhook", reference);
                Ok(())
            }
            Ok(verification) => {
                warn!(
                    "Webhook for {} not confirmed by gateway: {}",
                    reference, verification.status
                );
                Ok(())
            }
            Err(ServiceError::Validation(reason)) => {
                warn!("Webhook payment {} rejected: {}", reference, reason);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
