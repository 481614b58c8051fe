// src/payments/paystack.rs - Paystack Gateway
//! Paystack transaction API client
//!
//! Every response is wrapped in `{status, message, data}`. A non-2xx reply or
//! `status: false` is reported as [`ServiceError::UpstreamGateway`] carrying
//! the provider message.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{core::types::Amount, ServiceError, ServiceResult};

use super::{ChargeRequest, PaymentGateway, PaymentInit, PaymentVerification};

/// Request timeout for provider calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: Amount,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    metadata: Metadata,
}

#[derive(Debug, Serialize)]
struct Metadata {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    reference: String,
    amount: Amount,
    #[serde(default)]
    paid_at: Option<String>,
}

/// Paystack gateway
#[derive(Debug, Clone)]
pub struct PaystackGateway {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl PaystackGateway {
    /// Create a gateway against `base_url`, e.g. `https://api.paystack.co`
    pub fn new(base_url: &str, secret_key: &str) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    async fn parse<T: DeserializeOwned>(response: Response, action: &str) -> ServiceResult<T> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::UpstreamGateway(format!("Failed to {action} payment: {e}")))?;
        Self::parse_text(status, &text, action)
    }

    fn parse_text<T: DeserializeOwned>(
        status: StatusCode,
        text: &str,
        action: &str,
    ) -> ServiceResult<T> {
        let envelope = serde_json::from_str::<Envelope<T>>(text);

        if !status.is_success() {
            let message = envelope
                .ok()
                .map(|body| body.message)
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| format!("Failed to {action} payment"));
            warn!("Paystack {} failed with {}: {}", action, status, message);
            return Err(ServiceError::UpstreamGateway(message));
        }

        let envelope = envelope.map_err(|e| {
            ServiceError::UpstreamGateway(format!("Unexpected {action} response: {e}"))
        })?;

        if !envelope.status {
            let message = if envelope.message.is_empty() {
                format!("Payment {action} failed")
            } else {
                envelope.message
            };
            return Err(ServiceError::UpstreamGateway(message));
        }

        envelope
            .data
            .ok_or_else(|| ServiceError::UpstreamGateway(format!("Empty {action} response")))
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    fn name(&self) -> &'static str {
        "paystack"
    }

    async fn initialize(&self, charge: &ChargeRequest) -> ServiceResult<PaymentInit> {
        let body = InitializeBody {
            email: &charge.email,
            amount: charge.amount,
            reference: &charge.reference,
            callback_url: charge.callback_url.as_deref(),
            metadata: Metadata {
                order_id: charge.order_id.to_string(),
            },
        };

        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamGateway(format!("Failed to initialize payment: {e}")))?;

        let data: InitializeData = Self::parse(response, "initialize").await?;
        debug!("Paystack checkout created for {}", data.reference);

        Ok(PaymentInit {
            authorization_url: data.authorization_url,
            access_code: data.access_code,
            reference: data.reference,
        })
    }

    async fn verify(&self, reference: &str) -> ServiceResult<PaymentVerification> {
        let response = self
            .client
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamGateway(format!("Failed to verify payment: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::UpstreamGateway(format!("Failed to verify payment: {e}")))?;
        let message = serde_json::from_str::<Envelope<serde_json::Value>>(&text)
            .map(|envelope| envelope.message)
            .unwrap_or_default();

        let data: VerifyData = Self::parse_text(status, &text, "verify")?;

        Ok(PaymentVerification {
            status: data.status,
            message,
            reference: data.reference,
            amount: data.amount,
            paid_at: data
                .paid_at
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|at| at.with_timezone(&Utc)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn charge() -> ChargeRequest {
        ChargeRequest {
            order_id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            amount: 4500,
            reference: "chipchop_0123456789ab".to_string(),
            callback_url: Some("https://chipchop.example/paid".to_string()),
        }
    }

    #[tokio::test]
    async fn test_initialize_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .and(header("authorization", "Bearer sk_test_123"))
            .and(body_partial_json(serde_json::json!({
                "email": "ada@example.com",
                "amount": 4500,
                "reference": "chipchop_0123456789ab"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/abc",
                    "access_code": "abc",
                    "reference": "chipchop_0123456789ab"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = PaystackGateway::new(&server.uri(), "sk_test_123").unwrap();
        let init = gateway.initialize(&charge()).await.unwrap();

        assert_eq!(init.authorization_url, "https://checkout.paystack.com/abc");
        assert_eq!(init.access_code, "abc");
        assert_eq!(init.reference, "chipchop_0123456789ab");
    }

    #[tokio::test]
    async fn test_initialize_rejected_by_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "status": false,
                "message": "Invalid key"
            })))
            .mount(&server)
            .await;

        let gateway = PaystackGateway::new(&server.uri(), "sk_bad").unwrap();
        match gateway.initialize(&charge()).await {
            Err(ServiceError::UpstreamGateway(message)) => assert_eq!(message, "Invalid key"),
            other => panic!("expected gateway error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_false_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": false,
                "message": "Duplicate Transaction Reference"
            })))
            .mount(&server)
            .await;

        let gateway = PaystackGateway::new(&server.uri(), "sk_test_123").unwrap();
        match gateway.initialize(&charge()).await {
            Err(ServiceError::UpstreamGateway(message)) => {
                assert_eq!(message, "Duplicate Transaction Reference");
            }
            other => panic!("expected gateway error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transaction/verify/chipchop_0123456789ab"))
            .and(header("authorization", "Bearer sk_test_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": true,
                "message": "Verification successful",
                "data": {
                    "status": "success",
                    "reference": "chipchop_0123456789ab",
                    "amount": 4500,
                    "paid_at": "2024-01-01T12:00:00.000Z"
                }
            })))
            .mount(&server)
            .await;

        let gateway = PaystackGateway::new(&server.uri(), "sk_test_123").unwrap();
        let verification = gateway.verify("chipchop_0123456789ab").await.unwrap();

        assert!(verification.is_success());
        assert_eq!(verification.message, "Verification successful");
        assert_eq!(verification.amount, 4500);
        assert_eq!(
            verification.paid_at.map(|at| at.to_rfc3339()),
            Some("2024-01-01T12:00:00+00:00".to_string())
        );
    }

    #[tokio::test]
    async fn test_verify_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let gateway = PaystackGateway::new(&server.uri(), "sk_test_123").unwrap();
        match gateway.verify("chipchop_0123456789ab").await {
            Err(ServiceError::UpstreamGateway(message)) => {
                assert_eq!(message, "Failed to verify payment");
            }
            other => panic!("expected gateway error, got {other:?}"),
        }
    }
}
