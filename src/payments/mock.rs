// src/payments/mock.rs - Mock Payment Gateway
//! Offline gateway for development and tests. Every charge succeeds.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use crate::{core::types::Amount, ServiceResult};

use super::{ChargeRequest, PaymentGateway, PaymentInit, PaymentVerification, STATUS_SUCCESS};

/// Amount reported for references this gateway never initialized
const UNKNOWN_REFERENCE_AMOUNT: Amount = 10_000;

/// Gateway that approves every transaction without network calls
#[derive(Debug, Default)]
pub struct MockGateway {
    charges: DashMap<String, Amount>,
}

impl MockGateway {
    /// Create a mock gateway
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn initialize(&self, charge: &ChargeRequest) -> ServiceResult<PaymentInit> {
        self.charges.insert(charge.reference.clone(), charge.amount);
        debug!("Mock checkout for {} ({})", charge.reference, charge.amount);

        Ok(PaymentInit {
            authorization_url: format!("https://checkout.paystack.com/mock/{}", charge.reference),
            access_code: format!("access_{}", charge.reference),
            reference: charge.reference.clone(),
        })
    }

    async fn verify(&self, reference: &str) -> ServiceResult<PaymentVerification> {
        let amount = self
            .charges
            .get(reference)
            .map_or(UNKNOWN_REFERENCE_AMOUNT, |entry| *entry.value());

        Ok(PaymentVerification {
            status: STATUS_SUCCESS.to_string(),
            message: "Payment verified (mock)".to_string(),
            reference: reference.to_string(),
            amount,
            paid_at: Some(Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_mock_checkout() {
        let gateway = MockGateway::new();
        let init = gateway
            .initialize(&ChargeRequest {
                order_id: Uuid::new_v4(),
                email: "ada@example.com".to_string(),
                amount: 4500,
                reference: "chipchop_0123456789ab".to_string(),
                callback_url: None,
            })
            .await
            .unwrap();

        assert_eq!(
            init.authorization_url,
            "https://checkout.paystack.com/mock/chipchop_0123456789ab"
        );
        assert_eq!(init.access_code, "access_chipchop_0123456789ab");

        let verification = gateway.verify(&init.reference).await.unwrap();
        assert_eq!(verification.status, "success");
        assert_eq!(verification.amount, 4500);
        assert_eq!(verification.message, "Payment verified (mock)");

        let unknown = gateway.verify("chipchop_other").await.unwrap();
        assert_eq!(unknown.amount, 10_000);
    }
}
