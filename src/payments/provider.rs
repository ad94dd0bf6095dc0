use crate::payments::error::PaymentResult;
use crate::payments::types::{CreatePaymentRequest, CreatedPayment, PaymentDetails};
use async_trait::async_trait;

/// Seam to the external wallet provider. The storefront talks to exactly one
/// gateway today, but the reconciler and checkout flow only see this trait so
/// tests can script the remote side.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a payment request (QR code) for an order.
    async fn create_payment(&self, request: CreatePaymentRequest) -> PaymentResult<CreatedPayment>;

    /// Fetch the current remote status of a payment by its merchant-side
    /// reference. One bounded round trip; callers decide how to absorb
    /// failures.
    async fn payment_details(&self, merchant_payment_id: &str) -> PaymentResult<PaymentDetails>;

    /// Cancel a payment that has not completed.
    async fn cancel_payment(&self, merchant_payment_id: &str) -> PaymentResult<()>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{GatewayStatus, Money};

    struct StubProvider;

    #[async_trait]
    impl PaymentProvider for StubProvider {
        async fn create_payment(
            &self,
            request: CreatePaymentRequest,
        ) -> PaymentResult<CreatedPayment> {
            Ok(CreatedPayment {
                payment_id: "stub_pay_1".to_string(),
                merchant_payment_id: request.merchant_payment_id,
                status: GatewayStatus::Created,
                qr_url: Some("https://example.com/qr".to_string()),
                deeplink: None,
                web_payment_url: None,
                raw: serde_json::json!({}),
            })
        }

        async fn payment_details(
            &self,
            merchant_payment_id: &str,
        ) -> PaymentResult<PaymentDetails> {
            Ok(PaymentDetails {
                payment_id: Some("stub_pay_1".to_string()),
                merchant_payment_id: merchant_payment_id.to_string(),
                status: GatewayStatus::Completed,
                raw: serde_json::json!({}),
            })
        }

        async fn cancel_payment(&self, _merchant_payment_id: &str) -> PaymentResult<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_stub_provider() {
        let provider: Box<dyn PaymentProvider> = Box::new(StubProvider);
        let created = provider
            .create_payment(CreatePaymentRequest {
                merchant_payment_id: "42".to_string(),
                amount: Money::jpy(600),
                order_description: "Order 42".to_string(),
                redirect_url: "https://example.com/payment/success".to_string(),
                user_agent: None,
                webhook_url: None,
            })
            .await
            .expect("create should succeed");
        assert_eq!(created.merchant_payment_id, "42");
        assert_eq!(created.status, GatewayStatus::Created);

        let details = provider
            .payment_details("42")
            .await
            .expect("details should succeed");
        assert_eq!(details.status, GatewayStatus::Completed);
    }
}
