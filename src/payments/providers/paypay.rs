use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    CreatePaymentRequest, CreatedPayment, GatewayStatus, PaymentDetails,
};
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, Clone)]
pub struct PayPayConfig {
    pub api_key: String,
    pub api_secret: String,
    pub merchant_id: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for PayPayConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            merchant_id: String::new(),
            base_url: "https://stg-api.sandbox.paypay.ne.jp".to_string(),
            timeout_secs: 30,
        }
    }
}

impl PayPayConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let api_key =
            std::env::var("PAYPAY_API_KEY").map_err(|_| PaymentError::ValidationError {
                message: "PAYPAY_API_KEY environment variable is required".to_string(),
                field: Some("PAYPAY_API_KEY".to_string()),
            })?;
        let api_secret =
            std::env::var("PAYPAY_API_SECRET").map_err(|_| PaymentError::ValidationError {
                message: "PAYPAY_API_SECRET environment variable is required".to_string(),
                field: Some("PAYPAY_API_SECRET".to_string()),
            })?;
        let merchant_id =
            std::env::var("PAYPAY_MERCHANT_ID").map_err(|_| PaymentError::ValidationError {
                message: "PAYPAY_MERCHANT_ID environment variable is required".to_string(),
                field: Some("PAYPAY_MERCHANT_ID".to_string()),
            })?;

        Ok(Self {
            api_key,
            api_secret,
            merchant_id,
            base_url: std::env::var("PAYPAY_BASE_URL")
                .unwrap_or_else(|_| "https://stg-api.sandbox.paypay.ne.jp".to_string()),
            timeout_secs: std::env::var("PAYPAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
        })
    }
}

/// Client for the PayPay Open Payment API (QR-code payments).
pub struct PayPayProvider {
    config: PayPayConfig,
    http: PaymentHttpClient,
}

impl PayPayProvider {
    pub fn new(config: PayPayConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(PayPayConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Build the `hmac OPA-Auth` authorization header. The signature covers
    /// path, method, nonce, epoch, content type and the Base64 MD5 digest of
    /// the body; empty bodies sign the literal `empty` per the OPA scheme.
    fn auth_header(&self, method: &str, path: &str, body: Option<&str>) -> PaymentResult<String> {
        let nonce: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let epoch = chrono::Utc::now().timestamp().to_string();

        let (content_type, payload_digest) = match body {
            Some(raw) if !raw.is_empty() => {
                let mut hasher = Md5::new();
                hasher.update(CONTENT_TYPE_JSON.as_bytes());
                hasher.update(raw.as_bytes());
                (CONTENT_TYPE_JSON, BASE64.encode(hasher.finalize()))
            }
            _ => ("empty", "empty".to_string()),
        };

        let signed_data = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            path, method, nonce, epoch, content_type, payload_digest
        );
        let mut mac = Hmac::<Sha256>::new_from_slice(self.config.api_secret.as_bytes()).map_err(
            |_| PaymentError::ValidationError {
                message: "invalid PayPay API secret".to_string(),
                field: Some("PAYPAY_API_SECRET".to_string()),
            },
        )?;
        mac.update(signed_data.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        Ok(format!(
            "hmac OPA-Auth:{}:{}:{}:{}:{}",
            self.config.api_key, signature, nonce, epoch, payload_digest
        ))
    }

    async fn get_envelope(&self, path: &str) -> PaymentResult<PayPayEnvelope> {
        let auth = self.auth_header("GET", path, None)?;
        let headers = [
            ("Authorization", auth.as_str()),
            ("X-ASSUME-MERCHANT", self.config.merchant_id.as_str()),
        ];
        self.http
            .request_json(reqwest::Method::GET, &self.endpoint(path), &headers, None)
            .await
    }

    fn details_from_envelope(
        &self,
        merchant_payment_id: &str,
        envelope: PayPayEnvelope,
    ) -> PaymentResult<PaymentDetails> {
        let raw = envelope.data.clone().unwrap_or(JsonValue::Null);
        let data = envelope.payment_data()?;
        let status = data
            .status
            .as_deref()
            .map(GatewayStatus::from_code)
            .unwrap_or(GatewayStatus::Other(String::new()));

        Ok(PaymentDetails {
            payment_id: data.payment_id,
            merchant_payment_id: merchant_payment_id.to_string(),
            status,
            raw,
        })
    }
}

#[async_trait]
impl PaymentProvider for PayPayProvider {
    async fn create_payment(&self, request: CreatePaymentRequest) -> PaymentResult<CreatedPayment> {
        request.amount.validate_positive("amount")?;

        let mut payload = serde_json::json!({
            "merchantPaymentId": request.merchant_payment_id,
            "amount": {
                "amount": request.amount.amount,
                "currency": request.amount.currency,
            },
            "codeType": "ORDER_QR",
            "orderDescription": request.order_description,
            "isAuthorization": false,
            "redirectUrl": request.redirect_url,
            "redirectType": "WEB_LINK",
        });
        if let Some(user_agent) = &request.user_agent {
            payload["userAgent"] = JsonValue::String(user_agent.clone());
        }
        if let Some(webhook_url) = &request.webhook_url {
            payload["webhookUrl"] = JsonValue::String(webhook_url.clone());
        }

        let body = payload.to_string();
        let auth = self.auth_header("POST", "/v2/codes", Some(&body))?;
        let headers = [
            ("Authorization", auth.as_str()),
            ("X-ASSUME-MERCHANT", self.config.merchant_id.as_str()),
            ("Content-Type", CONTENT_TYPE_JSON),
        ];

        let envelope: PayPayEnvelope = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/v2/codes"),
                &headers,
                Some(&payload),
            )
            .await?;

        if envelope.result_info.code != "SUCCESS" {
            return Err(envelope.result_info.into_error());
        }

        let raw = envelope.data.clone().unwrap_or(JsonValue::Null);
        let data = envelope.payment_data()?;
        let payment_id = data.payment_id.ok_or_else(|| PaymentError::ProviderError {
            provider: "paypay".to_string(),
            message: "create payment response is missing paymentId".to_string(),
            provider_code: None,
            retryable: false,
        })?;
        info!(
            merchant_payment_id = %request.merchant_payment_id,
            payment_id = %payment_id,
            "paypay payment created"
        );

        Ok(CreatedPayment {
            payment_id,
            merchant_payment_id: request.merchant_payment_id,
            status: data
                .status
                .as_deref()
                .map(GatewayStatus::from_code)
                .unwrap_or(GatewayStatus::Created),
            qr_url: data.url,
            deeplink: data.deeplink,
            web_payment_url: data.web_payment_url,
            raw,
        })
    }

    async fn payment_details(&self, merchant_payment_id: &str) -> PaymentResult<PaymentDetails> {
        // A QR code that has not been scanned yet only exists on the codes
        // endpoint; once the user pays, the record moves to the payments
        // ledger and the codes lookup reports DYNAMIC_QR_PAYMENT_NOT_FOUND.
        let code_path = format!("/v2/codes/payments/{}", merchant_payment_id);
        let envelope = self.get_envelope(&code_path).await?;

        let code = envelope.result_info.code.clone();
        match code.as_str() {
            "SUCCESS" => self.details_from_envelope(merchant_payment_id, envelope),
            "DYNAMIC_QR_PAYMENT_NOT_FOUND" => {
                debug!(
                    merchant_payment_id = %merchant_payment_id,
                    "QR code consumed, falling back to payment ledger lookup"
                );
                let payment_path = format!("/v2/payments/{}", merchant_payment_id);
                let envelope = self.get_envelope(&payment_path).await?;
                if envelope.result_info.code == "SUCCESS" {
                    self.details_from_envelope(merchant_payment_id, envelope)
                } else {
                    Err(envelope.result_info.into_error())
                }
            }
            _ => Err(envelope.result_info.into_error()),
        }
    }

    async fn cancel_payment(&self, merchant_payment_id: &str) -> PaymentResult<()> {
        let path = format!("/v2/payments/{}", merchant_payment_id);
        let auth = self.auth_header("DELETE", &path, None)?;
        let headers = [
            ("Authorization", auth.as_str()),
            ("X-ASSUME-MERCHANT", self.config.merchant_id.as_str()),
        ];
        let envelope: PayPayEnvelope = self
            .http
            .request_json(reqwest::Method::DELETE, &self.endpoint(&path), &headers, None)
            .await?;

        let code = envelope.result_info.code.clone();
        match code.as_str() {
            "SUCCESS" | "REQUEST_ACCEPTED" => Ok(()),
            _ => Err(envelope.result_info.into_error()),
        }
    }

    fn name(&self) -> &'static str {
        "paypay"
    }
}

/// Every OPA response wraps its payload in `resultInfo` + `data`.
#[derive(Debug, Deserialize)]
struct PayPayEnvelope {
    #[serde(rename = "resultInfo")]
    result_info: ResultInfo,
    #[serde(default)]
    data: Option<JsonValue>,
}

impl PayPayEnvelope {
    fn payment_data(self) -> PaymentResult<PaymentData> {
        match self.data {
            Some(value) => {
                serde_json::from_value(value).map_err(|e| PaymentError::ProviderError {
                    provider: "paypay".to_string(),
                    message: format!("unexpected payment data shape: {}", e),
                    provider_code: None,
                    retryable: false,
                })
            }
            None => Ok(PaymentData::default()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    code: String,
    message: String,
    #[serde(rename = "codeId", default)]
    code_id: Option<String>,
}

impl ResultInfo {
    fn into_error(self) -> PaymentError {
        PaymentError::ProviderError {
            provider: "paypay".to_string(),
            message: self.message,
            provider_code: Some(self.code),
            retryable: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentData {
    #[serde(default)]
    payment_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    merchant_payment_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    deeplink: Option<String>,
    #[serde(default)]
    web_payment_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> PayPayProvider {
        PayPayProvider::new(PayPayConfig {
            api_key: "key_test".to_string(),
            api_secret: "secret_test".to_string(),
            merchant_id: "merchant_test".to_string(),
            base_url: "https://stg-api.sandbox.paypay.ne.jp".to_string(),
            timeout_secs: 5,
        })
        .expect("provider init should succeed")
    }

    #[test]
    fn auth_header_has_opa_shape() {
        let provider = provider();
        let header = provider
            .auth_header("GET", "/v2/payments/42", None)
            .expect("header should build");
        assert!(header.starts_with("hmac OPA-Auth:key_test:"));
        // key id, signature, nonce, epoch, digest
        let parts: Vec<&str> = header.trim_start_matches("hmac OPA-Auth:").split(':').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[4], "empty");
    }

    #[test]
    fn auth_header_digests_request_body() {
        let provider = provider();
        let header = provider
            .auth_header("POST", "/v2/codes", Some(r#"{"merchantPaymentId":"42"}"#))
            .expect("header should build");
        let parts: Vec<&str> = header.trim_start_matches("hmac OPA-Auth:").split(':').collect();
        assert_eq!(parts.len(), 5);
        assert_ne!(parts[4], "empty");
    }

    #[test]
    fn envelope_deserializes_success_response() {
        let body = serde_json::json!({
            "resultInfo": {"code": "SUCCESS", "message": "Success", "codeId": "08100001"},
            "data": {
                "paymentId": "paypay_1234",
                "status": "COMPLETED",
                "merchantPaymentId": "102",
                "webPaymentUrl": "https://pay.example/w/abc"
            }
        });
        let envelope: PayPayEnvelope =
            serde_json::from_value(body).expect("envelope should parse");
        assert_eq!(envelope.result_info.code, "SUCCESS");
        assert_eq!(envelope.result_info.code_id.as_deref(), Some("08100001"));
        let data = envelope.payment_data().expect("data should parse");
        assert_eq!(data.payment_id.as_deref(), Some("paypay_1234"));
        assert_eq!(data.status.as_deref(), Some("COMPLETED"));
        assert_eq!(data.merchant_payment_id.as_deref(), Some("102"));
    }

    #[test]
    fn non_success_result_maps_to_provider_error() {
        let result = ResultInfo {
            code: "DYNAMIC_QR_PAYMENT_NOT_FOUND".to_string(),
            message: "Dynamic QR payment not found".to_string(),
            code_id: None,
        };
        match result.into_error() {
            PaymentError::ProviderError {
                provider,
                provider_code,
                retryable,
                ..
            } => {
                assert_eq!(provider, "paypay");
                assert_eq!(
                    provider_code.as_deref(),
                    Some("DYNAMIC_QR_PAYMENT_NOT_FOUND")
                );
                assert!(!retryable);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
