use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Thin JSON client for provider calls. Every call is one bounded round
/// trip; there is no retry loop here, failed calls are absorbed or surfaced
/// by the caller.
#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    timeout: Duration,
}

impl PaymentHttpClient {
    pub fn new(timeout: Duration) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self { client, timeout })
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        headers: &[(&str, &str)],
        body: Option<&JsonValue>,
    ) -> PaymentResult<T> {
        let mut request = self.client.request(method, url).timeout(self.timeout);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PaymentError::NetworkError {
                message: format!("provider request failed: {}", e),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PaymentError::ProviderError {
                provider: "http".to_string(),
                message: format!("HTTP {}: {}", status, text),
                provider_code: Some(status.as_u16().to_string()),
                retryable: status.is_server_error(),
            });
        }

        serde_json::from_str::<T>(&text).map_err(|e| PaymentError::ProviderError {
            provider: "http".to_string(),
            message: format!("invalid provider JSON response: {}", e),
            provider_code: None,
            retryable: false,
        })
    }
}
