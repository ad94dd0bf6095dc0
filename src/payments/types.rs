use crate::payments::error::PaymentError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Amount in integer currency units. JPY has no minor unit, so no decimal
/// handling is needed anywhere in the payment path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    pub currency: String,
}

impl Money {
    pub fn jpy(amount: i64) -> Self {
        Self {
            amount,
            currency: "JPY".to_string(),
        }
    }

    pub fn validate_positive(&self, field: &str) -> Result<(), PaymentError> {
        if self.amount <= 0 {
            return Err(PaymentError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some(field.to_string()),
            });
        }
        if self.currency.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "currency is required".to_string(),
                field: Some("currency".to_string()),
            });
        }
        Ok(())
    }
}

/// Settlement status codes as reported by the gateway. `Other` carries
/// codes outside the documented vocabulary so they can be logged verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatus {
    Created,
    Pending,
    Authorized,
    Completed,
    Failed,
    Canceled,
    Expired,
    Other(String),
}

impl GatewayStatus {
    pub fn from_code(code: &str) -> Self {
        match code {
            "CREATED" => GatewayStatus::Created,
            "PENDING" => GatewayStatus::Pending,
            "AUTHORIZED" => GatewayStatus::Authorized,
            "COMPLETED" => GatewayStatus::Completed,
            "FAILED" => GatewayStatus::Failed,
            "CANCELED" => GatewayStatus::Canceled,
            "EXPIRED" => GatewayStatus::Expired,
            other => GatewayStatus::Other(other.to_string()),
        }
    }

    pub fn as_code(&self) -> &str {
        match self {
            GatewayStatus::Created => "CREATED",
            GatewayStatus::Pending => "PENDING",
            GatewayStatus::Authorized => "AUTHORIZED",
            GatewayStatus::Completed => "COMPLETED",
            GatewayStatus::Failed => "FAILED",
            GatewayStatus::Canceled => "CANCELED",
            GatewayStatus::Expired => "EXPIRED",
            GatewayStatus::Other(code) => code,
        }
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

/// Request to create a QR-code payment at the gateway. The merchant payment
/// id is the storefront's order id rendered as a string.
#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub merchant_payment_id: String,
    pub amount: Money,
    pub order_description: String,
    pub redirect_url: String,
    pub user_agent: Option<String>,
    pub webhook_url: Option<String>,
}

/// Result of a successful create-payment call.
#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub payment_id: String,
    pub merchant_payment_id: String,
    pub status: GatewayStatus,
    pub qr_url: Option<String>,
    pub deeplink: Option<String>,
    pub web_payment_url: Option<String>,
    pub raw: JsonValue,
}

/// Current remote state of a payment.
#[derive(Debug, Clone)]
pub struct PaymentDetails {
    pub payment_id: Option<String>,
    pub merchant_payment_id: String,
    pub status: GatewayStatus,
    pub raw: JsonValue,
}

fn de_opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        JsonValue::String(s) => Some(s),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

fn de_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }))
}

/// Inbound webhook notification body.
///
/// `merchant_order_id` is the single accepted order reference: it carries the
/// storefront order id that was sent to the gateway as the merchant payment
/// id. The gateway is not consistent about number-vs-string encoding, so both
/// are accepted for the reference and amount fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookNotification {
    #[serde(default)]
    pub notification_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string_or_number")]
    pub merchant_order_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string_or_number")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub order_amount: Option<i64>,
    #[serde(default)]
    pub paid_at: Option<String>,
    #[serde(default)]
    pub authorized_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl WebhookNotification {
    pub fn parse(payload: &JsonValue) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload.clone())
    }

    /// Remote status carried by the notification; missing or unrecognized
    /// codes fall through to the default-safe mapping downstream.
    pub fn gateway_status(&self) -> GatewayStatus {
        self.state
            .as_deref()
            .map(GatewayStatus::from_code)
            .unwrap_or(GatewayStatus::Other(String::new()))
    }
}
