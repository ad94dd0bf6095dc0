use crate::database::error::DatabaseError;
use crate::database::order_repository::OrderStatus;
use crate::database::store::OrderStore;
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{GatewayStatus, WebhookNotification};
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Remote queries for one payment reference are suppressed after this many
/// consecutive gateway failures; the order then settles via webhooks only.
pub const MAX_CONSECUTIVE_GATEWAY_ERRORS: i32 = 3;

/// Translate a remote gateway code into the stored status vocabulary.
///
/// This is the single mapping applied by both the webhook and the polling
/// path. Codes outside the recognized set (including `CREATED`, `PENDING`
/// and anything unrecognized) read as `pending`.
pub fn map_gateway_status(status: &GatewayStatus) -> OrderStatus {
    match status {
        GatewayStatus::Completed => OrderStatus::Completed,
        GatewayStatus::Failed | GatewayStatus::Canceled => OrderStatus::Failed,
        GatewayStatus::Authorized => OrderStatus::Authorized,
        _ => OrderStatus::Pending,
    }
}

/// Where a reported status came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    /// Stored status returned on the terminal fast path.
    Database,
    /// Stored status returned without a gateway call (circuit open, or no
    /// gateway reference on file).
    DatabaseOnly,
    /// Live gateway answer.
    Gateway,
    /// Gateway call failed; stored status returned instead.
    DatabaseFallback,
    /// Operator override.
    ManualOverride,
}

impl StatusSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusSource::Database => "database",
            StatusSource::DatabaseOnly => "database_only",
            StatusSource::Gateway => "paypay_api",
            StatusSource::DatabaseFallback => "database_fallback",
            StatusSource::ManualOverride => "manual_force_complete",
        }
    }
}

impl fmt::Display for StatusSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one poll or override observation.
#[derive(Debug, Clone)]
pub struct StatusCheck {
    pub order_id: i64,
    pub status: OrderStatus,
    pub source: StatusSource,
    pub message: String,
    pub payment_method: Option<String>,
    pub gateway_status: Option<String>,
    pub consecutive_errors: Option<i32>,
}

/// Outcome of one webhook observation.
#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    pub order_id: i64,
    pub status: OrderStatus,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("order {0} not found")]
    OrderNotFound(i64),

    #[error("{0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Aligns stored settlement state with the gateway's across three triggers:
/// client polls, inbound webhooks, and manual operator overrides.
///
/// Stateless per observation. The two status writes (order row first,
/// payment record second) are not wrapped in a transaction; concurrent
/// observations of the same order race last-writer-wins.
pub struct PaymentReconciler {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentProvider>,
}

impl PaymentReconciler {
    pub fn new(store: Arc<dyn OrderStore>, gateway: Arc<dyn PaymentProvider>) -> Self {
        Self { store, gateway }
    }

    /// Client-initiated poll. Gateway failures are absorbed into a fallback
    /// result, never surfaced as errors.
    pub async fn check_by_poll(&self, order_id: i64) -> Result<StatusCheck, ReconcileError> {
        let details = self
            .store
            .order_with_payments(order_id)
            .await?
            .ok_or(ReconcileError::OrderNotFound(order_id))?;
        let stored = details.order.status();

        // A completed order is authoritative; skip the remote query.
        if stored == OrderStatus::Completed {
            return Ok(StatusCheck {
                order_id,
                status: stored,
                source: StatusSource::Database,
                message: "Payment already completed".to_string(),
                payment_method: None,
                gateway_status: None,
                consecutive_errors: None,
            });
        }

        let Some(payment) = details.first_payment() else {
            return Ok(StatusCheck {
                order_id,
                status: stored,
                source: StatusSource::DatabaseOnly,
                message: format!("Payment status: {}", stored),
                payment_method: None,
                gateway_status: None,
                consecutive_errors: None,
            });
        };

        if payment.consecutive_api_errors >= MAX_CONSECUTIVE_GATEWAY_ERRORS {
            warn!(
                order_id,
                consecutive_errors = payment.consecutive_api_errors,
                "skipping gateway call, relying on webhook updates"
            );
            return Ok(StatusCheck {
                order_id,
                status: stored,
                source: StatusSource::DatabaseOnly,
                message: "Payment pending - monitoring via webhooks".to_string(),
                payment_method: None,
                gateway_status: None,
                consecutive_errors: Some(payment.consecutive_api_errors),
            });
        }

        let is_gateway_payment =
            details.order.payment_method.as_deref() == Some(self.gateway.name());
        let Some(reference) = payment
            .payment_provider_id
            .clone()
            .filter(|_| is_gateway_payment)
        else {
            return Ok(StatusCheck {
                order_id,
                status: stored,
                source: StatusSource::DatabaseOnly,
                message: format!("Payment status: {}", stored),
                payment_method: None,
                gateway_status: None,
                consecutive_errors: None,
            });
        };

        match self.gateway.payment_details(&reference).await {
            Ok(remote) => {
                // A successful call is evidence of gateway health even when
                // nothing changed.
                self.store.reset_gateway_errors(payment.id).await?;

                let mapped = map_gateway_status(&remote.status);
                let gateway_code = remote.status.as_code().to_string();

                if mapped != stored && !stored.is_terminal() {
                    info!(
                        order_id,
                        from = %stored,
                        to = %mapped,
                        gateway_status = %gateway_code,
                        "payment status changed"
                    );
                    // Order row first, payment record second.
                    self.store
                        .set_order_status(
                            order_id,
                            mapped,
                            Some(&reference),
                            details.order.payment_method.as_deref(),
                            Some(details.order.total_amount),
                        )
                        .await?;
                    self.store
                        .set_payment_status(
                            payment.id,
                            mapped,
                            None,
                            json!({
                                "gateway_status": gateway_code,
                                "checked_at": Utc::now().to_rfc3339(),
                            }),
                        )
                        .await?;

                    return Ok(StatusCheck {
                        order_id,
                        status: mapped,
                        source: StatusSource::Gateway,
                        message: format!("Payment status updated to {}", mapped),
                        payment_method: None,
                        gateway_status: Some(gateway_code),
                        consecutive_errors: None,
                    });
                }

                Ok(StatusCheck {
                    order_id,
                    status: stored,
                    source: StatusSource::Gateway,
                    message: format!("Payment status: {}", stored),
                    payment_method: None,
                    gateway_status: Some(gateway_code),
                    consecutive_errors: None,
                })
            }
            Err(err) => {
                warn!(
                    order_id,
                    error = %err,
                    "gateway status check failed, falling back to stored status"
                );
                let count = self
                    .store
                    .bump_gateway_errors(payment.id, &err.to_string())
                    .await?;
                Ok(StatusCheck {
                    order_id,
                    status: stored,
                    source: StatusSource::DatabaseFallback,
                    message: format!("Payment status: {} (gateway check failed)", stored),
                    payment_method: None,
                    gateway_status: None,
                    consecutive_errors: Some(count),
                })
            }
        }
    }

    /// Inbound webhook notification. The payload is trusted as the
    /// authoritative push from the gateway; no remote query is made. Safe to
    /// replay: the same payload applied twice leaves the order in the same
    /// state.
    pub async fn apply_webhook(
        &self,
        payload: &JsonValue,
    ) -> Result<WebhookOutcome, ReconcileError> {
        let notification = WebhookNotification::parse(payload).map_err(|e| {
            ReconcileError::MalformedPayload(format!("Invalid webhook payload: {}", e))
        })?;

        let reference = notification
            .merchant_order_id
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                ReconcileError::MalformedPayload("Missing merchant_order_id".to_string())
            })?;
        let order_id: i64 = reference.parse().map_err(|_| {
            ReconcileError::MalformedPayload("Invalid merchant_order_id format".to_string())
        })?;

        let details = self
            .store
            .order_with_payments(order_id)
            .await?
            .ok_or(ReconcileError::OrderNotFound(order_id))?;
        let stored = details.order.status();
        let mapped = map_gateway_status(&notification.gateway_status());

        // Terminal states stick; a late or replayed notification cannot
        // demote them.
        let next = if stored.is_terminal() { stored } else { mapped };

        let provider_payment_id = notification
            .order_id
            .clone()
            .unwrap_or_else(|| reference.to_string());
        let amount = notification.order_amount.unwrap_or(details.order.total_amount);

        if !stored.is_terminal() {
            self.store
                .set_order_status(
                    order_id,
                    next,
                    Some(&provider_payment_id),
                    Some(self.gateway.name()),
                    Some(amount),
                )
                .await?;
        }

        // The raw payload lands in the audit blob even when nothing changed.
        // The record keeps the merchant-side reference used for polling; the
        // gateway's own ids are only carried in the audit payload.
        if let Some(payment) = details.first_payment() {
            self.store
                .set_payment_status(
                    payment.id,
                    next,
                    None,
                    json!({
                        "webhook_data": payload,
                        "updated_at": Utc::now().to_rfc3339(),
                    }),
                )
                .await?;
        }

        info!(order_id, status = %next, state = ?notification.state, "webhook processed");
        Ok(WebhookOutcome {
            order_id,
            status: next,
        })
    }

    /// Operator override: set both rows to `completed` unconditionally,
    /// bypassing the transition policy. For support flows when the gateway
    /// is unreachable or inconsistent.
    pub async fn force_complete(&self, order_id: i64) -> Result<StatusCheck, ReconcileError> {
        let details = self
            .store
            .order_with_payments(order_id)
            .await?
            .ok_or(ReconcileError::OrderNotFound(order_id))?;

        info!(order_id, "force completing payment");
        self.store
            .set_order_status(
                order_id,
                OrderStatus::Completed,
                Some("manual_force_complete"),
                details
                    .order
                    .payment_method
                    .as_deref()
                    .or(Some(self.gateway.name())),
                Some(details.order.total_amount),
            )
            .await?;

        if let Some(payment) = details.first_payment() {
            self.store
                .set_payment_status(
                    payment.id,
                    OrderStatus::Completed,
                    None,
                    json!({
                        "manual_force_complete": true,
                        "force_completed_at": Utc::now().to_rfc3339(),
                        "source": StatusSource::ManualOverride.as_str(),
                    }),
                )
                .await?;
        }

        let method = details
            .order
            .payment_method
            .clone()
            .unwrap_or_else(|| self.gateway.name().to_string());
        Ok(StatusCheck {
            order_id,
            status: OrderStatus::Completed,
            source: StatusSource::ManualOverride,
            message: "Payment manually completed".to_string(),
            payment_method: Some(method),
            gateway_status: None,
            consecutive_errors: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_codes_map_to_their_statuses() {
        assert_eq!(
            map_gateway_status(&GatewayStatus::Completed),
            OrderStatus::Completed
        );
        assert_eq!(
            map_gateway_status(&GatewayStatus::Failed),
            OrderStatus::Failed
        );
        assert_eq!(
            map_gateway_status(&GatewayStatus::Canceled),
            OrderStatus::Failed
        );
        assert_eq!(
            map_gateway_status(&GatewayStatus::Authorized),
            OrderStatus::Authorized
        );
    }

    #[test]
    fn everything_else_maps_to_pending() {
        for status in [
            GatewayStatus::Created,
            GatewayStatus::Pending,
            GatewayStatus::Expired,
            GatewayStatus::Other("REFUNDED".to_string()),
            GatewayStatus::Other(String::new()),
        ] {
            assert_eq!(map_gateway_status(&status), OrderStatus::Pending);
        }
    }

    #[test]
    fn source_tags_match_the_api_contract() {
        assert_eq!(StatusSource::Database.as_str(), "database");
        assert_eq!(StatusSource::DatabaseOnly.as_str(), "database_only");
        assert_eq!(StatusSource::Gateway.as_str(), "paypay_api");
        assert_eq!(StatusSource::DatabaseFallback.as_str(), "database_fallback");
        assert_eq!(
            StatusSource::ManualOverride.as_str(),
            "manual_force_complete"
        );
    }
}
