use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AppError;
use crate::services::reconciler::{PaymentReconciler, ReconcileError};

/// State for the webhook endpoint
#[derive(Clone)]
pub struct WebhookState {
    pub reconciler: Arc<PaymentReconciler>,
}

/// POST /api/paypay-webhook
///
/// The gateway's push notification. Always answered 200 on successful
/// processing, whatever the mapped status, so the provider stops
/// redelivering. Processing failures are not retried here; the provider's
/// own redelivery covers them.
pub async fn handle_paypay_webhook(
    State(state): State<WebhookState>,
    Json(payload): Json<JsonValue>,
) -> Response {
    info!("paypay webhook received");

    match state.reconciler.apply_webhook(&payload).await {
        Ok(outcome) => {
            info!(
                order_id = outcome.order_id,
                status = %outcome.status,
                "webhook processed successfully"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": "Webhook processed successfully",
                    "orderId": outcome.order_id,
                    "status": outcome.status.as_str(),
                })),
            )
                .into_response()
        }
        Err(ReconcileError::MalformedPayload(reason)) => {
            warn!(reason = %reason, "malformed webhook payload");
            (StatusCode::BAD_REQUEST, Json(json!({"error": reason}))).into_response()
        }
        Err(ReconcileError::OrderNotFound(order_id)) => {
            warn!(order_id, "webhook for unknown order");
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Order not found", "merchantOrderId": order_id})),
            )
                .into_response()
        }
        Err(ReconcileError::Storage(db)) => AppError::from(db).into_response(),
    }
}
