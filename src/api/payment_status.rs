use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::info;

use crate::error::AppError;
use crate::services::reconciler::{PaymentReconciler, ReconcileError, StatusCheck};

/// State for the payment-status endpoints
#[derive(Clone)]
pub struct PaymentStatusState {
    pub reconciler: Arc<PaymentReconciler>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusQuery {
    #[serde(rename = "orderId")]
    pub order_id: Option<String>,
}

/// GET /api/payment-status?orderId=<id>
///
/// Client-driven poll. Periodic polling lives entirely on the client side;
/// each call here is one self-contained observation.
pub async fn check_payment_status(
    State(state): State<PaymentStatusState>,
    Query(query): Query<PaymentStatusQuery>,
) -> Response {
    let Some(raw_id) = query.order_id else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing orderId parameter"})),
        )
            .into_response();
    };
    let Ok(order_id) = raw_id.parse::<i64>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid orderId format"})),
        )
            .into_response();
    };

    match state.reconciler.check_by_poll(order_id).await {
        Ok(check) => (StatusCode::OK, Json(status_check_body(&check))).into_response(),
        Err(err) => reconcile_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentActionRequest {
    #[serde(rename = "orderId", default)]
    pub order_id: Option<JsonValue>,
    #[serde(default)]
    pub action: Option<String>,
}

/// POST /api/payment-status
///
/// Manual payment actions for support flows. Only `force_complete` exists.
pub async fn payment_status_action(
    State(state): State<PaymentStatusState>,
    Json(body): Json<PaymentActionRequest>,
) -> Response {
    let Some(order_id) = body.order_id.as_ref().and_then(parse_order_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing orderId"})),
        )
            .into_response();
    };
    let Some(action) = body.action.as_deref().filter(|a| !a.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing action"})),
        )
            .into_response();
    };

    if action != "force_complete" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid action"})),
        )
            .into_response();
    }

    info!(order_id, action, "manual payment action");
    match state.reconciler.force_complete(order_id).await {
        Ok(check) => {
            let mut response = status_check_body(&check);
            if let Some(method) = &check.payment_method {
                response["method"] = json!(method);
            }
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => reconcile_error_response(err),
    }
}

fn parse_order_id(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn status_check_body(check: &StatusCheck) -> JsonValue {
    let mut body = json!({
        "status": check.status.as_str(),
        "orderId": check.order_id,
        "message": check.message,
        "source": check.source.as_str(),
    });
    if let Some(gateway_status) = &check.gateway_status {
        body["paypayStatus"] = json!(gateway_status);
    }
    if let Some(count) = check.consecutive_errors {
        body["consecutiveErrors"] = json!(count);
    }
    body
}

/// Poll and override errors share a response shape: 404s carry the
/// `not_found` status marker the storefront polls against, everything else
/// goes through the standard error envelope.
fn reconcile_error_response(err: ReconcileError) -> Response {
    match err {
        ReconcileError::OrderNotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "not_found", "message": "Order not found"})),
        )
            .into_response(),
        ReconcileError::MalformedPayload(reason) => {
            (StatusCode::BAD_REQUEST, Json(json!({"error": reason}))).into_response()
        }
        ReconcileError::Storage(db) => AppError::from(db).into_response(),
    }
}
