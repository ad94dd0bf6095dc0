use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::database::order_repository::OrderRepository;
use crate::database::payment_repository::PaymentRepository;
use crate::database::product_repository::ProductRepository;
use crate::error::AppError;

/// State for order detail reads
#[derive(Clone)]
pub struct OrderDetailsState {
    pub orders: Arc<OrderRepository>,
    pub payments: Arc<PaymentRepository>,
    pub products: Arc<ProductRepository>,
}

#[derive(Debug, Deserialize)]
pub struct OrderDetailsQuery {
    #[serde(rename = "orderId")]
    pub order_id: Option<String>,
}

/// GET /api/order-details?orderId=<id>
pub async fn order_details(
    State(state): State<OrderDetailsState>,
    Query(query): Query<OrderDetailsQuery>,
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

    let order = match state.orders.find_by_id(order_id).await {
        Ok(Some(order)) => order,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Order not found", "orderId": order_id})),
            )
                .into_response()
        }
        Err(err) => return AppError::from(err).into_response(),
    };

    let payments = match state.payments.find_by_order(order_id).await {
        Ok(payments) => payments,
        Err(err) => return AppError::from(err).into_response(),
    };
    let product = match state.products.find_by_id(order.product_id).await {
        Ok(product) => product,
        Err(err) => return AppError::from(err).into_response(),
    };

    let mut body = json!({"success": true, "order": order});
    body["order"]["product"] = json!(product);
    body["order"]["payments"] = json!(payments);
    (StatusCode::OK, Json(body)).into_response()
}
