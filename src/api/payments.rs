use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::StorefrontConfig;
use crate::database::order_repository::{NewOrder, OrderRepository};
use crate::database::payment_repository::{NewPaymentRecord, PaymentRepository};
use crate::database::product_repository::ProductRepository;
use crate::error::AppError;
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{CreatePaymentRequest, Money};

/// State for checkout initiation
#[derive(Clone)]
pub struct CheckoutState {
    pub products: Arc<ProductRepository>,
    pub orders: Arc<OrderRepository>,
    pub payments: Arc<PaymentRepository>,
    pub gateway: Arc<dyn PaymentProvider>,
    pub storefront: StorefrontConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentBody {
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub quantity: Option<i32>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// POST /api/create-payment
///
/// Creates the order, then (for wallet payments) asks the gateway for a QR
/// code and records the pending payment. The order id doubles as the
/// merchant-side payment reference everywhere downstream.
pub async fn create_payment(
    State(state): State<CheckoutState>,
    Json(body): Json<CreatePaymentBody>,
) -> Response {
    let (Some(product_id), Some(quantity)) = (body.product_id, body.quantity) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing required fields: productId and quantity"})),
        )
            .into_response();
    };
    if quantity < 1 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Quantity must be at least 1"})),
        )
            .into_response();
    }

    let product = match state.products.find_by_id(product_id).await {
        Ok(Some(product)) => product,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Product not found"})),
            )
                .into_response()
        }
        Err(err) => return AppError::from(err).into_response(),
    };

    let total_amount = product.price * i64::from(quantity);
    let order = match state
        .orders
        .create(&NewOrder {
            product_id,
            quantity,
            total_amount,
            customer_email: body.customer_email.filter(|e| !e.trim().is_empty()),
        })
        .await
    {
        Ok(order) => order,
        Err(err) => return AppError::from(err).into_response(),
    };
    info!(order_id = order.id, product_id, quantity, "order created");

    let method = body.payment_method.as_deref().unwrap_or("paypay");
    match method {
        "cod" => {
            // Cash on delivery settles offline; the order alone is enough.
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "orderId": order.id,
                    "message": "Cash on delivery order created successfully",
                })),
            )
                .into_response()
        }
        "paypay" => {
            let merchant_payment_id = order.id.to_string();
            let request = CreatePaymentRequest {
                merchant_payment_id: merchant_payment_id.clone(),
                amount: Money::jpy(order.total_amount),
                order_description: format!("Order {} - {}", order.id, product.name),
                redirect_url: state.storefront.payment_callback_url(),
                user_agent: None,
                webhook_url: Some(state.storefront.webhook_url()),
            };

            let created = match state.gateway.create_payment(request).await {
                Ok(created) => created,
                Err(err) => {
                    error!(order_id = order.id, error = %err, "gateway payment creation failed");
                    // The pending order stays behind for support follow-up.
                    return AppError::from(err).into_response();
                }
            };

            let record = NewPaymentRecord {
                order_id: order.id,
                payment_method: "paypay".to_string(),
                payment_provider_id: Some(merchant_payment_id.clone()),
                amount: order.total_amount,
                currency: "JPY".to_string(),
                provider_response: json!({
                    "paypay_payment_id": created.payment_id,
                    "qr_code_url": created.qr_url,
                    "web_payment_url": created.web_payment_url,
                    "deeplink": created.deeplink,
                    "created_at": Utc::now().to_rfc3339(),
                }),
            };
            if let Err(err) = state.payments.create(&record).await {
                return AppError::from(err).into_response();
            }

            info!(
                order_id = order.id,
                payment_id = %created.payment_id,
                "paypay payment created"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "orderId": order.id,
                    "paymentId": created.payment_id,
                    "merchantPaymentId": merchant_payment_id,
                    "qrCodeUrl": created.qr_url,
                    "webPaymentUrl": created.web_payment_url,
                    "deeplink": created.deeplink,
                    "message": "PayPay payment created successfully",
                })),
            )
                .into_response()
        }
        other => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("Unsupported payment method: {}", other)})),
        )
            .into_response(),
    }
}
