//! Shared test doubles: an in-memory order store and a scripted gateway.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use nomimono_backend::database::error::DatabaseError;
use nomimono_backend::database::order_repository::{Order, OrderStatus};
use nomimono_backend::database::payment_repository::PaymentRecord;
use nomimono_backend::database::store::{OrderStore, OrderWithPayments};
use nomimono_backend::payments::error::{PaymentError, PaymentResult};
use nomimono_backend::payments::provider::PaymentProvider;
use nomimono_backend::payments::types::{
    CreatePaymentRequest, CreatedPayment, GatewayStatus, PaymentDetails,
};
use nomimono_backend::services::reconciler::PaymentReconciler;

pub fn order(id: i64, status: &str, method: Option<&str>) -> Order {
    Order {
        id,
        product_id: 1,
        quantity: 2,
        total_amount: 600,
        payment_status: status.to_string(),
        payment_id: None,
        payment_method: method.map(str::to_string),
        payment_amount: None,
        payment_currency: Some("JPY".to_string()),
        payment_completed_at: None,
        customer_email: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn payment(id: i64, order_id: i64, provider_id: Option<&str>, errors: i32) -> PaymentRecord {
    PaymentRecord {
        id,
        order_id,
        payment_method: "paypay".to_string(),
        payment_provider_id: provider_id.map(str::to_string),
        amount: 600,
        currency: "JPY".to_string(),
        status: "pending".to_string(),
        consecutive_api_errors: errors,
        last_api_check: None,
        last_api_error: None,
        provider_response: json!({}),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub orders: Mutex<HashMap<i64, Order>>,
    pub payments: Mutex<HashMap<i64, PaymentRecord>>,
}

impl MemoryStore {
    pub fn with_order(self, order: Order) -> Self {
        self.orders.lock().unwrap().insert(order.id, order);
        self
    }

    pub fn with_payment(self, payment: PaymentRecord) -> Self {
        self.payments.lock().unwrap().insert(payment.id, payment);
        self
    }

    pub fn order(&self, id: i64) -> Order {
        self.orders
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .expect("order should exist")
    }

    pub fn payment(&self, id: i64) -> PaymentRecord {
        self.payments
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .expect("payment should exist")
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn order_with_payments(
        &self,
        order_id: i64,
    ) -> Result<Option<OrderWithPayments>, DatabaseError> {
        let Some(order) = self.orders.lock().unwrap().get(&order_id).cloned() else {
            return Ok(None);
        };
        let mut payments: Vec<PaymentRecord> = self
            .payments
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.id);
        Ok(Some(OrderWithPayments { order, payments }))
    }

    async fn set_order_status(
        &self,
        order_id: i64,
        status: OrderStatus,
        payment_id: Option<&str>,
        payment_method: Option<&str>,
        payment_amount: Option<i64>,
    ) -> Result<Order, DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| DatabaseError::not_found("Order", order_id))?;
        order.payment_status = status.as_str().to_string();
        if let Some(pid) = payment_id {
            order.payment_id = Some(pid.to_string());
        }
        if let Some(method) = payment_method {
            order.payment_method = Some(method.to_string());
        }
        if let Some(amount) = payment_amount {
            order.payment_amount = Some(amount);
        }
        if status == OrderStatus::Completed && order.payment_completed_at.is_none() {
            order.payment_completed_at = Some(Utc::now());
        }
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn set_payment_status(
        &self,
        payment_id: i64,
        status: OrderStatus,
        provider_id: Option<&str>,
        response_patch: JsonValue,
    ) -> Result<(), DatabaseError> {
        let mut payments = self.payments.lock().unwrap();
        let record = payments
            .get_mut(&payment_id)
            .ok_or_else(|| DatabaseError::not_found("PaymentRecord", payment_id))?;
        record.status = status.as_str().to_string();
        if let Some(pid) = provider_id {
            record.payment_provider_id = Some(pid.to_string());
        }
        if let (Some(blob), Some(patch)) = (
            record.provider_response.as_object_mut(),
            response_patch.as_object(),
        ) {
            for (key, value) in patch {
                blob.insert(key.clone(), value.clone());
            }
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn reset_gateway_errors(&self, payment_id: i64) -> Result<(), DatabaseError> {
        let mut payments = self.payments.lock().unwrap();
        let record = payments
            .get_mut(&payment_id)
            .ok_or_else(|| DatabaseError::not_found("PaymentRecord", payment_id))?;
        record.consecutive_api_errors = 0;
        record.last_api_check = Some(Utc::now());
        record.last_api_error = None;
        Ok(())
    }

    async fn bump_gateway_errors(
        &self,
        payment_id: i64,
        error: &str,
    ) -> Result<i32, DatabaseError> {
        let mut payments = self.payments.lock().unwrap();
        let record = payments
            .get_mut(&payment_id)
            .ok_or_else(|| DatabaseError::not_found("PaymentRecord", payment_id))?;
        record.consecutive_api_errors += 1;
        record.last_api_check = Some(Utc::now());
        record.last_api_error = Some(error.to_string());
        Ok(record.consecutive_api_errors)
    }
}

/// Gateway double that always answers `payment_details` with one scripted
/// result and counts how many times it was asked.
pub struct ScriptedGateway {
    details: Mutex<PaymentResult<GatewayStatus>>,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn returning(status: GatewayStatus) -> Self {
        Self {
            details: Mutex::new(Ok(status)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            details: Mutex::new(Err(PaymentError::NetworkError {
                message: message.to_string(),
            })),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for ScriptedGateway {
    async fn create_payment(&self, request: CreatePaymentRequest) -> PaymentResult<CreatedPayment> {
        Ok(CreatedPayment {
            payment_id: "scripted_pay_1".to_string(),
            merchant_payment_id: request.merchant_payment_id,
            status: GatewayStatus::Created,
            qr_url: None,
            deeplink: None,
            web_payment_url: None,
            raw: json!({}),
        })
    }

    async fn payment_details(&self, merchant_payment_id: &str) -> PaymentResult<PaymentDetails> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &*self.details.lock().unwrap() {
            Ok(status) => Ok(PaymentDetails {
                payment_id: Some("scripted_pay_1".to_string()),
                merchant_payment_id: merchant_payment_id.to_string(),
                status: status.clone(),
                raw: json!({}),
            }),
            Err(err) => Err(err.clone()),
        }
    }

    async fn cancel_payment(&self, _merchant_payment_id: &str) -> PaymentResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "paypay"
    }
}

pub fn reconciler(store: &Arc<MemoryStore>, gateway: &Arc<ScriptedGateway>) -> PaymentReconciler {
    PaymentReconciler::new(
        store.clone() as Arc<dyn OrderStore>,
        gateway.clone() as Arc<dyn PaymentProvider>,
    )
}
