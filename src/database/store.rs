use crate::database::error::DatabaseError;
use crate::database::order_repository::{Order, OrderRepository, OrderStatus};
use crate::database::payment_repository::{PaymentRecord, PaymentRepository};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;

/// An order together with its settlement attempts, oldest first.
#[derive(Debug, Clone)]
pub struct OrderWithPayments {
    pub order: Order,
    pub payments: Vec<PaymentRecord>,
}

impl OrderWithPayments {
    pub fn first_payment(&self) -> Option<&PaymentRecord> {
        self.payments.first()
    }
}

/// Storage seam the reconciler works against.
///
/// The two status writes are intentionally separate operations with no
/// transaction around them; the reconciler orders them (order row first,
/// payment record second) and a failure between the two leaves the rows
/// divergent until the next observation.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn order_with_payments(
        &self,
        order_id: i64,
    ) -> Result<Option<OrderWithPayments>, DatabaseError>;

    async fn set_order_status(
        &self,
        order_id: i64,
        status: OrderStatus,
        payment_id: Option<&str>,
        payment_method: Option<&str>,
        payment_amount: Option<i64>,
    ) -> Result<Order, DatabaseError>;

    async fn set_payment_status(
        &self,
        payment_id: i64,
        status: OrderStatus,
        provider_id: Option<&str>,
        response_patch: JsonValue,
    ) -> Result<(), DatabaseError>;

    async fn reset_gateway_errors(&self, payment_id: i64) -> Result<(), DatabaseError>;

    async fn bump_gateway_errors(
        &self,
        payment_id: i64,
        error: &str,
    ) -> Result<i32, DatabaseError>;
}

/// PostgreSQL-backed store delegating to the per-table repositories.
pub struct PgOrderStore {
    orders: OrderRepository,
    payments: PaymentRepository,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            payments: PaymentRepository::new(pool),
        }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn order_with_payments(
        &self,
        order_id: i64,
    ) -> Result<Option<OrderWithPayments>, DatabaseError> {
        let Some(order) = self.orders.find_by_id(order_id).await? else {
            return Ok(None);
        };
        let payments = self.payments.find_by_order(order_id).await?;
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
        self.orders
            .update_payment_status(order_id, status, payment_id, payment_method, payment_amount)
            .await
    }

    async fn set_payment_status(
        &self,
        payment_id: i64,
        status: OrderStatus,
        provider_id: Option<&str>,
        response_patch: JsonValue,
    ) -> Result<(), DatabaseError> {
        self.payments
            .update_status(payment_id, status, provider_id, response_patch)
            .await
            .map(|_| ())
    }

    async fn reset_gateway_errors(&self, payment_id: i64) -> Result<(), DatabaseError> {
        self.payments.reset_api_errors(payment_id).await
    }

    async fn bump_gateway_errors(
        &self,
        payment_id: i64,
        error: &str,
    ) -> Result<i32, DatabaseError> {
        self.payments.bump_api_errors(payment_id, error).await
    }
}
