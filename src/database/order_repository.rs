use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::str::FromStr;

/// Settlement status vocabulary shared by orders and their payment records.
///
/// `Pending` is the initial state, `Authorized` is the intermediate state of
/// hold-then-capture flows, and `Completed`/`Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Failed,
    Authorized,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Authorized => "authorized",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }

    /// Stored values outside the vocabulary read as `pending`.
    pub fn from_db(value: &str) -> Self {
        value.parse().unwrap_or(OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(OrderStatus::Pending),
            "completed" => Ok(OrderStatus::Completed),
            "failed" => Ok(OrderStatus::Failed),
            "authorized" => Ok(OrderStatus::Authorized),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// Order entity
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub total_amount: i64,
    pub payment_status: String,
    pub payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub payment_amount: Option<i64>,
    pub payment_currency: Option<String>,
    pub payment_completed_at: Option<DateTime<Utc>>,
    pub customer_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn status(&self) -> OrderStatus {
        OrderStatus::from_db(&self.payment_status)
    }
}

/// Fields required to create an order at checkout initiation.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub product_id: i64,
    pub quantity: i32,
    pub total_amount: i64,
    pub customer_email: Option<String>,
}

const ORDER_COLUMNS: &str = "id, product_id, quantity, total_amount, payment_status, payment_id, \
     payment_method, payment_amount, payment_currency, payment_completed_at, customer_email, \
     created_at, updated_at";

/// Repository for order rows
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, order: &NewOrder) -> Result<Order, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "INSERT INTO orders (product_id, quantity, total_amount, payment_status, customer_email) \
             VALUES ($1, $2, $3, 'pending', $4) \
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order.product_id)
        .bind(order.quantity)
        .bind(order.total_amount)
        .bind(&order.customer_email)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_id(&self, order_id: i64) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Persist a settlement status transition. `payment_id`, `payment_method`
    /// and `payment_amount` overwrite only when provided; the completion
    /// timestamp is stamped the first time the order reaches `completed`.
    pub async fn update_payment_status(
        &self,
        order_id: i64,
        status: OrderStatus,
        payment_id: Option<&str>,
        payment_method: Option<&str>,
        payment_amount: Option<i64>,
    ) -> Result<Order, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders \
             SET payment_status = $2, \
                 payment_id = COALESCE($3, payment_id), \
                 payment_method = COALESCE($4, payment_method), \
                 payment_amount = COALESCE($5, payment_amount), \
                 payment_completed_at = CASE \
                     WHEN $2 = 'completed' AND payment_completed_at IS NULL THEN NOW() \
                     ELSE payment_completed_at \
                 END, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(status.as_str())
        .bind(payment_id)
        .bind(payment_method)
        .bind(payment_amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| DatabaseError::not_found("Order", order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::Authorized,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
    }

    #[test]
    fn unknown_stored_status_reads_as_pending() {
        assert_eq!(OrderStatus::from_db("refunded"), OrderStatus::Pending);
        assert_eq!(OrderStatus::from_db(""), OrderStatus::Pending);
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Authorized.is_terminal());
    }
}
