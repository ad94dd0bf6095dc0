use crate::database::error::DatabaseError;
use crate::database::order_repository::OrderStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};

/// One settlement attempt against an order.
///
/// The gateway health counters (`consecutive_api_errors`, `last_api_check`,
/// `last_api_error`) are first-class columns; `provider_response` is an
/// opaque audit blob of raw provider payloads and is never interpreted.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentRecord {
    pub id: i64,
    pub order_id: i64,
    pub payment_method: String,
    pub payment_provider_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub consecutive_api_errors: i32,
    pub last_api_check: Option<DateTime<Utc>>,
    pub last_api_error: Option<String>,
    pub provider_response: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn settlement_status(&self) -> OrderStatus {
        OrderStatus::from_db(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub order_id: i64,
    pub payment_method: String,
    pub payment_provider_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub provider_response: JsonValue,
}

const PAYMENT_COLUMNS: &str = "id, order_id, payment_method, payment_provider_id, amount, \
     currency, status, consecutive_api_errors, last_api_check, last_api_error, \
     provider_response, created_at, updated_at";

/// Repository for payment records
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, record: &NewPaymentRecord) -> Result<PaymentRecord, DatabaseError> {
        sqlx::query_as::<_, PaymentRecord>(&format!(
            "INSERT INTO payments \
                 (order_id, payment_method, payment_provider_id, amount, currency, status, provider_response) \
             VALUES ($1, $2, $3, $4, $5, 'pending', $6) \
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(record.order_id)
        .bind(&record.payment_method)
        .bind(&record.payment_provider_id)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(&record.provider_response)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Payment records for an order, oldest first. The reconciler only ever
    /// acts on the first one.
    pub async fn find_by_order(&self, order_id: i64) -> Result<Vec<PaymentRecord>, DatabaseError> {
        sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {} FROM payments WHERE order_id = $1 ORDER BY created_at ASC, id ASC",
            PAYMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Update the settlement status and merge `response_patch` into the audit
    /// blob. `provider_id` overwrites only when provided.
    pub async fn update_status(
        &self,
        payment_id: i64,
        status: OrderStatus,
        provider_id: Option<&str>,
        response_patch: JsonValue,
    ) -> Result<PaymentRecord, DatabaseError> {
        sqlx::query_as::<_, PaymentRecord>(&format!(
            "UPDATE payments \
             SET status = $2, \
                 payment_provider_id = COALESCE($3, payment_provider_id), \
                 provider_response = provider_response || $4, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .bind(status.as_str())
        .bind(provider_id)
        .bind(&response_patch)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| DatabaseError::not_found("PaymentRecord", payment_id))
    }

    /// A successful gateway round trip resets the error counter and stamps
    /// the check time.
    pub async fn reset_api_errors(&self, payment_id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE payments \
             SET consecutive_api_errors = 0, last_api_check = NOW(), last_api_error = NULL, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(payment_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("PaymentRecord", payment_id));
        }
        Ok(())
    }

    /// A failed gateway round trip increments the counter and records the
    /// error. Returns the new counter value.
    pub async fn bump_api_errors(
        &self,
        payment_id: i64,
        error: &str,
    ) -> Result<i32, DatabaseError> {
        let row: (i32,) = sqlx::query_as(
            "UPDATE payments \
             SET consecutive_api_errors = consecutive_api_errors + 1, \
                 last_api_check = NOW(), last_api_error = $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING consecutive_api_errors",
        )
        .bind(payment_id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| DatabaseError::not_found("PaymentRecord", payment_id))?;
        Ok(row.0)
    }
}
